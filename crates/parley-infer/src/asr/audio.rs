//! Audio input for transcription: WAV reading, resampling, padding and
//! log-mel features.

use super::config::{HOP_LENGTH, N_FFT, N_MEL, SAMPLE_RATE};
use super::vocab::MelFilters;
use crate::{InferError, Result};
use num_traits::{Float, FloatConst};
use std::path::Path;

const EPSILON: f64 = 1e-10;

/// Turns raw samples into the model's input features.
pub trait FeatureExtractor: Send {
    fn n_mel(&self) -> usize;

    /// Features laid out `[n_mel, n_frames]`, computed with up to `n_threads`
    /// threads.
    fn mel_spectrogram(&self, samples: &[f32], n_threads: usize) -> Result<Vec<f32>>;
}

/// Whisper's log-mel spectrogram.
#[derive(Debug, Clone)]
pub struct LogMelSpectrogram {
    filters: MelFilters,
    window: Vec<f32>,
    cos_table: Vec<f32>,
    sin_table: Vec<f32>,
}

impl LogMelSpectrogram {
    /// Filter bank computed for 16 kHz audio, 80 bins.
    pub fn whisper() -> Self {
        Self::build(slaney_filters(SAMPLE_RATE, N_FFT, N_MEL))
    }

    /// Use filters loaded from an asset. There must be at least one row and
    /// each row must cover `N_FFT / 2 + 1` frequency bins.
    pub fn from_filters(filters: MelFilters) -> Result<Self> {
        let n_freq = N_FFT / 2 + 1;
        if filters.n_mel == 0
            || filters.n_fft != n_freq
            || filters.data.len() != filters.n_mel * filters.n_fft
        {
            return Err(InferError::Shape(format!(
                "mel filters are {}x{} with {} weights, expected rows of {n_freq}",
                filters.n_mel,
                filters.n_fft,
                filters.data.len()
            )));
        }
        Ok(Self::build(filters))
    }

    fn build(filters: MelFilters) -> Self {
        let n_freq = N_FFT / 2 + 1;
        let mut cos_table = Vec::with_capacity(n_freq * N_FFT);
        let mut sin_table = Vec::with_capacity(n_freq * N_FFT);
        for k in 0..n_freq {
            for n in 0..N_FFT {
                let angle = -2.0 * std::f64::consts::PI * (k * n % N_FFT) as f64 / N_FFT as f64;
                cos_table.push(angle.cos() as f32);
                sin_table.push(angle.sin() as f32);
            }
        }
        Self {
            filters,
            window: hann_window(N_FFT),
            cos_table,
            sin_table,
        }
    }

    pub fn filters(&self) -> &MelFilters {
        &self.filters
    }

    /// Power spectrum of one windowed frame.
    fn power_spectrum(&self, frame: &[f32], out: &mut [f32]) {
        for (k, bin) in out.iter_mut().enumerate() {
            let row = k * N_FFT;
            let cos = &self.cos_table[row..row + N_FFT];
            let sin = &self.sin_table[row..row + N_FFT];
            let mut real = 0.0f32;
            let mut imag = 0.0f32;
            for ((&x, &c), &s) in frame.iter().zip(cos).zip(sin) {
                real += x * c;
                imag += x * s;
            }
            *bin = real * real + imag * imag;
        }
    }

    /// log10 mel energies for frames `range`, written frame-major into `out`.
    fn frames(&self, padded: &[f32], range: std::ops::Range<usize>, out: &mut [f32]) {
        let n_freq = N_FFT / 2 + 1;
        let n_mel = self.filters.n_mel;
        let mut windowed = vec![0.0f32; N_FFT];
        let mut power = vec![0.0f32; n_freq];

        for (slot, frame) in range.enumerate() {
            let start = frame * HOP_LENGTH;
            for ((w, &x), &h) in windowed
                .iter_mut()
                .zip(&padded[start..start + N_FFT])
                .zip(&self.window)
            {
                *w = x * h;
            }
            self.power_spectrum(&windowed, &mut power);

            for mel in 0..n_mel {
                let filter = &self.filters.data[mel * n_freq..(mel + 1) * n_freq];
                let energy: f32 = power.iter().zip(filter).map(|(p, f)| p * f).sum();
                out[slot * n_mel + mel] = (energy as f64).max(EPSILON).log10() as f32;
            }
        }
    }
}

impl FeatureExtractor for LogMelSpectrogram {
    fn n_mel(&self) -> usize {
        self.filters.n_mel
    }

    fn mel_spectrogram(&self, samples: &[f32], n_threads: usize) -> Result<Vec<f32>> {
        let n_mel = self.filters.n_mel;
        if n_mel == 0 {
            return Err(InferError::Shape("mel filter bank has no rows".to_string()));
        }
        let n_frames = samples.len() / HOP_LENGTH;
        if n_frames == 0 {
            return Err(InferError::Shape(format!(
                "need at least {HOP_LENGTH} samples, got {}",
                samples.len()
            )));
        }

        let mut padded = samples.to_vec();
        padded.resize(n_frames * HOP_LENGTH + N_FFT, 0.0);

        // frame-major scratch, one contiguous chunk per thread
        let mut by_frame = vec![0.0f32; n_frames * n_mel];
        let n_threads = n_threads.clamp(1, n_frames);
        let per_thread = n_frames.div_ceil(n_threads);
        std::thread::scope(|scope| {
            for (i, chunk) in by_frame.chunks_mut(per_thread * n_mel).enumerate() {
                let start = i * per_thread;
                let range = start..start + chunk.len() / n_mel;
                let padded = &padded;
                scope.spawn(move || self.frames(padded, range, chunk));
            }
        });

        let mut mel = vec![0.0f32; n_mel * n_frames];
        for frame in 0..n_frames {
            for bin in 0..n_mel {
                mel[bin * n_frames + frame] = by_frame[frame * n_mel + bin];
            }
        }

        // clamp to within 8 of the peak, then scale to roughly [-1, 1]
        let max = mel.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let floor = max - 8.0;
        for m in mel.iter_mut() {
            *m = m.max(floor) / 4.0 + 1.0;
        }
        Ok(mel)
    }
}

fn cast<T: Float>(value: f64) -> T {
    T::from(value).unwrap_or_else(T::nan)
}

/// Periodic Hann window of length `n`.
fn hann_window<T: Float + FloatConst>(n: usize) -> Vec<T> {
    let two_pi = T::PI() + T::PI();
    let len: T = cast(n as f64);
    (0..n)
        .map(|i| {
            let phase = two_pi * cast(i as f64) / len;
            cast::<T>(0.5) * (T::one() - phase.cos())
        })
        .collect()
}

fn hz_to_mel<T: Float>(hz: T) -> T {
    let f_sp: T = cast(200.0 / 3.0);
    let min_log_hz: T = cast(1000.0);
    let min_log_mel = min_log_hz / f_sp;
    let logstep: T = cast(6.4f64.ln() / 27.0);
    if hz >= min_log_hz {
        min_log_mel + (hz / min_log_hz).ln() / logstep
    } else {
        hz / f_sp
    }
}

fn mel_to_hz<T: Float>(mel: T) -> T {
    let f_sp: T = cast(200.0 / 3.0);
    let min_log_hz: T = cast(1000.0);
    let min_log_mel = min_log_hz / f_sp;
    let logstep: T = cast(6.4f64.ln() / 27.0);
    if mel >= min_log_mel {
        min_log_hz * (logstep * (mel - min_log_mel)).exp()
    } else {
        mel * f_sp
    }
}

/// Slaney-normalized triangular mel filter bank covering 0 Hz to Nyquist.
pub fn slaney_filters(sample_rate: usize, n_fft: usize, n_mel: usize) -> MelFilters {
    let n_freq = n_fft / 2 + 1;
    let fft_freqs: Vec<f64> = (0..n_freq)
        .map(|k| k as f64 * sample_rate as f64 / n_fft as f64)
        .collect();

    let mel_max = hz_to_mel(sample_rate as f64 / 2.0);
    let points: Vec<f64> = (0..n_mel + 2)
        .map(|i| mel_to_hz(mel_max * i as f64 / (n_mel + 1) as f64))
        .collect();

    let mut data = Vec::with_capacity(n_mel * n_freq);
    for m in 0..n_mel {
        let (left, center, right) = (points[m], points[m + 1], points[m + 2]);
        let enorm = 2.0 / (right - left);
        for &f in &fft_freqs {
            let lower = (f - left) / (center - left);
            let upper = (right - f) / (right - center);
            data.push((lower.min(upper).max(0.0) * enorm) as f32);
        }
    }

    MelFilters {
        n_mel,
        n_fft: n_freq,
        data,
    }
}

/// Zero-pad or truncate to exactly `len` samples.
pub fn pad_or_truncate(samples: &[f32], len: usize) -> Vec<f32> {
    let mut out = samples[..samples.len().min(len)].to_vec();
    out.resize(len, 0.0);
    out
}

/// Read a WAV file as mono f32 in `[-1, 1]` at 16 kHz.
pub fn read_wav(path: impl AsRef<Path>) -> Result<Vec<f32>> {
    let reader = hound::WavReader::open(path.as_ref())?;
    let spec = reader.spec();
    log::debug!(
        "WAV: {} Hz, {} ch, {} bit",
        spec.sample_rate,
        spec.channels,
        spec.bits_per_sample
    );

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()?
        }
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<_, _>>()?,
    };

    let mono = if spec.channels > 1 {
        samples
            .chunks(spec.channels as usize)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    } else {
        samples
    };

    if spec.sample_rate as usize != SAMPLE_RATE {
        log::debug!("resampling from {} Hz to {SAMPLE_RATE} Hz", spec.sample_rate);
        Ok(resample(&mono, spec.sample_rate as usize, SAMPLE_RATE))
    } else {
        Ok(mono)
    }
}

/// Linear interpolation resampling from `from_rate` to `to_rate`.
pub fn resample(samples: &[f32], from_rate: usize, to_rate: usize) -> Vec<f32> {
    if samples.is_empty() || from_rate == 0 || to_rate == 0 {
        return Vec::new();
    }
    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = (samples.len() as f64 / ratio) as usize;
    let mut output = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let src_pos = i as f64 * ratio;
        let idx = src_pos as usize;
        let frac = (src_pos - idx as f64) as f32;

        let sample = if idx + 1 < samples.len() {
            let a = samples[idx];
            let b = samples[idx + 1];
            a + (b - a) * frac
        } else {
            samples[samples.len() - 1]
        };
        output.push(sample);
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mel_scale_round_trip_points() {
        assert!((hz_to_mel(1000.0f64) - 15.0).abs() < 1e-9);
        assert!((mel_to_hz(15.0f64) - 1000.0).abs() < 1e-6);
        assert!((hz_to_mel(500.0f64) - 7.5).abs() < 1e-9);
    }

    #[test]
    fn test_hann_window_is_periodic() {
        let window: Vec<f64> = hann_window(4);
        assert!(window[0].abs() < 1e-12);
        assert!((window[1] - 0.5).abs() < 1e-12);
        assert!((window[2] - 1.0).abs() < 1e-12);
        assert!((window[3] - 0.5).abs() < 1e-12);
    }
}

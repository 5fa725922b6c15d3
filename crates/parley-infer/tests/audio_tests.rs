use parley_infer::asr::audio::{resample, slaney_filters};
use parley_infer::asr::config::{HOP_LENGTH, N_FFT, N_MEL, SAMPLE_RATE};
use parley_infer::asr::{
    FeatureExtractor, LogMelSpectrogram, MelFilters, pad_or_truncate, read_wav,
};
use parley_infer::InferError;

type WavFileWriter = hound::WavWriter<std::io::BufWriter<std::fs::File>>;

fn temp_wav(
    name: &str,
    spec: hound::WavSpec,
    write: impl FnOnce(&mut WavFileWriter),
) -> std::path::PathBuf {
    let path = std::env::temp_dir().join(format!("parley-{}-{}.wav", name, std::process::id()));
    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    write(&mut writer);
    writer.finalize().unwrap();
    path
}

#[test]
fn test_pad_or_truncate() {
    assert_eq!(pad_or_truncate(&[1.0, 2.0], 4), vec![1.0, 2.0, 0.0, 0.0]);
    assert_eq!(pad_or_truncate(&[1.0, 2.0, 3.0], 2), vec![1.0, 2.0]);
    assert_eq!(pad_or_truncate(&[], 3), vec![0.0; 3]);
}

#[test]
fn test_resample_halves_length() {
    let samples: Vec<f32> = (0..100).map(|i| i as f32).collect();
    let out = resample(&samples, 32000, 16000);
    assert_eq!(out.len(), 50);
    assert_eq!(out[0], 0.0);
    assert_eq!(out[1], 2.0);
    assert!(resample(&[], 8000, 16000).is_empty());
}

#[test]
fn test_slaney_filters_shape() {
    let filters = slaney_filters(SAMPLE_RATE, N_FFT, N_MEL);
    assert_eq!(filters.n_mel, 80);
    assert_eq!(filters.n_fft, 201);
    assert_eq!(filters.data.len(), 80 * 201);
    assert!(filters.data.iter().all(|w| *w >= 0.0));
    for row in filters.data.chunks(201) {
        assert!(row.iter().any(|w| *w > 0.0));
    }
}

#[test]
fn test_mel_spectrogram_layout_and_range() {
    let extractor = LogMelSpectrogram::whisper();
    let samples: Vec<f32> = (0..HOP_LENGTH * 10)
        .map(|i| (i as f32 * 440.0 * 2.0 * std::f32::consts::PI / SAMPLE_RATE as f32).sin())
        .collect();
    let mel = extractor.mel_spectrogram(&samples, 3).unwrap();
    assert_eq!(mel.len(), 80 * 10);

    let max = mel.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let min = mel.iter().copied().fold(f32::INFINITY, f32::min);
    assert!(max - min <= 2.0 + 1e-5);

    let single = extractor.mel_spectrogram(&samples, 1).unwrap();
    for (a, b) in mel.iter().zip(&single) {
        assert!((a - b).abs() < 1e-6);
    }
}

#[test]
fn test_mel_spectrogram_needs_a_frame() {
    let extractor = LogMelSpectrogram::whisper();
    assert!(matches!(
        extractor.mel_spectrogram(&[0.0; 10], 1),
        Err(InferError::Shape(_))
    ));
}

#[test]
fn test_from_filters_checks_dimensions() {
    let bad = MelFilters {
        n_mel: 2,
        n_fft: 3,
        data: vec![0.0; 6],
    };
    assert!(LogMelSpectrogram::from_filters(bad).is_err());
    let empty = MelFilters {
        n_mel: 0,
        n_fft: N_FFT / 2 + 1,
        data: Vec::new(),
    };
    assert!(matches!(
        LogMelSpectrogram::from_filters(empty),
        Err(InferError::Shape(_))
    ));
    let good = slaney_filters(SAMPLE_RATE, N_FFT, 40);
    let extractor = LogMelSpectrogram::from_filters(good).unwrap();
    assert_eq!(extractor.n_mel(), 40);
}

#[test]
fn test_read_wav_int_stereo_resampled() {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: 32000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let path = temp_wav("stereo", spec, |writer| {
        for _ in 0..64 {
            writer.write_sample(i16::MAX / 2).unwrap();
            writer.write_sample(i16::MAX / 2).unwrap();
        }
    });
    let samples = read_wav(&path).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(samples.len(), 32);
    for s in samples {
        assert!((s - 0.5).abs() < 1e-3);
    }
}

#[test]
fn test_read_wav_float_mono() {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 16000,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let path = temp_wav("float", spec, |writer| {
        for v in [0.25f32, -0.5, 1.0] {
            writer.write_sample(v).unwrap();
        }
    });
    let samples = read_wav(&path).unwrap();
    std::fs::remove_file(&path).ok();
    assert_eq!(samples, vec![0.25, -0.5, 1.0]);
}

#[test]
fn test_read_wav_missing_file() {
    assert!(matches!(
        read_wav("/nonexistent/parley/clip.wav"),
        Err(InferError::Io(_))
    ));
}

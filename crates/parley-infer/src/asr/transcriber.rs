use super::audio::{self, FeatureExtractor, LogMelSpectrogram};
use super::config::{WhisperVariant, N_FRAMES, N_SAMPLES};
use super::token_decoder::tokens_to_text;
use super::vocab::{self, Vocabulary};
use crate::session::{self, AcquireOptions, ModelHandle};
use crate::{probe, Backend, InferError, ModelSource, Result};
use parley_base::{element_count, ElementType, Tensor, TensorBuffer};
use std::path::Path;

/// Speech to text with a model that maps a 30 second log-mel window
/// straight to output token ids.
#[derive(Default)]
pub struct Transcriber {
    handle: Option<ModelHandle>,
    vocab: Option<Box<dyn Vocabulary + Send>>,
    features: Option<Box<dyn FeatureExtractor>>,
}

impl Transcriber {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the model and keep `vocab` and `features` for decoding. Any
    /// previous model is released first.
    pub fn initialize(
        &mut self,
        backend: &dyn Backend,
        model: &ModelSource,
        options: &AcquireOptions,
        vocab: Box<dyn Vocabulary + Send>,
        features: Box<dyn FeatureExtractor>,
    ) -> Result<()> {
        self.deinitialize();
        let handle = session::open(backend, model, options).inspect_err(|err| {
            log::error!("failed to initialize transcriber: {err}");
        })?;
        log::info!(
            "transcriber initialized: accelerator={}",
            handle.using_accelerator()
        );
        self.handle = Some(handle);
        self.vocab = Some(vocab);
        self.features = Some(features);
        Ok(())
    }

    /// Like `initialize`, reading mel filters and vocabulary from a combined
    /// asset file.
    pub fn initialize_from_assets(
        &mut self,
        backend: &dyn Backend,
        model: &ModelSource,
        options: &AcquireOptions,
        vocab_path: impl AsRef<Path>,
        variant: WhisperVariant,
    ) -> Result<()> {
        let (filters, table) = vocab::load_filters_and_vocab(vocab_path, variant)?;
        let features = LogMelSpectrogram::from_filters(filters)?;
        self.initialize(backend, model, options, Box::new(table), Box::new(features))
    }

    pub fn deinitialize(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.release();
        }
        self.vocab = None;
        self.features = None;
    }

    pub fn is_initialized(&self) -> bool {
        self.handle.is_some()
    }

    pub fn is_using_accelerator(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| handle.using_accelerator())
    }

    pub fn transcribe_file(&mut self, path: impl AsRef<Path>) -> Result<String> {
        if !self.is_initialized() {
            return Err(InferError::NotInitialized);
        }
        let samples = audio::read_wav(path)?;
        self.transcribe_buffer(&samples)
    }

    /// Transcribe 16 kHz mono samples. Input is padded or cut to 30 seconds.
    pub fn transcribe_buffer(&mut self, samples: &[f32]) -> Result<String> {
        let (Some(handle), Some(vocab), Some(features)) =
            (self.handle.as_mut(), self.vocab.as_deref(), self.features.as_deref())
        else {
            return Err(InferError::NotInitialized);
        };

        let samples = audio::pad_or_truncate(samples, N_SAMPLES);
        let mel = features.mel_spectrogram(&samples, probe::thread_hint())?;
        let input = mel_input(handle, mel, features.n_mel())?;

        let output = handle.run_forward(&input)?;
        let tokens = output.to_ids()?;
        log::debug!("model produced {} tokens", tokens.len());
        Ok(tokens_to_text(tokens, vocab))
    }
}

impl Drop for Transcriber {
    fn drop(&mut self) {
        self.deinitialize();
    }
}

/// Shape `mel` for the model's first input: the declared shape when it is
/// fully fixed, `[1, n_mel, frames]` otherwise.
fn mel_input(handle: &ModelHandle, mel: Vec<f32>, n_mel: usize) -> Result<TensorBuffer> {
    let info = handle.metadata().inputs.first();
    if let Some(info) = info.filter(|info| info.element_type != ElementType::F32) {
        return Err(InferError::Inference(format!(
            "transcription input '{}' is {}, expected float32",
            info.name, info.element_type
        )));
    }

    let declared: Option<Vec<usize>> = info
        .filter(|info| !info.shape.is_empty())
        .and_then(|info| (0..info.shape.len()).map(|i| info.fixed_dim(i)).collect());
    let shape = declared.unwrap_or_else(|| vec![1, n_mel, mel.len() / n_mel.max(1)]);

    let expected = element_count(&shape)?;
    if expected != mel.len() {
        return Err(InferError::Shape(format!(
            "model input {:?} holds {expected} values, features have {} ({n_mel}x{N_FRAMES} expected)",
            shape,
            mel.len()
        )));
    }
    Ok(TensorBuffer::F32(Tensor::new(shape, mel)?))
}

use crate::session::{self, AcquireOptions, ModelHandle};
use crate::{sampler, Backend, GenerationConfig, InferError, ModelMetadata, ModelSource, Result};
use parley_base::{ElementType, TensorBuffer};
use std::collections::HashMap;

/// Logits of one cache-augmented step plus every other output by name.
#[derive(Debug, Clone)]
pub struct CacheStep {
    pub logits: Vec<f32>,
    pub state: HashMap<String, TensorBuffer>,
}

/// A text model that maps a token prefix to next-token logits.
#[derive(Default)]
pub struct LlmEngine {
    handle: Option<ModelHandle>,
}

impl LlmEngine {
    pub fn new() -> Self {
        Self { handle: None }
    }

    /// Load a model, releasing any previously loaded one first.
    ///
    /// On failure the engine stays uninitialized.
    pub fn initialize(
        &mut self,
        backend: &dyn Backend,
        source: &ModelSource,
        options: &AcquireOptions,
    ) -> Result<()> {
        self.deinitialize();
        let handle = session::open(backend, source, options).inspect_err(|err| {
            log::error!("failed to initialize LLM engine: {err}");
        })?;
        let metadata = handle.metadata();
        log::info!(
            "LLM engine initialized: accelerator={}, max_seq_len={}, vocab_size={}",
            handle.using_accelerator(),
            metadata.max_seq_len,
            metadata.vocab_size
        );
        self.handle = Some(handle);
        Ok(())
    }

    pub fn deinitialize(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.release();
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.handle.is_some()
    }

    pub fn is_using_accelerator(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| handle.using_accelerator())
    }

    pub fn metadata(&self) -> Option<&ModelMetadata> {
        self.handle.as_ref().map(|handle| handle.metadata())
    }

    pub fn max_seq_len(&self) -> usize {
        self.metadata()
            .map_or(crate::metadata::DEFAULT_MAX_SEQ_LEN, |m| m.max_seq_len)
    }

    pub fn vocab_size(&self) -> usize {
        self.metadata()
            .map_or(crate::metadata::DEFAULT_VOCAB_SIZE, |m| m.vocab_size)
    }

    /// Next-token logits for `ids`. Only the first `max_seq_len` ids are used.
    pub fn run_inference(&mut self, ids: &[i32]) -> Result<Vec<f32>> {
        let handle = self.handle.as_mut().ok_or(InferError::NotInitialized)?;
        let (input, used) = input_ids(handle.metadata(), ids)?;
        let output = handle.run_forward(&input)?;
        last_logits(handle.metadata(), &output, used)
    }

    /// Like `run_inference`, feeding `cache` after the ids and returning the
    /// model's other outputs alongside the logits.
    pub fn run_inference_with_cache(
        &mut self,
        ids: &[i32],
        cache: &[TensorBuffer],
    ) -> Result<CacheStep> {
        let handle = self.handle.as_mut().ok_or(InferError::NotInitialized)?;
        let (input, used) = input_ids(handle.metadata(), ids)?;

        let mut inputs = Vec::with_capacity(1 + cache.len());
        inputs.push(input);
        inputs.extend_from_slice(cache);
        let mut state = handle.run_forward_with_state(&inputs)?;

        let logits_name = handle
            .metadata()
            .outputs
            .first()
            .map(|info| info.name.clone())
            .ok_or_else(|| InferError::Inference("model declares no outputs".to_string()))?;
        let output = state
            .remove(&logits_name)
            .ok_or_else(|| InferError::Inference(format!("missing output '{logits_name}'")))?;
        let logits = last_logits(handle.metadata(), &output, used)?;
        Ok(CacheStep { logits, state })
    }

    pub fn sample_token(&self, logits: &[f32], config: &GenerationConfig) -> Option<usize> {
        sampler::sample_token(logits, config, &mut rand::thread_rng())
    }

    pub fn greedy_decode(&self, logits: &[f32]) -> Option<usize> {
        sampler::greedy_decode(logits)
    }
}

impl Drop for LlmEngine {
    fn drop(&mut self) {
        self.deinitialize();
    }
}

/// Build the `[1, n]` id tensor. Returns the tensor and the number of real
/// ids in it.
///
/// Ids beyond `max_seq_len` are dropped. A model with a fixed sequence
/// dimension gets its input padded with zeros up to that length.
fn input_ids(metadata: &ModelMetadata, ids: &[i32]) -> Result<(TensorBuffer, usize)> {
    if ids.is_empty() {
        return Err(InferError::Inference("empty input sequence".to_string()));
    }
    let used = ids.len().min(metadata.max_seq_len);
    let info = metadata.inputs.first();
    let element_type = info.map_or(ElementType::I32, |info| info.element_type);
    if element_type == ElementType::F32 {
        return Err(InferError::Inference(
            "model input is float32, expected token ids".to_string(),
        ));
    }

    let length = info.and_then(|info| info.fixed_dim(1)).unwrap_or(used).max(used);
    let mut padded = ids[..used].to_vec();
    padded.resize(length, 0);
    let tensor = TensorBuffer::from_ids(element_type, vec![1, length], &padded)?;
    Ok((tensor, used))
}

/// Logits for the last real position.
///
/// An output holding one row per input position yields the row of the last
/// real id; any other output yields its last `vocab_size` values.
fn last_logits(metadata: &ModelMetadata, output: &TensorBuffer, used: usize) -> Result<Vec<f32>> {
    let data = output.as_f32()?;
    let vocab = metadata.vocab_size;
    if vocab == 0 || data.len() < vocab {
        return Err(InferError::Inference(format!(
            "output has {} values, expected at least {vocab}",
            data.len()
        )));
    }

    let shape = output.shape();
    let rows = data.len() / vocab;
    let start = if shape.len() == 3 && rows > 1 && used <= rows {
        (used - 1) * vocab
    } else {
        data.len() - vocab
    };
    Ok(data[start..start + vocab].to_vec())
}

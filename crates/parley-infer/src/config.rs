use crate::session::AcquireOptions;
use crate::{Device, InferError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Per-call sampling settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Logit divisor. `0.0` leaves logits unscaled.
    pub temperature: f32,
    /// Number of candidates kept before sampling. `0` disables the filter.
    pub top_k: usize,
}

impl GenerationConfig {
    pub fn new(temperature: f32, top_k: usize) -> Result<Self> {
        let config = Self { temperature, top_k };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.temperature.is_finite() || self.temperature < 0.0 {
            return Err(InferError::Config(format!(
                "temperature must be finite and non-negative, got {}",
                self.temperature
            )));
        }
        Ok(())
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_k: 40,
        }
    }
}

/// Engine settings, typically read from a JSON file. Every field is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub backend: String,
    pub prefer_accelerator: bool,
    pub device: Device,
    pub num_threads: Option<usize>,
    pub max_tokens: usize,
    pub generation: GenerationConfig,
}

impl EngineConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            InferError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.generation.validate()?;
        if config.num_threads == Some(0) {
            return Err(InferError::Config("num_threads must be at least 1".to_string()));
        }
        Ok(config)
    }

    pub fn acquire_options(&self) -> AcquireOptions {
        AcquireOptions {
            prefer_accelerator: self.prefer_accelerator,
            accelerator: self.device.clone(),
            num_threads: self.num_threads,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: "onnx".to_string(),
            prefer_accelerator: true,
            device: Device::default(),
            num_threads: None,
            max_tokens: 256,
            generation: GenerationConfig::default(),
        }
    }
}

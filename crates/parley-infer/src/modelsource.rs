use crate::error::{InferError, Result};
use memmap2::Mmap;
use std::fs::File;
use std::ops::Deref;
use std::path::PathBuf;

/// Where a serialized model comes from.
#[derive(Debug, Clone)]
pub enum ModelSource {
    File(PathBuf),
    Memory(Vec<u8>),
}

/// Model bytes, kept alive for as long as the interpreter built from them.
#[derive(Debug)]
pub enum ModelBytes {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl ModelSource {
    /// Memory-map a file source or take ownership of an in-memory one.
    pub fn load(&self) -> Result<ModelBytes> {
        match self {
            ModelSource::File(path) => {
                let file = File::open(path).map_err(|e| {
                    InferError::ModelLoad(format!("failed to open {}: {}", path.display(), e))
                })?;
                // SAFETY: the mapping is read-only and model files are not
                // modified while an engine is using them.
                let map = unsafe { Mmap::map(&file) }.map_err(|e| {
                    InferError::ModelLoad(format!("failed to map {}: {}", path.display(), e))
                })?;
                Ok(ModelBytes::Mapped(map))
            }
            ModelSource::Memory(bytes) => Ok(ModelBytes::Owned(bytes.clone())),
        }
    }
}

impl Deref for ModelBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            ModelBytes::Mapped(map) => map,
            ModelBytes::Owned(bytes) => bytes,
        }
    }
}

impl From<Vec<u8>> for ModelBytes {
    fn from(bytes: Vec<u8>) -> Self {
        ModelBytes::Owned(bytes)
    }
}

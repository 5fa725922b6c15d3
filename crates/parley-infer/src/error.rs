use crate::Device;
use parley_base::TensorError;
use std::fmt;

#[derive(Debug)]
pub enum InferError {
    /// Neither the accelerated nor the CPU path produced an interpreter, or
    /// the model bytes could not be read.
    ModelLoad(String),
    /// A single forward pass failed. The handle stays usable.
    Inference(String),
    /// An entry point was called before a successful `initialize`.
    NotInitialized,
    UnsupportedDevice(Device),
    Shape(String),
    Io(String),
    Tokenizer(String),
    Config(String),
    Backend(String),
}

impl fmt::Display for InferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InferError::ModelLoad(msg) => write!(f, "model load error: {msg}"),
            InferError::Inference(msg) => write!(f, "inference error: {msg}"),
            InferError::NotInitialized => write!(f, "engine not initialized"),
            InferError::UnsupportedDevice(device) => write!(f, "unsupported device: {device}"),
            InferError::Shape(msg) => write!(f, "shape error: {msg}"),
            InferError::Io(msg) => write!(f, "io error: {msg}"),
            InferError::Tokenizer(msg) => write!(f, "tokenizer error: {msg}"),
            InferError::Config(msg) => write!(f, "config error: {msg}"),
            InferError::Backend(msg) => write!(f, "backend error: {msg}"),
        }
    }
}

impl std::error::Error for InferError {}

impl From<std::io::Error> for InferError {
    fn from(err: std::io::Error) -> Self {
        InferError::Io(err.to_string())
    }
}

impl From<TensorError> for InferError {
    fn from(err: TensorError) -> Self {
        InferError::Shape(err.to_string())
    }
}

impl From<serde_json::Error> for InferError {
    fn from(err: serde_json::Error) -> Self {
        InferError::Config(err.to_string())
    }
}

impl From<hound::Error> for InferError {
    fn from(err: hound::Error) -> Self {
        InferError::Io(format!("wav: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, InferError>;

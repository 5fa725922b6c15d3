pub mod asr;
pub mod backend;
pub mod backendregistry;
pub mod backends;
pub mod config;
pub mod device;
pub mod error;
pub mod llm;
pub mod metadata;
pub mod modelsource;
pub mod probe;
pub mod sampler;
pub mod session;

pub use backend::{Backend, Delegate, Interpreter, InterpreterOptions, TensorInfo};
pub use backendregistry::{create_registry, BackendRegistry};
pub use config::{EngineConfig, GenerationConfig};
pub use device::Device;
pub use error::{InferError, Result};
pub use metadata::ModelMetadata;
pub use modelsource::{ModelBytes, ModelSource};
pub use session::{acquire, open, AcquireOptions, Acquisition, ModelHandle};

#[cfg(feature = "onnx")]
pub use backends::OnnxBackend;

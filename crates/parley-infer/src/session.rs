//! Interpreter acquisition with accelerator fallback, and the handle that
//! owns the result.
//!
//! Acquisition is two ordered attempts. The accelerated attempt runs only when
//! it is preferred and the capability probe agrees; any failure inside it is
//! cleaned up and logged, then the CPU attempt runs. Only a CPU failure is
//! reported to the caller.

use crate::modelsource::{ModelBytes, ModelSource};
use crate::{
    probe, Backend, Delegate, Device, InferError, Interpreter, InterpreterOptions, ModelMetadata,
    Result,
};
use parley_base::TensorBuffer;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};

#[derive(Debug, Clone, PartialEq)]
pub struct AcquireOptions {
    pub prefer_accelerator: bool,
    pub accelerator: Device,
    /// Interpreter thread count. `None` uses the number of available cores.
    pub num_threads: Option<usize>,
}

impl AcquireOptions {
    pub fn cpu_only() -> Self {
        Self {
            prefer_accelerator: false,
            ..Self::default()
        }
    }

    fn interpreter_options(&self) -> InterpreterOptions {
        InterpreterOptions {
            num_threads: self.num_threads.unwrap_or_else(probe::thread_hint).max(1),
        }
    }
}

impl Default for AcquireOptions {
    fn default() -> Self {
        Self {
            prefer_accelerator: true,
            accelerator: Device::default(),
            num_threads: None,
        }
    }
}

/// Outcome of `acquire`.
pub enum Acquisition {
    Accelerated(ModelHandle),
    CpuFallback(ModelHandle),
    Failed(InferError),
}

impl Acquisition {
    pub fn into_result(self) -> Result<ModelHandle> {
        match self {
            Acquisition::Accelerated(handle) | Acquisition::CpuFallback(handle) => Ok(handle),
            Acquisition::Failed(err) => Err(err),
        }
    }

    pub fn is_accelerated(&self) -> bool {
        matches!(self, Acquisition::Accelerated(_))
    }
}

impl std::fmt::Debug for Acquisition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Acquisition::Accelerated(_) => write!(f, "Accelerated"),
            Acquisition::CpuFallback(_) => write!(f, "CpuFallback"),
            Acquisition::Failed(err) => write!(f, "Failed({err})"),
        }
    }
}

/// Build an interpreter for `model`, preferring the accelerator when asked.
pub fn acquire(backend: &dyn Backend, model: ModelBytes, options: &AcquireOptions) -> Acquisition {
    let interpreter_options = options.interpreter_options();
    let device = &options.accelerator;

    if options.prefer_accelerator && device.is_accelerator() {
        if probe::guarded(device, || backend.probe(device)) {
            let attempt = panic::catch_unwind(AssertUnwindSafe(|| {
                try_accelerated(backend, &model, &interpreter_options, device)
            }));
            match attempt {
                Ok(Ok((interpreter, delegate))) => {
                    log::info!(
                        "[{}] model loaded on {device} with {} threads",
                        backend.name(),
                        interpreter_options.num_threads
                    );
                    let handle = ModelHandle::new(interpreter, Some(delegate), model);
                    return Acquisition::Accelerated(handle);
                }
                Ok(Err(err)) => {
                    log::warn!("[{}] {device} acquisition failed, using CPU: {err}", backend.name());
                }
                Err(_) => {
                    log::warn!("[{}] {device} acquisition panicked, using CPU", backend.name());
                }
            }
        } else {
            log::info!("[{}] {device} unavailable, using CPU", backend.name());
        }
    }

    match backend.build_interpreter(&model, &interpreter_options, None) {
        Ok(interpreter) => {
            log::info!(
                "[{}] model loaded on CPU with {} threads",
                backend.name(),
                interpreter_options.num_threads
            );
            Acquisition::CpuFallback(ModelHandle::new(interpreter, None, model))
        }
        Err(err) => {
            log::error!("[{}] CPU interpreter failed: {err}", backend.name());
            let err = match err {
                InferError::ModelLoad(msg) => InferError::ModelLoad(msg),
                other => InferError::ModelLoad(other.to_string()),
            };
            Acquisition::Failed(err)
        }
    }
}

/// Load `source` and acquire an interpreter for it.
pub fn open(backend: &dyn Backend, source: &ModelSource, options: &AcquireOptions) -> Result<ModelHandle> {
    let model = source.load()?;
    acquire(backend, model, options).into_result()
}

fn try_accelerated(
    backend: &dyn Backend,
    model: &[u8],
    options: &InterpreterOptions,
    device: &Device,
) -> Result<(Box<dyn Interpreter>, Box<dyn Delegate>)> {
    let mut delegate = backend.create_delegate(device)?;

    let mut interpreter = match backend.build_interpreter(model, options, Some(&*delegate)) {
        Ok(interpreter) => interpreter,
        Err(err) => {
            close_delegate(delegate.as_mut());
            return Err(err);
        }
    };

    if let Err(err) = interpreter.warm_up() {
        interpreter.close();
        close_delegate(delegate.as_mut());
        return Err(err);
    }

    Ok((interpreter, delegate))
}

fn close_delegate(delegate: &mut dyn Delegate) {
    if let Err(err) = delegate.close() {
        log::warn!("failed to close {} delegate: {err}", delegate.device());
    }
}

/// A loaded model and every resource it holds.
///
/// Teardown closes the interpreter, then the delegate, then drops the model
/// bytes. It runs on `release` or on drop, whichever comes first.
pub struct ModelHandle {
    interpreter: Option<Box<dyn Interpreter>>,
    delegate: Option<Box<dyn Delegate>>,
    model: Option<ModelBytes>,
    metadata: ModelMetadata,
    using_accelerator: bool,
}

impl ModelHandle {
    fn new(
        interpreter: Box<dyn Interpreter>,
        delegate: Option<Box<dyn Delegate>>,
        model: ModelBytes,
    ) -> Self {
        let metadata = ModelMetadata::extract(&*interpreter);
        Self {
            using_accelerator: delegate.is_some(),
            interpreter: Some(interpreter),
            delegate,
            model: Some(model),
            metadata,
        }
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    pub fn using_accelerator(&self) -> bool {
        self.using_accelerator
    }

    /// Device the interpreter runs on.
    pub fn device(&self) -> Device {
        self.delegate
            .as_ref()
            .map(|delegate| delegate.device().clone())
            .unwrap_or(Device::Cpu)
    }

    pub fn is_released(&self) -> bool {
        self.interpreter.is_none()
    }

    /// Run one forward pass on a single input and return the first output.
    pub fn run_forward(&mut self, input: &TensorBuffer) -> Result<TensorBuffer> {
        let mut outputs = self.run(std::slice::from_ref(input))?;
        if outputs.is_empty() {
            return Err(InferError::Inference("model produced no outputs".to_string()));
        }
        Ok(outputs.swap_remove(0))
    }

    /// Run one forward pass with auxiliary state buffers after the primary
    /// input, returning every output by name.
    pub fn run_forward_with_state(
        &mut self,
        inputs: &[TensorBuffer],
    ) -> Result<HashMap<String, TensorBuffer>> {
        let outputs = self.run(inputs)?;
        Ok(self
            .metadata
            .outputs
            .iter()
            .map(|info| info.name.clone())
            .zip(outputs)
            .collect())
    }

    fn run(&mut self, inputs: &[TensorBuffer]) -> Result<Vec<TensorBuffer>> {
        let interpreter = self
            .interpreter
            .as_mut()
            .ok_or_else(|| InferError::Inference("model handle has been released".to_string()))?;
        validate_inputs(&self.metadata, inputs)?;
        interpreter.run(inputs)
    }

    /// Close the interpreter, then the delegate. Delegate errors are logged
    /// and swallowed. Calling this more than once has no further effect.
    pub fn release(&mut self) {
        let Some(mut interpreter) = self.interpreter.take() else {
            return;
        };
        interpreter.close();
        drop(interpreter);

        if let Some(mut delegate) = self.delegate.take() {
            close_delegate(delegate.as_mut());
        }
        self.model = None;
        log::debug!("model handle released");
    }
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle")
            .field("device", &self.device())
            .field("metadata", &self.metadata)
            .field("released", &self.is_released())
            .finish()
    }
}

impl Drop for ModelHandle {
    fn drop(&mut self) {
        self.release();
    }
}

fn validate_inputs(metadata: &ModelMetadata, inputs: &[TensorBuffer]) -> Result<()> {
    if inputs.len() != metadata.inputs.len() {
        return Err(InferError::Inference(format!(
            "model expects {} inputs, got {}",
            metadata.inputs.len(),
            inputs.len()
        )));
    }
    for (info, buffer) in metadata.inputs.iter().zip(inputs) {
        if buffer.element_type() != info.element_type {
            return Err(InferError::Inference(format!(
                "input '{}' expects {}, got {}",
                info.name,
                info.element_type,
                buffer.element_type()
            )));
        }
        if !info.shape.is_empty() && !info.accepts(buffer.shape()) {
            return Err(InferError::Shape(format!(
                "input '{}' declared {:?}, got {:?}",
                info.name,
                info.shape,
                buffer.shape()
            )));
        }
    }
    Ok(())
}

use crate::{Backend, Delegate, Device, InferError, Interpreter, InterpreterOptions, TensorInfo};
use ort::session::{Session as OrtSession, SessionInputValue};
use ort::tensor::TensorElementType;
use ort::value::Tensor as OrtTensor;
use parley_base::{ElementType, Tensor, TensorBuffer};
use std::sync::OnceLock;

static ORT_INIT: OnceLock<()> = OnceLock::new();

fn ensure_ort_init() {
    ORT_INIT.get_or_init(|| {
        let _ = ort::init().commit();
    });
}

/// ONNX Runtime backend. Accelerator delegates map to execution providers.
pub struct OnnxBackend;

struct OnnxDelegate {
    device: Device,
}

impl Delegate for OnnxDelegate {
    fn device(&self) -> &Device {
        &self.device
    }

    fn close(&mut self) -> Result<(), InferError> {
        // the execution provider is owned by the session it was registered on
        Ok(())
    }
}

impl Backend for OnnxBackend {
    fn name(&self) -> &str {
        "onnx"
    }

    fn probe(&self, device: &Device) -> bool {
        let available = provider_available(device);
        if !available {
            log::warn!("[onnx] {device} execution provider not available");
        }
        available
    }

    fn create_delegate(&self, device: &Device) -> Result<Box<dyn Delegate>, InferError> {
        if !device.is_accelerator() || !provider_compiled(device) {
            return Err(InferError::UnsupportedDevice(device.clone()));
        }
        Ok(Box::new(OnnxDelegate {
            device: device.clone(),
        }))
    }

    fn build_interpreter(
        &self,
        model: &[u8],
        options: &InterpreterOptions,
        delegate: Option<&dyn Delegate>,
    ) -> Result<Box<dyn Interpreter>, InferError> {
        ensure_ort_init();
        let mut builder = OrtSession::builder()
            .map_err(|e| InferError::Backend(format!("failed to create session builder: {e}")))?
            .with_intra_threads(options.num_threads)
            .map_err(|e| InferError::Backend(format!("failed to set thread count: {e}")))?;

        if let Some(delegate) = delegate {
            builder = with_provider(builder, delegate.device())?;
        }

        let session = builder.commit_from_memory(model).map_err(|e| {
            InferError::ModelLoad(format!("failed to load model from memory: {e}"))
        })?;

        let inputs = session
            .inputs()
            .iter()
            .map(|input| tensor_info(input.name(), input.dtype()))
            .collect::<Result<Vec<_>, _>>()?;
        let outputs = session
            .outputs()
            .iter()
            .map(|output| tensor_info(output.name(), output.dtype()))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Box::new(OnnxInterpreter {
            session: Some(session),
            inputs,
            outputs,
        }))
    }
}

fn provider_compiled(device: &Device) -> bool {
    match device {
        Device::Cpu => false,
        Device::Cuda { .. } => cfg!(feature = "cuda"),
        Device::TensorRt { .. } => cfg!(feature = "tensorrt"),
        Device::CoreMl => cfg!(feature = "coreml"),
        Device::Nnapi => cfg!(feature = "nnapi"),
    }
}

fn provider_available(device: &Device) -> bool {
    #[allow(unused_imports)]
    use ort::ep::ExecutionProvider;

    match device {
        #[cfg(feature = "cuda")]
        Device::Cuda { device_id } => {
            use ort::execution_providers::CUDAExecutionProvider;
            CUDAExecutionProvider::default()
                .with_device_id(*device_id)
                .is_available()
                .unwrap_or(false)
        }
        #[cfg(feature = "tensorrt")]
        Device::TensorRt { device_id, .. } => {
            use ort::execution_providers::TensorRTExecutionProvider;
            TensorRTExecutionProvider::default()
                .with_device_id(*device_id)
                .is_available()
                .unwrap_or(false)
        }
        #[cfg(feature = "coreml")]
        Device::CoreMl => {
            use ort::execution_providers::CoreMLExecutionProvider;
            CoreMLExecutionProvider::default()
                .is_available()
                .unwrap_or(false)
        }
        #[cfg(feature = "nnapi")]
        Device::Nnapi => {
            use ort::execution_providers::NNAPIExecutionProvider;
            NNAPIExecutionProvider::default()
                .is_available()
                .unwrap_or(false)
        }
        _ => false,
    }
}

fn with_provider(
    builder: ort::session::builder::SessionBuilder,
    device: &Device,
) -> Result<ort::session::builder::SessionBuilder, InferError> {
    let unsupported = |_| InferError::UnsupportedDevice(device.clone());
    match device {
        #[cfg(feature = "cuda")]
        Device::Cuda { device_id } => {
            use ort::execution_providers::CUDAExecutionProvider;
            let ep = CUDAExecutionProvider::default().with_device_id(*device_id);
            log::info!("[onnx] using CUDA execution provider (device_id={device_id})");
            builder
                .with_execution_providers([ep.build().error_on_failure()])
                .map_err(unsupported)
        }
        #[cfg(feature = "tensorrt")]
        Device::TensorRt { device_id, fp16 } => {
            use ort::execution_providers::TensorRTExecutionProvider;
            let mut ep = TensorRTExecutionProvider::default().with_device_id(*device_id);
            if *fp16 {
                ep = ep.with_fp16(true);
            }
            log::info!("[onnx] using TensorRT execution provider (device_id={device_id}, fp16={fp16})");
            builder
                .with_execution_providers([ep.build().error_on_failure()])
                .map_err(unsupported)
        }
        #[cfg(feature = "coreml")]
        Device::CoreMl => {
            use ort::execution_providers::CoreMLExecutionProvider;
            log::info!("[onnx] using CoreML execution provider");
            builder
                .with_execution_providers([CoreMLExecutionProvider::default()
                    .build()
                    .error_on_failure()])
                .map_err(unsupported)
        }
        #[cfg(feature = "nnapi")]
        Device::Nnapi => {
            use ort::execution_providers::NNAPIExecutionProvider;
            log::info!("[onnx] using NNAPI execution provider");
            builder
                .with_execution_providers([NNAPIExecutionProvider::default()
                    .build()
                    .error_on_failure()])
                .map_err(unsupported)
        }
        _ => Err(InferError::UnsupportedDevice(device.clone())),
    }
}

fn tensor_info(name: &str, dtype: &ort::value::ValueType) -> Result<TensorInfo, InferError> {
    let shape = dtype
        .tensor_shape()
        .map(|shape| shape.iter().copied().collect())
        .unwrap_or_default();
    let element_type = element_type(name, dtype.tensor_type())?;
    Ok(TensorInfo::new(name, shape, element_type))
}

/// Map a declared element type. Only float32, int32 and int64 tensors can be
/// exchanged with the model.
fn element_type(name: &str, ty: Option<TensorElementType>) -> Result<ElementType, InferError> {
    match ty {
        Some(TensorElementType::Float32) => Ok(ElementType::F32),
        Some(TensorElementType::Int32) => Ok(ElementType::I32),
        Some(TensorElementType::Int64) => Ok(ElementType::I64),
        Some(other) => Err(InferError::ModelLoad(format!(
            "tensor '{name}' has unsupported element type {other:?}"
        ))),
        None => Err(InferError::ModelLoad(format!("'{name}' is not a tensor"))),
    }
}

struct OnnxInterpreter {
    session: Option<OrtSession>,
    inputs: Vec<TensorInfo>,
    outputs: Vec<TensorInfo>,
}

impl Interpreter for OnnxInterpreter {
    fn inputs(&self) -> &[TensorInfo] {
        &self.inputs
    }

    fn outputs(&self) -> &[TensorInfo] {
        &self.outputs
    }

    fn run(&mut self, inputs: &[TensorBuffer]) -> Result<Vec<TensorBuffer>, InferError> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| InferError::Inference("interpreter is closed".to_string()))?;

        let mut feed: Vec<(String, SessionInputValue<'_>)> = Vec::with_capacity(inputs.len());
        for (info, buffer) in self.inputs.iter().zip(inputs) {
            feed.push((info.name.clone(), to_ort_value(buffer)?.into()));
        }

        let outputs = session
            .run(feed)
            .map_err(|e| InferError::Inference(format!("forward pass failed: {e}")))?;

        let mut result = Vec::with_capacity(self.outputs.len());
        for info in &self.outputs {
            let value = &outputs[info.name.as_str()];
            let buffer = match info.element_type {
                ElementType::F32 => {
                    let (shape, data) = value.try_extract_tensor::<f32>().map_err(|e| {
                        InferError::Inference(format!("output '{}' is not float32: {e}", info.name))
                    })?;
                    TensorBuffer::F32(Tensor::new(to_dims(shape), data.to_vec())?)
                }
                ElementType::I32 => {
                    let (shape, data) = value.try_extract_tensor::<i32>().map_err(|e| {
                        InferError::Inference(format!("output '{}' is not int32: {e}", info.name))
                    })?;
                    TensorBuffer::I32(Tensor::new(to_dims(shape), data.to_vec())?)
                }
                ElementType::I64 => {
                    let (shape, data) = value.try_extract_tensor::<i64>().map_err(|e| {
                        InferError::Inference(format!("output '{}' is not int64: {e}", info.name))
                    })?;
                    TensorBuffer::I64(Tensor::new(to_dims(shape), data.to_vec())?)
                }
            };
            result.push(buffer);
        }
        Ok(result)
    }

    fn close(&mut self) {
        self.session = None;
    }
}

fn to_dims(shape: &[i64]) -> Vec<usize> {
    shape.iter().map(|&d| d.max(0) as usize).collect()
}

fn to_ort_value(buffer: &TensorBuffer) -> Result<ort::value::DynValue, InferError> {
    let backend = |e: ort::Error| InferError::Backend(format!("failed to create input tensor: {e}"));
    let value = match buffer {
        TensorBuffer::F32(t) => OrtTensor::from_array((t.shape().to_vec(), t.data().to_vec()))
            .map_err(backend)?
            .into_dyn(),
        TensorBuffer::I32(t) => OrtTensor::from_array((t.shape().to_vec(), t.data().to_vec()))
            .map_err(backend)?
            .into_dyn(),
        TensorBuffer::I64(t) => OrtTensor::from_array((t.shape().to_vec(), t.data().to_vec()))
            .map_err(backend)?
            .into_dyn(),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_element_types() {
        assert_eq!(
            element_type("logits", Some(TensorElementType::Float32)).unwrap(),
            ElementType::F32
        );
        assert_eq!(
            element_type("input_ids", Some(TensorElementType::Int64)).unwrap(),
            ElementType::I64
        );
    }

    #[test]
    fn test_unsupported_element_types_rejected() {
        for ty in [
            TensorElementType::Float16,
            TensorElementType::Bool,
            TensorElementType::Uint8,
        ] {
            match element_type("mask", Some(ty)) {
                Err(InferError::ModelLoad(msg)) => assert!(msg.contains("'mask'")),
                other => panic!("expected ModelLoad error, got {other:?}"),
            }
        }
        assert!(matches!(element_type("map", None), Err(InferError::ModelLoad(_))));
    }
}

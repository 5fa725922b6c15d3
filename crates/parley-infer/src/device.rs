use serde::{Deserialize, Serialize};
use std::fmt;

/// Execution target for a model. Everything except `Cpu` needs an
/// accelerator delegate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Device {
    Cpu,
    Cuda { device_id: i32 },
    TensorRt { device_id: i32, fp16: bool },
    CoreMl,
    Nnapi,
}

impl Device {
    pub fn is_accelerator(&self) -> bool {
        !matches!(self, Device::Cpu)
    }
}

impl Default for Device {
    fn default() -> Self {
        Device::Cuda { device_id: 0 }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "CPU"),
            Device::Cuda { device_id } => write!(f, "CUDA(device_id={device_id})"),
            Device::TensorRt { device_id, fp16 } => {
                write!(f, "TensorRT(device_id={device_id}, fp16={fp16})")
            }
            Device::CoreMl => write!(f, "CoreML"),
            Device::Nnapi => write!(f, "NNAPI"),
        }
    }
}

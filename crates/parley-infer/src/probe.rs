//! Accelerator capability probing.
//!
//! A probe answers "could an accelerator delegate for this device be built in
//! this process" by inspecting what is compiled and linked in. It never
//! allocates device resources and never fails: anything that goes wrong
//! resolves to "unavailable".

use crate::Device;
use std::panic::{self, AssertUnwindSafe};

/// Default probe, used by backends that do not supply their own.
pub fn accelerator_available(device: &Device) -> bool {
    let available = match device {
        Device::Cpu => false,
        Device::Cuda { .. } | Device::TensorRt { .. } => candle_core::utils::cuda_is_available(),
        Device::CoreMl => candle_core::utils::metal_is_available(),
        Device::Nnapi => cfg!(target_os = "android"),
    };
    if available {
        log::debug!("{device} support present");
    } else {
        log::warn!("{device} support not available in this build");
    }
    available
}

/// Run `probe`, treating a panic inside it as "unavailable".
pub fn guarded(device: &Device, probe: impl FnOnce() -> bool) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(probe)) {
        Ok(available) => available,
        Err(_) => {
            log::warn!("capability probe for {device} panicked, treating as unavailable");
            false
        }
    }
}

/// Thread-count hint for interpreters: the number of available cores.
pub fn thread_hint() -> usize {
    candle_core::utils::get_num_threads().max(1)
}

use candle_core::Device;
use tracing::info;
#[cfg(any(feature = "cuda", feature = "metal"))]
use tracing::warn;

use crate::error::{CoreError, CoreResult};

/// Pick the compute device for a load with `acceleration_layers`.
///
/// Zero layers always yields the CPU. Any positive count requests an
/// accelerator; candle offloads whole models, so there is no partial split.
/// When no accelerator can be acquired this returns
/// [`CoreError::DeviceUnavailable`] instead of silently using the CPU, so the
/// caller can record the attempt as failed and retry with zero layers.
pub fn select_device(
    acceleration_layers: u32,
    #[allow(unused_variables)] cuda_device_id: usize,
) -> CoreResult<Device> {
    if acceleration_layers == 0 {
        info!("Using CPU device");
        return Ok(Device::Cpu);
    }

    #[cfg(feature = "cuda")]
    match Device::new_cuda(cuda_device_id) {
        Ok(dev) => {
            info!(cuda_device_id, acceleration_layers, "Using CUDA device");
            return Ok(dev);
        }
        Err(e) => {
            warn!(error = %e, "CUDA unavailable");
        }
    }

    #[cfg(feature = "metal")]
    match Device::new_metal(0) {
        Ok(dev) => {
            info!(acceleration_layers, "Using Metal device");
            return Ok(dev);
        }
        Err(e) => {
            warn!(error = %e, "Metal unavailable");
        }
    }

    Err(CoreError::DeviceUnavailable(format!(
        "{acceleration_layers} acceleration layer(s) requested but no accelerator is available \
         (built with cuda: {}, metal: {})",
        cfg!(feature = "cuda"),
        cfg!(feature = "metal"),
    )))
}

/// Returns a human-readable description of a device.
pub fn device_name(device: &Device) -> &'static str {
    match device {
        Device::Cpu => "CPU",
        Device::Cuda(_) => "CUDA",
        Device::Metal(_) => "Metal",
    }
}

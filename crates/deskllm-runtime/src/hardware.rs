use serde::{Deserialize, Serialize};
use sysinfo::System;
use tracing::debug;

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GpuInfo {
    pub available: bool,
    /// A discrete accelerator with its own memory.
    pub dedicated: bool,
    /// An accelerator integrated on the SoC, sharing system memory.
    pub integrated_soc: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryInfo {
    pub total_gb: f64,
    pub free_gb: f64,
}

/// The hardware facts the load orchestrator needs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HardwareProfile {
    pub gpu: GpuInfo,
    pub memory: MemoryInfo,
}

impl HardwareProfile {
    /// Probe the current machine.
    ///
    /// Memory comes from the OS. Accelerators are reported only when this
    /// build can drive them: CUDA as dedicated, Metal on Apple Silicon as
    /// integrated.
    pub fn detect() -> Self {
        let mut sys = System::new();
        sys.refresh_memory();
        let memory = MemoryInfo {
            total_gb: sys.total_memory() as f64 / BYTES_PER_GB,
            free_gb: sys.available_memory() as f64 / BYTES_PER_GB,
        };

        let dedicated = cfg!(feature = "cuda");
        let integrated_soc = !dedicated && cfg!(all(feature = "metal", target_os = "macos"));
        let gpu = GpuInfo { available: dedicated || integrated_soc, dedicated, integrated_soc };

        debug!(?gpu, total_gb = memory.total_gb, free_gb = memory.free_gb, "Hardware detected");
        Self { gpu, memory }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_reports_sane_memory() {
        let profile = HardwareProfile::detect();
        assert!(profile.memory.total_gb >= 0.0);
        assert!(profile.memory.free_gb >= 0.0);
    }

    #[test]
    fn test_detect_gpu_flags_consistent() {
        let gpu = HardwareProfile::detect().gpu;
        assert_eq!(gpu.available, gpu.dedicated || gpu.integrated_soc);
        assert!(!(gpu.dedicated && gpu.integrated_soc));
    }

    #[test]
    fn test_profile_uses_camel_case() {
        let json = serde_json::to_value(HardwareProfile::default()).unwrap();
        assert!(json["gpu"].get("integratedSoc").is_some());
        assert!(json["memory"].get("freeGb").is_some());
    }
}

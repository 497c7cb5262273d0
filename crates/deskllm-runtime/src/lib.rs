//! # deskllm-runtime
//!
//! Hardware-aware model loading and the caller-facing operations of deskllm.
//!
//! [`Runtime`] ties the model store, the downloader and an
//! [`ExecutionBackend`](deskllm_core::ExecutionBackend) together and exposes
//! every operation as an [`OpResponse`], which serializes to
//! `{"success": true, ...}` or `{"success": false, "error": "..."}`.

pub mod error;
pub mod hardware;
pub mod orchestrator;
pub mod service;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{RuntimeError, RuntimeResult};
pub use hardware::{GpuInfo, HardwareProfile, MemoryInfo};
pub use orchestrator::{acceleration_layers, memory_warning, LoadOrchestrator, LoadReport, SessionSlot};
pub use service::{Runtime, RuntimeOptions};
pub use types::{
    DeleteReport, DownloadReport, GenerateParams, GenerateResponse, ModelList, OpResponse,
    Recommendations, UnloadReport,
};

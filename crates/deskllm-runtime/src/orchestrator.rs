use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, warn};

use deskllm_core::{ExecutionBackend, GenerationDefaults, InferenceContext, Session, ALL_LAYERS};
use deskllm_hub::ModelStore;

use crate::{
    error::{RuntimeError, RuntimeResult},
    hardware::HardwareProfile,
};

/// The process-wide holder of the loaded model.
pub type SessionSlot = Arc<Mutex<Option<Session>>>;

/// Layers requested on an integrated/SoC accelerator: enabled, minimal offload.
pub const INTEGRATED_LAYERS: u32 = 1;

/// Free memory below this multiple of the artifact size triggers a warning.
const MEMORY_HEADROOM: f64 = 2.0;

/// Acceleration layers for a load on `profile`.
pub fn acceleration_layers(profile: &HardwareProfile, cpu_only: bool) -> u32 {
    if cpu_only || !profile.gpu.available {
        0
    } else if profile.gpu.dedicated {
        ALL_LAYERS
    } else if profile.gpu.integrated_soc {
        INTEGRATED_LAYERS
    } else {
        0
    }
}

/// Soft warning when free memory is below twice the artifact size.
pub fn memory_warning(profile: &HardwareProfile, artifact_bytes: u64) -> Option<String> {
    let artifact_gb = artifact_bytes as f64 / (1024.0 * 1024.0 * 1024.0);
    let required = MEMORY_HEADROOM * artifact_gb;
    (profile.memory.free_gb < required).then(|| {
        format!(
            "Only {:.1} GB of memory is free; about {:.1} GB is recommended for this model. \
             Generation may be slow or fail.",
            profile.memory.free_gb, required
        )
    })
}

/// Outcome of a successful load.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadReport {
    pub model_id: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub requested_layers: u32,
    /// Layers of the attempt that succeeded; 0 after a CPU fallback.
    pub acceleration_layers: u32,
    pub fell_back_to_cpu: bool,
    pub context_length: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_warning: Option<String>,
}

/// Turns a catalog id into a loaded [`Session`], degrading to CPU when the
/// accelerated attempt fails.
pub struct LoadOrchestrator {
    backend: Arc<dyn ExecutionBackend>,
    store: ModelStore,
    cpu_only: bool,
}

impl LoadOrchestrator {
    pub fn new(backend: Arc<dyn ExecutionBackend>, store: ModelStore, cpu_only: bool) -> Self {
        Self { backend, store, cpu_only }
    }

    /// Load `id` into `slot`, replacing whatever was there.
    ///
    /// The previous session is released before the first attempt. On failure
    /// `slot` is left empty. `context_length` defaults to, and is clamped by,
    /// the model's maximum.
    ///
    /// The guard travels into the blocking task, so the slot stays locked
    /// until the backend returns even if the caller stops awaiting.
    pub async fn load(
        &self,
        mut slot: OwnedMutexGuard<Option<Session>>,
        id: &str,
        profile: &HardwareProfile,
        context_length: Option<usize>,
    ) -> RuntimeResult<LoadReport> {
        let descriptor = self.store.descriptor(id)?;
        let artifact = self.store.verify(id)?;

        let requested_layers = acceleration_layers(profile, self.cpu_only);
        let memory_warning = memory_warning(profile, artifact.size_bytes);
        if let Some(warning) = &memory_warning {
            warn!(model_id = id, free_gb = profile.memory.free_gb, "{warning}");
        }
        let context_length = context_length
            .unwrap_or(descriptor.max_context_length)
            .min(descriptor.max_context_length)
            .max(1);

        info!(
            model_id = id,
            backend = self.backend.name(),
            acceleration_layers = requested_layers,
            context_length,
            "Loading model"
        );

        if let Some(previous) = slot.take() {
            info!(model_id = previous.model_id(), "Releasing previously loaded model");
            drop(previous);
        }

        let defaults = GenerationDefaults {
            prompt_template: descriptor.prompt_template.clone(),
            max_context_length: descriptor.max_context_length,
            temperature: descriptor.default_temperature,
            top_p: descriptor.default_top_p,
        };
        let backend = Arc::clone(&self.backend);
        let path = artifact.path.clone();
        let model_id = id.to_string();

        let joined = tokio::task::spawn_blocking(move || {
            let mut used_layers = requested_layers;
            let context = match attempt(backend.as_ref(), &path, requested_layers, context_length) {
                Err(cause) if requested_layers > 0 => {
                    warn!(model_id = %model_id, acceleration_layers = requested_layers, %cause, "Accelerated load failed, retrying on CPU");
                    used_layers = 0;
                    attempt(backend.as_ref(), &path, 0, context_length)
                }
                other => other,
            }?;
            let context_length = context.context_length();
            *slot = Some(Session::new(model_id, used_layers, defaults, context));
            Ok::<_, String>((used_layers, context_length))
        })
        .await;

        let (used_layers, context_length) = joined
            .map_err(|e| e.to_string())
            .and_then(|attempts| attempts)
            .map_err(|cause| {
                warn!(model_id = id, %cause, "Model load failed");
                RuntimeError::LoadFailed { model_id: id.to_string(), cause }
            })?;

        info!(model_id = id, acceleration_layers = used_layers, context_length, "Model loaded");
        Ok(LoadReport {
            model_id: id.to_string(),
            path: artifact.path,
            size_bytes: artifact.size_bytes,
            requested_layers,
            acceleration_layers: used_layers,
            fell_back_to_cpu: used_layers != requested_layers,
            context_length,
            memory_warning,
        })
    }
}

/// One load attempt. Errors and panics both come back as a human-readable
/// cause.
fn attempt(
    backend: &dyn ExecutionBackend,
    path: &Path,
    layers: u32,
    context_length: usize,
) -> Result<Box<dyn InferenceContext>, String> {
    let loaded = panic::catch_unwind(AssertUnwindSafe(|| {
        backend.load_model(path, layers)?.create_context(context_length)
    }));
    match loaded {
        Ok(Ok(context)) => Ok(context),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("execution library panicked with {layers} layer(s)")),
    }
}

use std::ops::ControlFlow;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use deskllm_core::{sanitize, ExecutionBackend, Session};
use deskllm_hub::{DownloadProgress, ModelDownloader, ModelStore, VerifiedArtifact};

use crate::{
    error::{RuntimeError, RuntimeResult},
    hardware::HardwareProfile,
    orchestrator::{LoadOrchestrator, LoadReport, SessionSlot},
    types::{
        DeleteReport, DownloadReport, GenerateParams, GenerateResponse, ModelList, OpResponse,
        Recommendations, UnloadReport,
    },
};

/// Runtime-wide settings.
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    /// Never request accelerator layers.
    pub cpu_only: bool,
    /// Context length used when a load does not ask for one.
    pub context_length: Option<usize>,
    /// Token budget used when a generation does not ask for one.
    pub max_new_tokens: usize,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self { cpu_only: false, context_length: None, max_new_tokens: 512 }
    }
}

/// The caller-facing surface: every operation resolves to an [`OpResponse`]
/// and never panics or returns `Err`.
///
/// Holds at most one [`Session`]. Loading and generating both take the
/// session lock for their whole duration, so they never overlap and
/// concurrent generations run one after another. The lock is released by the
/// blocking task doing the work, not by the awaiting caller, so dropping a
/// `load_model` or `generate` future neither unloads the model nor lets the
/// next operation start early.
pub struct Runtime {
    store: ModelStore,
    downloader: ModelDownloader,
    orchestrator: LoadOrchestrator,
    session: SessionSlot,
    options: RuntimeOptions,
}

impl Runtime {
    pub fn new(downloader: ModelDownloader, backend: Arc<dyn ExecutionBackend>, options: RuntimeOptions) -> Self {
        let store = downloader.store().clone();
        let orchestrator = LoadOrchestrator::new(backend, store.clone(), options.cpu_only);
        Self {
            store,
            downloader,
            orchestrator,
            session: SessionSlot::default(),
            options,
        }
    }

    pub fn store(&self) -> &ModelStore {
        &self.store
    }

    /// Id of the loaded model, if any.
    pub async fn loaded_model(&self) -> Option<String> {
        self.session.lock().await.as_ref().map(|s| s.model_id().to_string())
    }

    pub fn list_models(&self) -> OpResponse<ModelList> {
        OpResponse::ok(ModelList { models: self.store.list() })
    }

    pub fn verify_model(&self, id: &str) -> OpResponse<VerifiedArtifact> {
        OpResponse::from_result(self.store.verify(id))
    }

    pub async fn download_model<F>(&self, id: &str, on_progress: F) -> OpResponse<DownloadReport>
    where
        F: FnMut(DownloadProgress) + Send,
    {
        let result = self.downloader.download(id, on_progress).await;
        OpResponse::from_result(result.map(|model| DownloadReport { model }))
    }

    pub fn delete_model(&self, id: &str) -> OpResponse<DeleteReport> {
        let result = self.store.delete(id).map(|removed| DeleteReport { model_id: id.to_string(), removed });
        OpResponse::from_result(result)
    }

    /// Catalog ranked smallest first, with `is_acquired` refreshed.
    pub fn recommend_models(&self, hardware: &HardwareProfile) -> OpResponse<Recommendations> {
        let models = self
            .store
            .catalog()
            .by_ascending_size()
            .into_iter()
            .map(|mut d| {
                d.is_acquired = self.store.is_acquired(&d.id);
                d
            })
            .collect();
        OpResponse::ok(Recommendations { hardware: *hardware, models })
    }

    pub async fn load_model(
        &self,
        id: &str,
        hardware: &HardwareProfile,
        context_length: Option<usize>,
    ) -> OpResponse<LoadReport> {
        let slot = Arc::clone(&self.session).lock_owned().await;
        let context_length = context_length.or(self.options.context_length);
        OpResponse::from_result(self.orchestrator.load(slot, id, hardware, context_length).await)
    }

    pub async fn unload_model(&self) -> OpResponse<UnloadReport> {
        let released = self.session.lock().await.take();
        let model_id = released.as_ref().map(|s| s.model_id().to_string());
        if let Some(id) = &model_id {
            info!(model_id = %id, "Model unloaded");
        }
        OpResponse::ok(UnloadReport { model_id })
    }

    pub async fn generate(&self, params: GenerateParams) -> OpResponse<GenerateResponse> {
        OpResponse::from_result(self.run_generation(params, None).await)
    }

    /// Like [`Runtime::generate`], additionally sending each raw piece to `tx`
    /// as it is produced. Dropping the receiver stops generation.
    pub async fn generate_stream(
        &self,
        params: GenerateParams,
        tx: mpsc::UnboundedSender<String>,
    ) -> OpResponse<GenerateResponse> {
        OpResponse::from_result(self.run_generation(params, Some(tx)).await)
    }

    async fn run_generation(
        &self,
        params: GenerateParams,
        sink: Option<mpsc::UnboundedSender<String>>,
    ) -> RuntimeResult<GenerateResponse> {
        let mut slot = Arc::clone(&self.session).lock_owned().await;
        let request = match slot.as_ref() {
            Some(session) => params.resolve(session.defaults(), self.options.max_new_tokens),
            None => return Err(RuntimeError::NoModelLoaded),
        };

        let joined = tokio::task::spawn_blocking(move || {
            let mut session = slot.take().ok_or(RuntimeError::NoModelLoaded)?;
            // A panic here unwinds with the session taken, leaving the slot empty.
            let output = session.generate(&request, |event| match &sink {
                Some(tx) if tx.send(event.text.to_string()).is_err() => ControlFlow::Break(()),
                _ => ControlFlow::Continue(()),
            });
            let model_id = session.model_id().to_string();
            *slot = Some(session);
            Ok::<_, RuntimeError>((model_id, output))
        })
        .await;

        let (model_id, output) = joined.map_err(|e| {
            warn!(error = %e, "Generation task failed, session released");
            RuntimeError::Task(e.to_string())
        })??;
        let output = output?;
        Ok(GenerateResponse {
            model_id,
            response: sanitize(&output.continuation),
            raw_text: output.raw_text,
            tokens_generated: output.tokens_generated,
            stop_reason: output.stop_reason,
        })
    }
}

use thiserror::Error;

use deskllm_core::CoreError;
use deskllm_hub::HubError;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Hub(#[from] HubError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Failed to load model '{model_id}': {cause}")]
    LoadFailed { model_id: String, cause: String },

    #[error("No model is loaded")]
    NoModelLoaded,

    #[error("Background task failed: {0}")]
    Task(String),
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;

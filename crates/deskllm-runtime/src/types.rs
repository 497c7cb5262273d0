use std::fmt::Display;

use serde::{Deserialize, Serialize};

use deskllm_core::{GenerationDefaults, GenerationRequest, SamplingParams, StopReason};
use deskllm_hub::ModelDescriptor;

use crate::hardware::HardwareProfile;

/// Uniform result of every caller-facing operation.
///
/// Serializes as `{"success": true, ...payload}` or
/// `{"success": false, "error": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpResponse<T> {
    pub success: bool,
    #[serde(flatten)]
    pub payload: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> OpResponse<T> {
    pub fn ok(payload: T) -> Self {
        Self { success: true, payload: Some(payload), error: None }
    }

    pub fn fail(error: impl Display) -> Self {
        Self { success: false, payload: None, error: Some(error.to_string()) }
    }

    pub fn from_result<E: Display>(result: Result<T, E>) -> Self {
        match result {
            Ok(payload) => Self::ok(payload),
            Err(e) => Self::fail(e),
        }
    }

    pub fn into_result(self) -> Result<T, String> {
        if self.success {
            self.payload.ok_or_else(|| "operation returned no payload".to_string())
        } else {
            Err(self.error.unwrap_or_else(|| "unknown error".to_string()))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelList {
    pub models: Vec<ModelDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadReport {
    pub model: ModelDescriptor,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteReport {
    pub model_id: String,
    /// False when there was no file to remove.
    pub removed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendations {
    pub hardware: HardwareProfile,
    /// Smallest artifact first.
    pub models: Vec<ModelDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnloadReport {
    /// The model that was released, if any.
    pub model_id: Option<String>,
}

/// Caller input for `generate`; unset fields come from the loaded model's
/// defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateParams {
    pub prompt: String,
    pub max_tokens: Option<usize>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub seed: Option<u64>,
}

impl GenerateParams {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self { prompt: prompt.into(), ..Default::default() }
    }

    pub(crate) fn resolve(self, defaults: &GenerationDefaults, default_max_tokens: usize) -> GenerationRequest {
        GenerationRequest {
            prompt: self.prompt,
            max_tokens: self.max_tokens.unwrap_or(default_max_tokens),
            sampling: SamplingParams {
                temperature: self.temperature.unwrap_or(defaults.temperature),
                top_p: self.top_p.unwrap_or(defaults.top_p),
                seed: self.seed,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub model_id: String,
    /// Sanitized continuation, ready for display.
    pub response: String,
    /// Formatted prompt plus the raw continuation.
    pub raw_text: String,
    pub tokens_generated: usize,
    pub stop_reason: StopReason,
}

use std::ops::ControlFlow;

use serde::{Deserialize, Serialize};

use crate::{
    backend::InferenceContext,
    error::CoreResult,
    generation::{generate, GenerationOutput, GenerationRequest, TokenEvent},
};

/// Generation settings captured from the model's catalog entry at load time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationDefaults {
    pub prompt_template: String,
    pub max_context_length: usize,
    pub temperature: f64,
    pub top_p: f64,
}

/// The one loaded model of the process.
///
/// Owns the execution context; dropping the session releases it.
pub struct Session {
    model_id: String,
    acceleration_layers: u32,
    defaults: GenerationDefaults,
    context: Box<dyn InferenceContext>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("model_id", &self.model_id)
            .field("acceleration_layers", &self.acceleration_layers)
            .field("context_length", &self.context.context_length())
            .finish()
    }
}

impl Session {
    pub fn new(
        model_id: impl Into<String>,
        acceleration_layers: u32,
        defaults: GenerationDefaults,
        context: Box<dyn InferenceContext>,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            acceleration_layers,
            defaults,
            context,
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Layers actually used by the successful load attempt.
    pub fn acceleration_layers(&self) -> u32 {
        self.acceleration_layers
    }

    pub fn defaults(&self) -> &GenerationDefaults {
        &self.defaults
    }

    pub fn context_length(&self) -> usize {
        self.context.context_length()
    }

    /// Run one request through this session's context and prompt template.
    pub fn generate<F>(&mut self, request: &GenerationRequest, on_token: F) -> CoreResult<GenerationOutput>
    where
        F: FnMut(TokenEvent<'_>) -> ControlFlow<()>,
    {
        generate(self.context.as_mut(), &self.defaults.prompt_template, request, on_token)
    }
}

use std::ops::ControlFlow;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    backend::{BatchToken, InferenceContext},
    error::{CoreError, CoreResult},
    sampling::{Sampler, SamplingParams},
};

/// Substitution point for user text inside a prompt template.
pub const PROMPT_PLACEHOLDER: &str = "{prompt}";

/// One generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    pub max_tokens: usize,
    #[serde(flatten)]
    pub sampling: SamplingParams,
}

/// Why the decode loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndOfSequence,
    MaxTokens,
    ContextFull,
    /// A logits, sampling or decode step failed after prefill; output is partial.
    DecodeFailed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationOutput {
    /// Formatted prompt followed by every generated piece.
    pub raw_text: String,
    /// Generated text alone, trimmed.
    pub continuation: String,
    pub prompt_tokens: usize,
    pub tokens_generated: usize,
    pub stop_reason: StopReason,
}

/// A token as it is appended to the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenEvent<'a> {
    /// Zero-based index among generated tokens.
    pub index: usize,
    pub id: u32,
    pub text: &'a str,
}

/// Replace the template's placeholder with the trimmed user text.
///
/// Templates without a placeholder get the text appended.
pub fn format_prompt(template: &str, prompt: &str) -> CoreResult<String> {
    let text = prompt.trim();
    if text.is_empty() {
        return Err(CoreError::EmptyPrompt);
    }
    if template.contains(PROMPT_PLACEHOLDER) {
        Ok(template.replacen(PROMPT_PLACEHOLDER, text, 1))
    } else {
        Ok(format!("{template}{text}"))
    }
}

/// Drive `ctx` through tokenize, prefill and the per-token decode loop.
///
/// `on_token` sees every appended piece and may return
/// [`ControlFlow::Break`] to stop after it.
///
/// Errors before the first generated token are fatal (`EmptyPrompt`,
/// `TokenizeError`, `SequenceTooLong`, `PrefillError`). Failures inside the
/// loop end generation early with [`StopReason::DecodeFailed`] and the text
/// produced so far.
pub fn generate<F>(
    ctx: &mut dyn InferenceContext,
    template: &str,
    request: &GenerationRequest,
    mut on_token: F,
) -> CoreResult<GenerationOutput>
where
    F: FnMut(TokenEvent<'_>) -> ControlFlow<()>,
{
    let formatted = format_prompt(template, &request.prompt)?;

    let prompt_ids = ctx
        .tokenize(&formatted)
        .map_err(|e| CoreError::TokenizeError(e.to_string()))?;
    if prompt_ids.is_empty() {
        return Err(CoreError::TokenizeError("prompt produced no tokens".to_string()));
    }
    let n_ctx = ctx.context_length();
    if prompt_ids.len() > n_ctx {
        return Err(CoreError::SequenceTooLong { got: prompt_ids.len(), max: n_ctx });
    }
    debug!(prompt_tokens = prompt_ids.len(), n_ctx, "Prompt tokenized");

    ctx.decode(&BatchToken::sequence(&prompt_ids, 0))
        .map_err(|e| CoreError::PrefillError(e.to_string()))?;

    let eos = ctx.eos_token_id();
    let mut sampler = Sampler::new(request.sampling);
    let mut raw_text = formatted.clone();
    let mut pos = prompt_ids.len();
    let mut generated = 0usize;
    let mut stop_reason = StopReason::MaxTokens;

    while generated < request.max_tokens {
        let next = ctx.logits().and_then(|logits| sampler.sample(&logits));
        let id = match next {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, generated, "Sampling step failed, returning partial output");
                stop_reason = StopReason::DecodeFailed;
                break;
            }
        };

        if Some(id) == eos {
            stop_reason = StopReason::EndOfSequence;
            break;
        }

        let piece = ctx.token_to_text(id).unwrap_or_else(|e| {
            debug!(token = id, error = %e, "Token has no text");
            String::new()
        });
        raw_text.push_str(&piece);
        let event = TokenEvent { index: generated, id, text: &piece };
        generated += 1;

        if on_token(event).is_break() {
            stop_reason = StopReason::Cancelled;
            break;
        }
        if generated == request.max_tokens {
            break;
        }
        if pos >= n_ctx {
            stop_reason = StopReason::ContextFull;
            break;
        }
        if let Err(e) = ctx.decode(&[BatchToken { id, pos }]) {
            warn!(error = %e, pos, generated, "Decode step failed, returning partial output");
            stop_reason = StopReason::DecodeFailed;
            break;
        }
        pos += 1;
    }

    let continuation = raw_text
        .get(formatted.len()..)
        .unwrap_or_default()
        .trim()
        .to_string();
    debug!(tokens_generated = generated, stop_reason = ?stop_reason, "Generation finished");

    Ok(GenerationOutput {
        raw_text,
        continuation,
        prompt_tokens: prompt_ids.len(),
        tokens_generated: generated,
        stop_reason,
    })
}

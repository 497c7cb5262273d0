use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CoreResult;

/// Offload every layer the accelerator can hold.
pub const ALL_LAYERS: u32 = 999;

/// One token submitted to [`InferenceContext::decode`] at an explicit position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchToken {
    pub id: u32,
    pub pos: usize,
}

impl BatchToken {
    /// Tokens laid out at consecutive positions starting at `start`.
    pub fn sequence(ids: &[u32], start: usize) -> Vec<Self> {
        ids.iter()
            .enumerate()
            .map(|(offset, &id)| Self { id, pos: start + offset })
            .collect()
    }
}

/// Entry point into an execution library.
///
/// Implementations must be `Send + Sync` so one backend can be shared by the
/// orchestrator while loads run on blocking threads.
pub trait ExecutionBackend: Send + Sync {
    /// Short name used in logs (e.g. `"candle"`).
    fn name(&self) -> &str;

    /// Load model weights from `path`.
    ///
    /// `acceleration_layers == 0` means pure CPU execution; any positive value
    /// requests an accelerator.
    fn load_model(&self, path: &Path, acceleration_layers: u32) -> CoreResult<Box<dyn ModelHandle>>;
}

/// A model resident in memory, not yet bound to a decode context.
///
/// Dropping the handle releases the model.
pub trait ModelHandle: Send {
    /// Consume the model and create a decode context of `context_length` positions.
    fn create_context(self: Box<Self>, context_length: usize) -> CoreResult<Box<dyn InferenceContext>>;
}

/// A loaded model plus one active decode context (KV history, position).
///
/// All calls are blocking. Dropping the context releases both the context and
/// the model it owns.
pub trait InferenceContext: Send {
    /// Convert text to token ids.
    fn tokenize(&mut self, text: &str) -> CoreResult<Vec<u32>>;

    /// Run the model over `batch`.
    ///
    /// A batch starting at position 0 discards any previous history.
    /// Afterwards [`InferenceContext::logits`] reflects the last token of the batch.
    fn decode(&mut self, batch: &[BatchToken]) -> CoreResult<()>;

    /// Vocabulary-sized logits for the most recent decode step.
    fn logits(&mut self) -> CoreResult<Vec<f32>>;

    /// Text fragment for a single token, including any leading-space marker.
    fn token_to_text(&self, id: u32) -> CoreResult<String>;

    fn vocab_size(&self) -> usize;

    fn eos_token_id(&self) -> Option<u32>;

    /// Number of positions the context can hold.
    fn context_length(&self) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_positions_are_consecutive() {
        let batch = BatchToken::sequence(&[10, 20, 30], 0);
        assert_eq!(
            batch,
            vec![
                BatchToken { id: 10, pos: 0 },
                BatchToken { id: 20, pos: 1 },
                BatchToken { id: 30, pos: 2 },
            ]
        );
    }

    #[test]
    fn test_sequence_with_offset() {
        let batch = BatchToken::sequence(&[7], 41);
        assert_eq!(batch, vec![BatchToken { id: 7, pos: 41 }]);
    }

    #[test]
    fn test_batch_token_serde() {
        let json = serde_json::to_string(&BatchToken { id: 5, pos: 2 }).unwrap();
        assert_eq!(json, r#"{"id":5,"pos":2}"#);
    }
}

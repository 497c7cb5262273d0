use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Candle error: {0}")]
    Candle(#[from] candle_core::Error),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Model config error: {field}: {reason}")]
    Config { field: String, reason: String },

    #[error("Unsupported model architecture: {0}")]
    UnsupportedArchitecture(String),

    #[error("Device not available: {0}")]
    DeviceUnavailable(String),

    #[error("Sequence too long: {got} tokens, max {max}")]
    SequenceTooLong { got: usize, max: usize },

    #[error("Prompt is empty")]
    EmptyPrompt,

    #[error("Failed to tokenize prompt: {0}")]
    TokenizeError(String),

    #[error("Prompt prefill failed: {0}")]
    PrefillError(String),

    #[error("Decode step failed: {0}")]
    Decode(String),

    #[error("Sampling failed: {0}")]
    Sampling(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

//! # deskllm-core
//!
//! Inference execution for deskllm: the execution-library seam, the candle
//! GGUF backend, token sampling, the generation loop and output cleanup.
//!
//! ## Supported Architectures
//!
//! | Architecture | Format | Struct |
//! |--------------|--------|--------|
//! | LLaMA / Mistral | GGUF (quantized) | [`QuantizedModel`] |
//! | Qwen2 | GGUF (quantized) | [`QuantizedModel`] |
//!
//! ## Feature Flags
//!
//! | Flag | Effect |
//! |---|---|
//! | `cuda` | Enable CUDA GPU acceleration |
//! | `metal` | Enable Apple Metal GPU acceleration |

pub mod backend;
pub mod device;
pub mod error;
pub mod generation;
pub mod quantized;
pub mod sampling;
pub mod sanitize;
pub mod session;
pub mod tokenizer;

pub use backend::{BatchToken, ExecutionBackend, InferenceContext, ModelHandle, ALL_LAYERS};
pub use device::select_device;
pub use error::{CoreError, CoreResult};
pub use generation::{
    format_prompt, generate, GenerationOutput, GenerationRequest, StopReason, TokenEvent,
};
pub use quantized::{CandleBackend, QuantizedModel};
pub use sampling::{Sampler, SamplingParams};
pub use sanitize::{sanitize, FALLBACK_RESPONSE};
pub use session::{GenerationDefaults, Session};
pub use tokenizer::Tokenizer;

use std::path::Path;

use candle_core::{quantized::gguf_file, DType, Device, IndexOp, Tensor};
use candle_transformers::models::{quantized_llama, quantized_qwen2};
use tracing::{info, warn};

use crate::{
    backend::{BatchToken, ExecutionBackend, InferenceContext, ModelHandle},
    device::{device_name, select_device},
    error::{CoreError, CoreResult},
    tokenizer::{gguf_u32, Tokenizer},
};

// ─── Backend ──────────────────────────────────────────────────────────────────

/// [`ExecutionBackend`] that runs GGUF artifacts through candle's quantized
/// LLaMA and Qwen2 implementations.
#[derive(Debug, Clone, Default)]
pub struct CandleBackend {
    cuda_device_id: usize,
}

impl CandleBackend {
    pub fn new(cuda_device_id: usize) -> Self {
        Self { cuda_device_id }
    }
}

impl ExecutionBackend for CandleBackend {
    fn name(&self) -> &str {
        "candle"
    }

    fn load_model(&self, path: &Path, acceleration_layers: u32) -> CoreResult<Box<dyn ModelHandle>> {
        let device = select_device(acceleration_layers, self.cuda_device_id)?;
        Ok(Box::new(QuantizedModel::load(path, &device)?))
    }
}

// ─── Architecture dispatch ────────────────────────────────────────────────────

/// Wraps either a LLaMA-family or Qwen2 quantized model so both can be used
/// behind the same `forward` call.
enum QuantizedWeights {
    Llama(quantized_llama::ModelWeights),
    Qwen2(quantized_qwen2::ModelWeights),
}

impl QuantizedWeights {
    fn forward(&mut self, x: &Tensor, index_pos: usize) -> candle_core::Result<Tensor> {
        match self {
            Self::Llama(m) => m.forward(x, index_pos),
            Self::Qwen2(m) => m.forward(x, index_pos),
        }
    }
}

// ─── Model ────────────────────────────────────────────────────────────────────

/// GGUF weights and tokenizer resident on a device.
pub struct QuantizedModel {
    weights: QuantizedWeights,
    tokenizer: Tokenizer,
    arch: String,
    device: Device,
    add_bos: bool,
    trained_context: Option<usize>,
}

impl std::fmt::Debug for QuantizedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuantizedModel")
            .field("arch", &self.arch)
            .field("device", &device_name(&self.device))
            .field("trained_context", &self.trained_context)
            .finish()
    }
}

impl QuantizedModel {
    /// Read a single-file GGUF artifact onto `device`.
    pub fn load(path: &Path, device: &Device) -> CoreResult<Self> {
        info!(path = %path.display(), device = device_name(device), "Loading quantized GGUF model");

        let mut file = std::fs::File::open(path).map_err(CoreError::Io)?;
        let content = gguf_file::Content::read(&mut file).map_err(|e| e.with_path(path))?;

        let arch = match content.metadata.get("general.architecture") {
            Some(gguf_file::Value::String(s)) => s.clone(),
            _ => "llama".to_string(),
        };

        // Everything needed from the metadata must be read before `from_gguf`
        // takes ownership of `content`.
        let tokenizer = Tokenizer::from_gguf_metadata(&content.metadata)?;
        let trained_context =
            gguf_u32(&content.metadata, &format!("{arch}.context_length")).map(|n| n as usize);
        let add_bos = match content.metadata.get("tokenizer.ggml.add_bos_token") {
            Some(gguf_file::Value::Bool(b)) => *b,
            _ => arch != "qwen2",
        };

        let weights = match arch.as_str() {
            "qwen2" => QuantizedWeights::Qwen2(quantized_qwen2::ModelWeights::from_gguf(
                content, &mut file, device,
            )?),
            "llama" | "mistral" => QuantizedWeights::Llama(quantized_llama::ModelWeights::from_gguf(
                content, &mut file, device,
            )?),
            other => return Err(CoreError::UnsupportedArchitecture(other.to_string())),
        };

        info!(architecture = %arch, trained_context, add_bos, "Quantized model loaded");
        Ok(Self {
            weights,
            tokenizer,
            arch,
            device: device.clone(),
            add_bos,
            trained_context,
        })
    }

    /// The GGUF architecture string (e.g. `"qwen2"`, `"llama"`).
    pub fn architecture(&self) -> &str {
        &self.arch
    }
}

impl ModelHandle for QuantizedModel {
    fn create_context(self: Box<Self>, context_length: usize) -> CoreResult<Box<dyn InferenceContext>> {
        if context_length == 0 {
            return Err(CoreError::Config {
                field: "context_length".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        let context_length = match self.trained_context {
            Some(trained) if context_length > trained => {
                warn!(requested = context_length, trained, "Context length clamped to the trained maximum");
                trained
            }
            _ => context_length,
        };

        Ok(Box::new(QuantizedContext {
            model: *self,
            context_length,
            last_logits: None,
        }))
    }
}

// ─── Context ──────────────────────────────────────────────────────────────────

/// Decode context over a [`QuantizedModel`]; the KV cache lives inside the weights.
pub struct QuantizedContext {
    model: QuantizedModel,
    context_length: usize,
    last_logits: Option<Tensor>,
}

impl InferenceContext for QuantizedContext {
    fn tokenize(&mut self, text: &str) -> CoreResult<Vec<u32>> {
        let mut ids = Vec::new();
        if self.model.add_bos {
            ids.extend(self.model.tokenizer.bos_token_id());
        }
        ids.extend(self.model.tokenizer.encode(text)?);
        Ok(ids)
    }

    fn decode(&mut self, batch: &[BatchToken]) -> CoreResult<()> {
        let Some(first) = batch.first() else {
            return Err(CoreError::Decode("empty batch".to_string()));
        };
        let start = first.pos;
        if batch.iter().enumerate().any(|(i, t)| t.pos != start + i) {
            return Err(CoreError::Decode("batch positions must be consecutive".to_string()));
        }
        let end = start + batch.len();
        if end > self.context_length {
            return Err(CoreError::SequenceTooLong { got: end, max: self.context_length });
        }

        let ids: Vec<u32> = batch.iter().map(|t| t.id).collect();
        let input = Tensor::new(ids.as_slice(), &self.model.device)?.unsqueeze(0)?;
        // Position 0 resets the KV cache inside the candle models.
        let logits = self.model.weights.forward(&input, start)?;
        self.last_logits = Some(last_token_logits(&logits, batch.len() - 1)?);
        Ok(())
    }

    fn logits(&mut self) -> CoreResult<Vec<f32>> {
        let logits = self
            .last_logits
            .as_ref()
            .ok_or_else(|| CoreError::Decode("no decode step has run".to_string()))?;
        Ok(logits.to_dtype(DType::F32)?.to_vec1()?)
    }

    fn token_to_text(&self, id: u32) -> CoreResult<String> {
        self.model.tokenizer.decode_token(id)
    }

    fn vocab_size(&self) -> usize {
        self.model.tokenizer.vocab_size()
    }

    fn eos_token_id(&self) -> Option<u32> {
        self.model.tokenizer.eos_token_id()
    }

    fn context_length(&self) -> usize {
        self.context_length
    }
}

/// Extract the logits for a single sequence position from the model output.
///
/// Different candle model implementations return different shapes:
/// - `[batch, seq_len, vocab]`: full sequence logits
/// - `[batch, vocab]`: only the last token's logits
/// - `[vocab]`: already squeezed
fn last_token_logits(logits: &Tensor, seq_pos: usize) -> CoreResult<Tensor> {
    match logits.dims() {
        [_, _, _] => Ok(logits.i((0, seq_pos))?),
        [_, _] => Ok(logits.i(0)?),
        [_] => Ok(logits.clone()),
        dims => Err(CoreError::Config {
            field: "logits".to_string(),
            reason: format!("Unexpected logits shape: {dims:?}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_token_logits_three_dims() {
        let t = Tensor::arange(0f32, 12f32, &Device::Cpu).unwrap().reshape((1, 3, 4)).unwrap();
        let last = last_token_logits(&t, 2).unwrap();
        assert_eq!(last.to_vec1::<f32>().unwrap(), vec![8.0, 9.0, 10.0, 11.0]);
    }

    #[test]
    fn test_last_token_logits_two_dims() {
        let t = Tensor::arange(0f32, 4f32, &Device::Cpu).unwrap().reshape((1, 4)).unwrap();
        let last = last_token_logits(&t, 7).unwrap();
        assert_eq!(last.dims(), &[4]);
    }

    #[test]
    fn test_last_token_logits_rejects_scalar() {
        let t = Tensor::new(1f32, &Device::Cpu).unwrap();
        assert!(matches!(last_token_logits(&t, 0), Err(CoreError::Config { .. })));
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let backend = CandleBackend::default();
        let result = backend.load_model(Path::new("/definitely/not/here.gguf"), 0);
        assert!(matches!(result, Err(CoreError::Io(_))));
    }

    #[test]
    fn test_load_with_layers_without_accelerator() {
        #[cfg(not(any(feature = "cuda", feature = "metal")))]
        {
            let backend = CandleBackend::default();
            let result = backend.load_model(Path::new("/definitely/not/here.gguf"), 999);
            assert!(matches!(result, Err(CoreError::DeviceUnavailable(_))));
        }
    }
}

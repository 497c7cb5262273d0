use std::collections::{HashMap, HashSet};

use candle_core::quantized::gguf_file;
use tokenizers::{AddedToken, Tokenizer as HfTokenizer};
use tracing::{debug, info};

use crate::error::{CoreError, CoreResult};

type Metadata = HashMap<String, gguf_file::Value>;

/// How single tokens are turned back into text.
///
/// Pieces are decoded one at a time while generating. The HF `Metaspace`
/// decoder strips the leading `▁` of whatever it sees first, which for a
/// single-token call is every token, so SentencePiece vocabularies are
/// decoded by hand instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    /// GPT-2 / Qwen2 byte-level BPE (`Ġ` → space).
    ByteLevel,
    /// LLaMA-style SentencePiece: `▁` word marker, `<0xNN>` byte fallback.
    SentencePiece,
}

/// Tokenizer rebuilt from the `tokenizer.ggml.*` keys of a GGUF artifact.
#[derive(Debug)]
pub struct Tokenizer {
    inner: HfTokenizer,
    eos_token_id: Option<u32>,
    bos_token_id: Option<u32>,
    family: Family,
}

impl Tokenizer {
    /// Build a tokenizer from GGUF metadata.
    ///
    /// Dispatches on `tokenizer.ggml.model`:
    /// - `"llama"` (and variants) → SentencePiece Unigram
    /// - anything else → byte-level BPE
    pub fn from_gguf_metadata(metadata: &Metadata) -> CoreResult<Self> {
        let tokens = gguf_string_array(metadata, "tokenizer.ggml.tokens").ok_or_else(|| {
            CoreError::Config {
                field: "tokenizer".to_string(),
                reason: "GGUF file has no tokenizer.ggml.tokens".to_string(),
            }
        })?;

        let model = match metadata.get("tokenizer.ggml.model") {
            Some(gguf_file::Value::String(s)) => s.clone(),
            _ => "gpt2".to_string(),
        };

        info!(vocab_size = tokens.len(), tokenizer_model = %model, "Building tokenizer from GGUF metadata");

        let (mut inner, family) = match model.as_str() {
            "llama" | "llama2" | "llama3" => (sentencepiece(metadata, &tokens)?, Family::SentencePiece),
            _ => (byte_level_bpe(metadata, &tokens)?, Family::ByteLevel),
        };

        match family {
            Family::SentencePiece => {
                use tokenizers::pre_tokenizers::metaspace::{Metaspace, PrependScheme};
                inner.with_pre_tokenizer(Some(Metaspace::new('▁', PrependScheme::First, false)));
            }
            Family::ByteLevel if model == "gpt2" => {
                use tokenizers::decoders::byte_level::ByteLevel as ByteLevelDec;
                use tokenizers::pre_tokenizers::byte_level::ByteLevel as ByteLevelPre;
                inner.with_pre_tokenizer(Some(ByteLevelPre::new(false, true, true)));
                inner.with_decoder(Some(ByteLevelDec::new(false, true, true)));
            }
            Family::ByteLevel => {}
        }

        let eos_token_id = gguf_u32(metadata, "tokenizer.ggml.eos_token_id");
        let bos_token_id = gguf_u32(metadata, "tokenizer.ggml.bos_token_id");

        // Prompt templates embed control markers such as `<|im_start|>`; they
        // must encode to single ids rather than byte fragments.
        let special: Vec<AddedToken> = special_token_ids(metadata, &tokens, [eos_token_id, bos_token_id])
            .into_iter()
            .filter_map(|i| tokens.get(i))
            .map(|tok| AddedToken::from(tok.clone(), true))
            .collect();
        if !special.is_empty() {
            debug!(count = special.len(), "Registering special tokens");
            inner.add_special_tokens(&special);
        }

        debug!(eos_token_id, bos_token_id, vocab_size = inner.get_vocab_size(true), "Tokenizer ready");

        Ok(Self { inner, eos_token_id, bos_token_id, family })
    }

    /// Encode text to token ids. Special-token markers in `text` are honoured.
    pub fn encode(&self, text: &str) -> CoreResult<Vec<u32>> {
        let encoding = self
            .inner
            .encode(text, false)
            .map_err(|e| CoreError::Tokenizer(e.to_string()))?;
        Ok(encoding.get_ids().to_vec())
    }

    /// Decode a single token id to the text it contributes to the output.
    pub fn decode_token(&self, id: u32) -> CoreResult<String> {
        match self.family {
            Family::SentencePiece => {
                let raw = self
                    .inner
                    .id_to_token(id)
                    .ok_or_else(|| CoreError::Tokenizer(format!("Unknown token id: {id}")))?;

                if let Some(byte) = parse_byte_token(&raw) {
                    return Ok(String::from_utf8_lossy(&[byte]).to_string());
                }
                Ok(raw.replace('\u{2581}', " "))
            }
            Family::ByteLevel => self
                .inner
                .decode(&[id], false)
                .map_err(|e| CoreError::Tokenizer(e.to_string())),
        }
    }

    pub fn eos_token_id(&self) -> Option<u32> {
        self.eos_token_id
    }

    pub fn bos_token_id(&self) -> Option<u32> {
        self.bos_token_id
    }

    pub fn vocab_size(&self) -> usize {
        self.inner.get_vocab_size(true)
    }

    /// Look up the id of an exact token string (e.g. `"<|im_end|>"`).
    pub fn token_id(&self, text: &str) -> Option<u32> {
        self.inner.token_to_id(text)
    }
}

fn sentencepiece(metadata: &Metadata, tokens: &[String]) -> CoreResult<HfTokenizer> {
    let scores = gguf_f32_array(metadata, "tokenizer.ggml.scores").unwrap_or_default();
    let vocab: Vec<(String, f64)> = tokens
        .iter()
        .zip(scores.into_iter().chain(std::iter::repeat(0.0)))
        .map(|(t, s)| (t.clone(), s as f64))
        .collect();
    let unk_id = gguf_u32(metadata, "tokenizer.ggml.unknown_token_id").map(|id| id as usize);

    let unigram = tokenizers::models::unigram::Unigram::from(vocab, unk_id, true)
        .map_err(|e| CoreError::Tokenizer(format!("Unigram build error: {e}")))?;
    Ok(HfTokenizer::new(unigram))
}

fn byte_level_bpe(metadata: &Metadata, tokens: &[String]) -> CoreResult<HfTokenizer> {
    let vocab: HashMap<String, u32> = tokens
        .iter()
        .enumerate()
        .map(|(i, t)| (t.clone(), i as u32))
        .collect();
    let merges: Vec<(String, String)> = gguf_string_array(metadata, "tokenizer.ggml.merges")
        .unwrap_or_default()
        .iter()
        .filter_map(|m| {
            let (a, b) = m.split_once(' ')?;
            Some((a.to_string(), b.to_string()))
        })
        .collect();

    let bpe = tokenizers::models::bpe::BPE::builder()
        .vocab_and_merges(vocab, merges)
        .byte_fallback(true)
        .build()
        .map_err(|e| CoreError::Tokenizer(format!("BPE build error: {e}")))?;
    Ok(HfTokenizer::new(bpe))
}

/// Ids that must never be split: EOS/BOS, entries typed CONTROL (3) or
/// USER_DEFINED (4), and anything shaped like a chat marker.
fn special_token_ids(
    metadata: &Metadata,
    tokens: &[String],
    always: [Option<u32>; 2],
) -> HashSet<usize> {
    let mut ids: HashSet<usize> = always.into_iter().flatten().map(|id| id as usize).collect();

    // Qwen2 files store the type array as U32, older ones as I32.
    if let Some(gguf_file::Value::Array(types)) = metadata.get("tokenizer.ggml.token_type") {
        for (i, typ) in types.iter().enumerate() {
            let t = match typ {
                gguf_file::Value::I32(t) => *t as i64,
                gguf_file::Value::U32(t) => *t as i64,
                gguf_file::Value::U8(t) => *t as i64,
                _ => continue,
            };
            if t == 3 || t == 4 {
                ids.insert(i);
            }
        }
    }

    for (i, tok) in tokens.iter().enumerate() {
        let marker = tok.starts_with('<') && tok.ends_with('>') && tok.len() <= 32;
        if marker && parse_byte_token(tok).is_none() {
            ids.insert(i);
        }
    }
    ids
}

/// `<0xNN>` byte-fallback pieces.
fn parse_byte_token(raw: &str) -> Option<u8> {
    let hex = raw.strip_prefix("<0x")?.strip_suffix('>')?;
    if hex.len() != 2 {
        return None;
    }
    u8::from_str_radix(hex, 16).ok()
}

// ─── GGUF metadata helpers ────────────────────────────────────────────────────

fn gguf_string_array(metadata: &Metadata, key: &str) -> Option<Vec<String>> {
    match metadata.get(key) {
        Some(gguf_file::Value::Array(arr)) => {
            let strings: Vec<String> = arr
                .iter()
                .filter_map(|v| match v {
                    gguf_file::Value::String(s) => Some(s.clone()),
                    _ => None,
                })
                .collect();
            (!strings.is_empty()).then_some(strings)
        }
        _ => None,
    }
}

fn gguf_f32_array(metadata: &Metadata, key: &str) -> Option<Vec<f32>> {
    match metadata.get(key) {
        Some(gguf_file::Value::Array(arr)) => {
            let floats: Vec<f32> = arr
                .iter()
                .filter_map(|v| match v {
                    gguf_file::Value::F32(f) => Some(*f),
                    _ => None,
                })
                .collect();
            (!floats.is_empty()).then_some(floats)
        }
        _ => None,
    }
}

/// Read an integer key as `u32`, tolerating the widths different writers use.
pub fn gguf_u32(metadata: &Metadata, key: &str) -> Option<u32> {
    match metadata.get(key) {
        Some(gguf_file::Value::U32(v)) => Some(*v),
        Some(gguf_file::Value::U64(v)) => u32::try_from(*v).ok(),
        Some(gguf_file::Value::I32(v)) => u32::try_from(*v).ok(),
        _ => None,
    }
}

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{HubError, HubResult};

/// A downloadable model artifact known to the application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDescriptor {
    /// Unique key; also names the file on disk.
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Expected artifact size in bytes.
    pub size_bytes: u64,
    pub primary_url: String,
    /// Alternate sources, tried in order after `primary_url` fails.
    #[serde(default)]
    pub mirror_urls: Vec<String>,
    /// Human-readable parameter count (e.g. `"1.1B"`).
    #[serde(default)]
    pub param_count: String,
    /// Quantization label (e.g. `"Q4_K_M"`).
    #[serde(default)]
    pub quantization: String,
    /// Prompt wrapper with a single `{prompt}` substitution point.
    pub prompt_template: String,
    pub max_context_length: usize,
    pub default_temperature: f64,
    pub default_top_p: f64,
    /// Optional SHA-256 hex digest of the artifact.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    /// Recomputed from the filesystem on every catalog read.
    #[serde(default)]
    pub is_acquired: bool,
}

impl ModelDescriptor {
    /// Download sources in the order they are attempted: primary, then mirrors.
    pub fn sources(&self) -> Vec<&str> {
        std::iter::once(self.primary_url.as_str())
            .chain(self.mirror_urls.iter().map(String::as_str))
            .collect()
    }

    /// Expected artifact size in GiB.
    pub fn size_gb(&self) -> f64 {
        self.size_bytes as f64 / (1024.0 * 1024.0 * 1024.0)
    }
}

/// The static set of models the application can acquire and load.
///
/// Built once at start-up; entries are never removed at runtime.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    entries: Vec<ModelDescriptor>,
}

impl ModelCatalog {
    /// Build a catalog, rejecting duplicate ids, empty ids and missing primary URLs.
    pub fn new(entries: Vec<ModelDescriptor>) -> HubResult<Self> {
        let mut seen = HashSet::new();
        for entry in &entries {
            if entry.id.trim().is_empty() {
                return Err(HubError::InvalidCatalog("model id must not be empty".into()));
            }
            if entry.id.contains(['/', '\\']) || entry.id.contains("..") {
                return Err(HubError::InvalidCatalog(format!(
                    "model id '{}' must not contain path separators",
                    entry.id
                )));
            }
            if entry.primary_url.trim().is_empty() {
                return Err(HubError::InvalidCatalog(format!(
                    "model '{}' has no primary URL",
                    entry.id
                )));
            }
            if !seen.insert(entry.id.as_str()) {
                return Err(HubError::InvalidCatalog(format!("duplicate model id '{}'", entry.id)));
            }
        }
        Ok(Self { entries })
    }

    /// Load a catalog from a JSON array of descriptors.
    pub fn from_file(path: &Path) -> HubResult<Self> {
        let json = std::fs::read_to_string(path).map_err(HubError::Io)?;
        let entries: Vec<ModelDescriptor> = serde_json::from_str(&json)?;
        info!(path = %path.display(), models = entries.len(), "Loaded model catalog from file");
        Self::new(entries)
    }

    /// The catalog shipped with the application.
    pub fn builtin() -> Self {
        Self { entries: builtin_entries() }
    }

    pub fn get(&self, id: &str) -> HubResult<&ModelDescriptor> {
        self.entries
            .iter()
            .find(|d| d.id == id)
            .ok_or_else(|| HubError::UnknownModel(id.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModelDescriptor> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Catalog entries ordered smallest artifact first.
    ///
    /// Size is a monotonic proxy for "runs on more hardware"; ties keep
    /// catalog order.
    pub fn by_ascending_size(&self) -> Vec<ModelDescriptor> {
        let mut ranked = self.entries.clone();
        ranked.sort_by_key(|d| d.size_bytes);
        ranked
    }
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

// ─── Built-in catalog ─────────────────────────────────────────────────────────

const CHATML_TEMPLATE: &str = "<|im_start|>system\nYou are a helpful assistant.<|im_end|>\n<|im_start|>user\n{prompt}<|im_end|>\n<|im_start|>assistant\n";
const ZEPHYR_TEMPLATE: &str = "<|system|>\nYou are a helpful assistant.</s>\n<|user|>\n{prompt}</s>\n<|assistant|>\n";
const LLAMA3_TEMPLATE: &str = "<|start_header_id|>user<|end_header_id|>\n\n{prompt}<|eot_id|><|start_header_id|>assistant<|end_header_id|>\n\n";
const MISTRAL_TEMPLATE: &str = "[INST] {prompt} [/INST]";

fn hf_url(host: &str, repo: &str, file: &str) -> String {
    format!("https://{host}/{repo}/resolve/main/{file}")
}

#[allow(clippy::too_many_arguments)]
fn hf_entry(
    id: &str,
    name: &str,
    description: &str,
    repo: &str,
    file: &str,
    size_bytes: u64,
    param_count: &str,
    quantization: &str,
    prompt_template: &str,
    max_context_length: usize,
) -> ModelDescriptor {
    ModelDescriptor {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        size_bytes,
        primary_url: hf_url("huggingface.co", repo, file),
        mirror_urls: vec![hf_url("hf-mirror.com", repo, file)],
        param_count: param_count.to_string(),
        quantization: quantization.to_string(),
        prompt_template: prompt_template.to_string(),
        max_context_length,
        default_temperature: 0.7,
        default_top_p: 0.9,
        sha256: None,
        is_acquired: false,
    }
}

fn builtin_entries() -> Vec<ModelDescriptor> {
    vec![
        hf_entry(
            "qwen2.5-0.5b-instruct",
            "Qwen2.5 0.5B Instruct",
            "Very small multilingual chat model; runs on almost anything.",
            "Qwen/Qwen2.5-0.5B-Instruct-GGUF",
            "qwen2.5-0.5b-instruct-q4_k_m.gguf",
            491_400_032,
            "0.5B",
            "Q4_K_M",
            CHATML_TEMPLATE,
            32_768,
        ),
        hf_entry(
            "tinyllama-1.1b-chat",
            "TinyLlama 1.1B Chat",
            "Compact LLaMA-architecture chat model.",
            "TheBloke/TinyLlama-1.1B-Chat-v1.0-GGUF",
            "tinyllama-1.1b-chat-v1.0.Q4_K_M.gguf",
            668_788_096,
            "1.1B",
            "Q4_K_M",
            ZEPHYR_TEMPLATE,
            2_048,
        ),
        hf_entry(
            "llama-3.2-1b-instruct",
            "Llama 3.2 1B Instruct",
            "Small Llama 3.2 instruction-tuned model.",
            "bartowski/Llama-3.2-1B-Instruct-GGUF",
            "Llama-3.2-1B-Instruct-Q4_K_M.gguf",
            807_694_464,
            "1.2B",
            "Q4_K_M",
            LLAMA3_TEMPLATE,
            8_192,
        ),
        hf_entry(
            "qwen2.5-1.5b-instruct",
            "Qwen2.5 1.5B Instruct",
            "Balanced quality and speed for laptops.",
            "Qwen/Qwen2.5-1.5B-Instruct-GGUF",
            "qwen2.5-1.5b-instruct-q4_k_m.gguf",
            1_117_320_736,
            "1.5B",
            "Q4_K_M",
            CHATML_TEMPLATE,
            32_768,
        ),
        hf_entry(
            "mistral-7b-instruct",
            "Mistral 7B Instruct v0.2",
            "General-purpose 7B model; needs a dedicated GPU or plenty of RAM.",
            "TheBloke/Mistral-7B-Instruct-v0.2-GGUF",
            "mistral-7b-instruct-v0.2.Q4_K_M.gguf",
            4_368_439_584,
            "7.2B",
            "Q4_K_M",
            MISTRAL_TEMPLATE,
            32_768,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(id: &str, size_bytes: u64) -> ModelDescriptor {
        ModelDescriptor {
            id: id.to_string(),
            name: id.to_string(),
            description: String::new(),
            size_bytes,
            primary_url: format!("http://example.invalid/{id}.gguf"),
            mirror_urls: vec![],
            param_count: String::new(),
            quantization: String::new(),
            prompt_template: "{prompt}".to_string(),
            max_context_length: 512,
            default_temperature: 0.7,
            default_top_p: 0.9,
            sha256: None,
            is_acquired: false,
        }
    }

    #[test]
    fn test_builtin_catalog_is_valid() {
        let builtin = ModelCatalog::builtin();
        let entries: Vec<_> = builtin.iter().cloned().collect();
        assert!(!entries.is_empty());
        assert!(ModelCatalog::new(entries).is_ok());
        for d in builtin.iter() {
            assert!(
                d.prompt_template.contains("{prompt}"),
                "template for {} must contain the placeholder",
                d.id
            );
        }
    }

    #[test]
    fn test_sources_put_primary_first() {
        let mut d = descriptor("a", 10);
        d.mirror_urls = vec!["http://m1".into(), "http://m2".into()];
        assert_eq!(d.sources(), vec!["http://example.invalid/a.gguf", "http://m1", "http://m2"]);
    }

    #[test]
    fn test_get_unknown_model_fails() {
        let catalog = ModelCatalog::new(vec![descriptor("a", 1)]).unwrap();
        assert!(matches!(catalog.get("nope"), Err(HubError::UnknownModel(id)) if id == "nope"));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let result = ModelCatalog::new(vec![descriptor("a", 1), descriptor("a", 2)]);
        assert!(matches!(result, Err(HubError::InvalidCatalog(_))));
    }

    #[test]
    fn test_path_like_ids_rejected() {
        let result = ModelCatalog::new(vec![descriptor("../etc", 1)]);
        assert!(matches!(result, Err(HubError::InvalidCatalog(_))));
    }

    #[test]
    fn test_ranking_is_ascending_by_size() {
        let catalog = ModelCatalog::new(vec![
            descriptor("big", 300),
            descriptor("small", 100),
            descriptor("mid", 200),
        ])
        .unwrap();
        let ids: Vec<_> = catalog.by_ascending_size().into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["small", "mid", "big"]);
    }

    #[test]
    fn test_catalog_file_uses_camel_case_keys() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("catalog.json");
        std::fs::write(
            &path,
            r#"[{
                "id": "tiny",
                "name": "Tiny",
                "sizeBytes": 2048,
                "primaryUrl": "http://localhost/tiny.gguf",
                "mirrorUrls": ["http://mirror/tiny.gguf"],
                "promptTemplate": "Q: {prompt}\nA:",
                "maxContextLength": 256,
                "defaultTemperature": 0.5,
                "defaultTopP": 0.8
            }]"#,
        )
        .unwrap();
        let catalog = ModelCatalog::from_file(&path).unwrap();
        let tiny = catalog.get("tiny").unwrap();
        assert_eq!(tiny.size_bytes, 2048);
        assert_eq!(tiny.mirror_urls.len(), 1);
        assert!(!tiny.is_acquired);
    }
}

use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

/// Full runtime configuration loaded from TOML + env vars.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub network: NetworkConfig,
    pub inference: InferenceConfig,
    pub device: DeviceConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    pub models_dir: String,
    pub min_artifact_bytes: u64,
    /// JSON catalog replacing the built-in one.
    #[serde(default)]
    pub catalog_file: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NetworkConfig {
    pub timeout_secs: u64,
    pub max_redirects: usize,
    pub user_agent: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InferenceConfig {
    /// Overrides the model's trained context when set.
    #[serde(default)]
    pub context_length: Option<usize>,
    pub max_new_tokens: usize,
    /// Overrides the catalog's sampling defaults when set.
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub top_p: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeviceConfig {
    pub cpu_only: bool,
    pub cuda_device_id: usize,
}

/// Load configuration from:
/// 1. Built-in defaults
/// 2. `config/default.toml` (if present)
/// 3. A custom config file path (if provided)
/// 4. Environment variables prefixed with `DESKLLM_`
pub fn load_config(config_file: Option<&PathBuf>) -> Result<AppConfig, ConfigError> {
    let models_dir = deskllm_hub::ModelStore::default_models_dir();
    let mut builder = Config::builder()
        .set_default("store.models_dir", models_dir.to_string_lossy().into_owned())?
        .set_default("store.min_artifact_bytes", deskllm_hub::MIN_ARTIFACT_BYTES as i64)?
        .set_default("network.timeout_secs", 30_i64)?
        .set_default("network.max_redirects", 5_i64)?
        .set_default("network.user_agent", deskllm_hub::download::DEFAULT_USER_AGENT)?
        .set_default("inference.max_new_tokens", 512_i64)?
        .set_default("device.cpu_only", false)?
        .set_default("device.cuda_device_id", 0_i64)?
        .add_source(File::with_name("config/default").required(false));

    if let Some(path) = config_file {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    // DESKLLM_DEVICE__CPU_ONLY=true, DESKLLM_STORE__MODELS_DIR=..., etc.
    builder = builder.add_source(
        Environment::with_prefix("DESKLLM")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

pub fn catalog_path(cfg: &AppConfig) -> Option<PathBuf> {
    cfg.store.catalog_file.as_deref().map(|raw| deskllm_hub::expand_tilde(Path::new(raw)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = load_config(None).unwrap();
        assert_eq!(cfg.network.timeout_secs, 30);
        assert_eq!(cfg.network.max_redirects, 5);
        assert_eq!(cfg.store.min_artifact_bytes, deskllm_hub::MIN_ARTIFACT_BYTES);
        assert_eq!(cfg.inference.max_new_tokens, 512);
        assert!(cfg.inference.context_length.is_none());
        assert!(cfg.inference.temperature.is_none());
        assert!(cfg.store.catalog_file.is_none());
        assert!(!cfg.device.cpu_only);
    }

    #[test]
    fn test_default_models_dir_is_namespaced() {
        let cfg = load_config(None).unwrap();
        assert!(cfg.store.models_dir.contains("deskllm"), "got: {}", cfg.store.models_dir);
    }

    #[test]
    fn test_custom_config_file_overrides_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("custom.toml");
        std::fs::write(
            &file,
            "[device]\ncpu_only = true\n\n[inference]\ntemperature = 0.2\ncontext_length = 1024\n\n[store]\ncatalog_file = \"~/catalog.json\"\n",
        )
        .unwrap();

        let cfg = load_config(Some(&file)).unwrap();
        assert!(cfg.device.cpu_only);
        assert_eq!(cfg.inference.temperature, Some(0.2));
        assert_eq!(cfg.inference.context_length, Some(1024));
        assert_eq!(cfg.inference.max_new_tokens, 512);
        assert_eq!(cfg.store.catalog_file.as_deref(), Some("~/catalog.json"));
    }

    #[test]
    fn test_missing_custom_file_is_an_error() {
        let path = PathBuf::from("/nonexistent/deskllm.toml");
        assert!(load_config(Some(&path)).is_err());
    }

    #[test]
    fn test_catalog_path_expands_tilde() {
        let mut cfg = load_config(None).unwrap();
        assert!(catalog_path(&cfg).is_none());

        cfg.store.catalog_file = Some("/etc/deskllm/catalog.json".to_string());
        assert_eq!(catalog_path(&cfg), Some(PathBuf::from("/etc/deskllm/catalog.json")));

        if dirs::home_dir().is_some() {
            cfg.store.catalog_file = Some("~/catalog.json".to_string());
            let path = catalog_path(&cfg).unwrap();
            assert!(!path.to_string_lossy().starts_with('~'));
            assert!(path.ends_with("catalog.json"));
        }
    }
}

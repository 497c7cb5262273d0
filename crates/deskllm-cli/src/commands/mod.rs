pub mod delete;
pub mod hardware;
pub mod list;
pub mod pull;
pub mod recommend;
pub mod run;
pub mod verify;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde::Serialize;
use tracing::info;

use deskllm_core::CandleBackend;
use deskllm_hub::{DownloadOptions, ModelCatalog, ModelDownloader, ModelStore};
use deskllm_runtime::{OpResponse, Runtime, RuntimeOptions};

use crate::config::{catalog_path, AppConfig};

/// Wire the store, downloader and candle backend described by `config`.
pub fn build_runtime(config: &AppConfig, cpu_only: bool) -> anyhow::Result<Runtime> {
    let catalog = match catalog_path(config) {
        Some(path) => ModelCatalog::from_file(&path)
            .with_context(|| format!("Failed to load catalog {}", path.display()))?,
        None => ModelCatalog::builtin(),
    };

    let store = ModelStore::new(&config.store.models_dir, Arc::new(catalog), config.store.min_artifact_bytes)?;
    info!(models_dir = %store.root().display(), models = store.catalog().len(), "Opened model store");

    let downloader = ModelDownloader::new(
        store,
        DownloadOptions {
            user_agent: config.network.user_agent.clone(),
            max_redirects: config.network.max_redirects,
            timeout: Duration::from_secs(config.network.timeout_secs),
        },
    )?;

    let backend = Arc::new(CandleBackend::new(config.device.cuda_device_id));
    let options = RuntimeOptions {
        cpu_only: cpu_only || config.device.cpu_only,
        context_length: config.inference.context_length,
        max_new_tokens: config.inference.max_new_tokens,
    };
    Ok(Runtime::new(downloader, backend, options))
}

/// Print `resp` as JSON when asked, then turn a failure into an error.
pub fn finish<T: Serialize>(resp: OpResponse<T>, json: bool) -> anyhow::Result<T> {
    if json {
        println!("{}", serde_json::to_string_pretty(&resp)?);
    }
    resp.into_result().map_err(anyhow::Error::msg)
}

pub fn format_gb(bytes: u64) -> String {
    format!("{:.2} GB", bytes as f64 / 1_073_741_824.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_gb() {
        assert_eq!(format_gb(1_073_741_824), "1.00 GB");
        assert_eq!(format_gb(0), "0.00 GB");
    }

    #[test]
    fn test_finish_passes_payload_through() {
        assert_eq!(finish(OpResponse::ok(7u32), false).unwrap(), 7);
    }

    #[test]
    fn test_finish_turns_failure_into_error() {
        let err = finish(OpResponse::<u32>::fail("Unknown model 'x'"), false).unwrap_err();
        assert_eq!(err.to_string(), "Unknown model 'x'");
    }
}

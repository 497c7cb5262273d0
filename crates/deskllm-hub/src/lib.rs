//! # deskllm-hub
//!
//! Model catalog, on-disk artifact store and mirror-fallback downloader for deskllm.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use deskllm_hub::{DownloadOptions, ModelCatalog, ModelDownloader, ModelStore, MIN_ARTIFACT_BYTES};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = ModelStore::new(
//!         ModelStore::default_models_dir(),
//!         Arc::new(ModelCatalog::builtin()),
//!         MIN_ARTIFACT_BYTES,
//!     )?;
//!     let downloader = ModelDownloader::new(store, DownloadOptions::default())?;
//!     let model = downloader.download("qwen2.5-0.5b-instruct", |p| {
//!         if let Some(pct) = p.percent {
//!             eprintln!("{pct:.1}%");
//!         }
//!     }).await?;
//!     println!("acquired: {}", model.is_acquired);
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod download;
pub mod error;
pub mod integrity;
pub mod store;

pub use catalog::{ModelCatalog, ModelDescriptor};
pub use download::{DownloadOptions, DownloadProgress, ModelDownloader};
pub use error::{HubError, HubResult};
pub use store::{expand_tilde, ModelStore, VerifiedArtifact, MIN_ARTIFACT_BYTES};

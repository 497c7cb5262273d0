use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::catalog::{ModelCatalog, ModelDescriptor};
use crate::error::{HubError, HubResult};

/// Files smaller than this are treated as corrupt rather than partial.
pub const MIN_ARTIFACT_BYTES: u64 = 1024 * 1024;

const ARTIFACT_EXTENSION: &str = "gguf";
const PARTIAL_SUFFIX: &str = ".part";
const QUARANTINE_MARKER: &str = ".corrupt-";

/// A model file that passed [`ModelStore::verify`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedArtifact {
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Maps catalog ids to files under the models directory.
///
/// Layout:
/// - `<root>/<id>.gguf`: verified artifact
/// - `<root>/<id>.gguf.part`: in-flight download
/// - `<root>/<id>.gguf.corrupt-<timestamp>`: quarantined undersized file
#[derive(Debug, Clone)]
pub struct ModelStore {
    root: PathBuf,
    catalog: Arc<ModelCatalog>,
    min_artifact_bytes: u64,
}

impl ModelStore {
    /// Create a store rooted at `root`, creating the directory if needed.
    pub fn new(
        root: impl Into<PathBuf>,
        catalog: Arc<ModelCatalog>,
        min_artifact_bytes: u64,
    ) -> HubResult<Self> {
        let root = expand_tilde(&root.into());
        std::fs::create_dir_all(&root).map_err(|e| {
            HubError::InvalidModelsDir(format!("cannot create {}: {e}", root.display()))
        })?;
        Ok(Self { root, catalog, min_artifact_bytes })
    }

    /// Default models directory: `<local data dir>/deskllm/models`.
    pub fn default_models_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("deskllm")
            .join("models")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    pub fn min_artifact_bytes(&self) -> u64 {
        self.min_artifact_bytes
    }

    /// Final on-disk location of a model's artifact.
    pub fn resolve_path(&self, id: &str) -> HubResult<PathBuf> {
        let descriptor = self.catalog.get(id)?;
        Ok(self.root.join(format!("{}.{ARTIFACT_EXTENSION}", descriptor.id)))
    }

    /// Write target for an in-flight download of `id`.
    pub fn temp_path(&self, id: &str) -> HubResult<PathBuf> {
        let final_path = self.resolve_path(id)?;
        Ok(with_suffix(&final_path, PARTIAL_SUFFIX))
    }

    /// Whether a usable artifact for `id` is on disk right now.
    pub fn is_acquired(&self, id: &str) -> bool {
        self.resolve_path(id)
            .ok()
            .and_then(|p| std::fs::metadata(p).ok())
            .map(|m| m.is_file() && m.len() >= self.min_artifact_bytes)
            .unwrap_or(false)
    }

    /// A catalog entry with `is_acquired` refreshed from disk.
    pub fn descriptor(&self, id: &str) -> HubResult<ModelDescriptor> {
        let mut descriptor = self.catalog.get(id)?.clone();
        descriptor.is_acquired = self.is_acquired(id);
        Ok(descriptor)
    }

    /// Every catalog entry with `is_acquired` refreshed from disk.
    pub fn list(&self) -> Vec<ModelDescriptor> {
        self.catalog
            .iter()
            .map(|d| {
                let mut d = d.clone();
                d.is_acquired = self.is_acquired(&d.id);
                d
            })
            .collect()
    }

    /// Check that the artifact for `id` exists and is not undersized.
    ///
    /// An undersized file is moved aside with [`ModelStore::quarantine`] so a
    /// later download can proceed while the bad file stays inspectable.
    pub fn verify(&self, id: &str) -> HubResult<VerifiedArtifact> {
        let path = self.resolve_path(id)?;
        let meta = match std::fs::metadata(&path) {
            Ok(m) if m.is_file() => m,
            Ok(_) | Err(_) => {
                debug!(model_id = id, path = %path.display(), "Model file missing");
                return Err(HubError::FileMissing { path: path.display().to_string() });
            }
        };

        let size = meta.len();
        if size < self.min_artifact_bytes {
            let quarantined = self.quarantine(&path)?;
            warn!(
                model_id = id,
                size,
                min = self.min_artifact_bytes,
                quarantined = %quarantined.display(),
                "Model file too small, quarantined"
            );
            return Err(HubError::FileTooSmall {
                path: path.display().to_string(),
                size,
                min: self.min_artifact_bytes,
            });
        }

        Ok(VerifiedArtifact { path, size_bytes: size })
    }

    /// Rename `path` to `<path>.corrupt-<timestamp>` and return the new path.
    pub fn quarantine(&self, path: &Path) -> HubResult<PathBuf> {
        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%3f");
        let target = with_suffix(path, &format!("{QUARANTINE_MARKER}{stamp}"));
        std::fs::rename(path, &target).map_err(HubError::Io)?;
        Ok(target)
    }

    /// Quarantined files for `id`, oldest first.
    pub fn quarantined(&self, id: &str) -> HubResult<Vec<PathBuf>> {
        let final_path = self.resolve_path(id)?;
        let prefix = format!(
            "{}{QUARANTINE_MARKER}",
            final_path.file_name().unwrap_or_default().to_string_lossy()
        );
        let mut found: Vec<PathBuf> = std::fs::read_dir(&self.root)
            .map_err(HubError::Io)?
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(&prefix))
            .map(|e| e.path())
            .collect();
        found.sort();
        Ok(found)
    }

    /// Remove the artifact (and any stale partial download) for `id`.
    ///
    /// Returns `true` if an artifact was removed; a missing file is not an error.
    pub fn delete(&self, id: &str) -> HubResult<bool> {
        let path = self.resolve_path(id)?;
        remove_if_exists(&self.temp_path(id)?)?;
        let removed = remove_if_exists(&path)?;
        if removed {
            info!(model_id = id, path = %path.display(), "Deleted model file");
        }
        Ok(removed)
    }
}

/// Delete `path` if present. Returns whether anything was removed.
pub(crate) fn remove_if_exists(path: &Path) -> HubResult<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(HubError::Io(e)),
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(suffix);
    path.with_file_name(name)
}

/// Expand a leading `~/` to the home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

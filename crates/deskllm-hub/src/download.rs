use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::StreamExt;
use reqwest::{header::LOCATION, StatusCode, Url};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::{
    catalog::ModelDescriptor,
    error::{HubError, HubResult},
    integrity::verify_integrity,
    store::{remove_if_exists, ModelStore},
};

/// Identification sent with every request. Some mirrors reject clients
/// without a browser-looking user agent.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Redirect hops followed before giving up on a source.
pub const DEFAULT_MAX_REDIRECTS: usize = 5;

/// Connect and read timeout of the transport.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Transport settings for [`ModelDownloader`].
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub user_agent: String,
    pub max_redirects: usize,
    pub timeout: Duration,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_redirects: DEFAULT_MAX_REDIRECTS,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Progress report emitted after every received chunk.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadProgress {
    pub model_id: String,
    pub bytes_done: u64,
    pub bytes_total: Option<u64>,
    /// `None` when the server did not report a content length.
    pub percent: Option<f64>,
}

/// Book-keeping for one in-flight download from one source.
#[derive(Debug)]
struct Acquisition<'a> {
    model_id: &'a str,
    tmp_path: &'a Path,
    received: u64,
    expected: Option<u64>,
}

impl Acquisition<'_> {
    fn progress(&self) -> DownloadProgress {
        let percent = self
            .expected
            .filter(|&total| total > 0)
            .map(|total| (self.received as f64 / total as f64 * 100.0).min(100.0));
        DownloadProgress {
            model_id: self.model_id.to_string(),
            bytes_done: self.received,
            bytes_total: self.expected,
            percent,
        }
    }
}

// ─── Downloader ───────────────────────────────────────────────────────────────

/// Fetches catalog artifacts into a [`ModelStore`], falling back across mirrors.
pub struct ModelDownloader {
    store: ModelStore,
    http: reqwest::Client,
    max_redirects: usize,
}

impl ModelDownloader {
    pub fn new(store: ModelStore, options: DownloadOptions) -> HubResult<Self> {
        // Redirects are followed by hand so the hop count can be reported.
        let http = reqwest::Client::builder()
            .user_agent(options.user_agent)
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(options.timeout)
            .read_timeout(options.timeout)
            .build()?;

        Ok(Self { store, http, max_redirects: options.max_redirects })
    }

    pub fn store(&self) -> &ModelStore {
        &self.store
    }

    /// Download the artifact for `id`, trying the primary URL and then each
    /// mirror in order.
    ///
    /// Returns the refreshed descriptor on success. When every source fails
    /// the error is [`HubError::AllMirrorsFailed`] carrying the last failure.
    pub async fn download<F>(&self, id: &str, mut on_progress: F) -> HubResult<ModelDescriptor>
    where
        F: FnMut(DownloadProgress) + Send,
    {
        let descriptor = self.store.catalog().get(id)?.clone();
        let dest = self.store.resolve_path(id)?;
        let tmp_path = self.store.temp_path(id)?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(HubError::Io)?;
        }
        if remove_if_exists(&tmp_path)? {
            warn!(model_id = id, path = %tmp_path.display(), "Removed stale partial download");
        }

        let sources = descriptor.sources();
        let mut last_error = None;

        for (index, url) in sources.iter().enumerate() {
            info!(model_id = id, url, attempt = index + 1, of = sources.len(), "Downloading model");

            match self.fetch_source(&descriptor, url, &dest, &tmp_path, &mut on_progress).await {
                Ok(()) => {
                    info!(model_id = id, url, path = %dest.display(), "Model downloaded");
                    return self.store.descriptor(id);
                }
                Err(e) => {
                    warn!(model_id = id, url, error = %e, "Download source failed");
                    if let Err(cleanup) = remove_if_exists(&tmp_path) {
                        warn!(path = %tmp_path.display(), error = %cleanup, "Could not remove partial file");
                    }
                    last_error = Some(e);
                }
            }
        }

        let last = last_error.unwrap_or_else(|| {
            HubError::InvalidCatalog(format!("model '{id}' has no download sources"))
        });
        Err(HubError::AllMirrorsFailed {
            model_id: id.to_string(),
            attempts: sources.len(),
            last: Box::new(last),
        })
    }

    /// One complete attempt against a single source.
    ///
    /// Size is checked three times: the declared `Content-Length`, the bytes
    /// written to the temporary file, and the renamed final file.
    async fn fetch_source<F>(
        &self,
        descriptor: &ModelDescriptor,
        url: &str,
        dest: &Path,
        tmp_path: &PathBuf,
        on_progress: &mut F,
    ) -> HubResult<()>
    where
        F: FnMut(DownloadProgress) + Send,
    {
        let min = self.store.min_artifact_bytes();
        let response = self.open(url).await?;

        let expected = response.content_length();
        if let Some(size) = expected {
            if size < min {
                return Err(HubError::HeaderSizeTooSmall { url: url.to_string(), size, min });
            }
        }

        let mut state = Acquisition {
            model_id: &descriptor.id,
            tmp_path,
            received: 0,
            expected,
        };
        self.stream_to_disk(response, &mut state, on_progress).await?;

        let written = tokio::fs::metadata(tmp_path).await.map_err(HubError::Io)?.len();
        if written < min {
            remove_if_exists(tmp_path)?;
            return Err(HubError::WrittenSizeTooSmall { url: url.to_string(), size: written, min });
        }

        if let Some(expected_sha) = descriptor.sha256.as_deref() {
            let path = tmp_path.clone();
            let expected_sha = expected_sha.to_string();
            tokio::task::spawn_blocking(move || verify_integrity(&path, &expected_sha))
                .await
                .map_err(|e| HubError::Io(std::io::Error::other(e)))??;
        }

        tokio::fs::rename(tmp_path, dest).await.map_err(HubError::Io)?;
        self.store.verify(&descriptor.id)?;
        Ok(())
    }

    /// Send a GET for `url`, following redirects up to `max_redirects` hops.
    async fn open(&self, url: &str) -> HubResult<reqwest::Response> {
        let mut current = Url::parse(url).map_err(|e| HubError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        for hop in 0..=self.max_redirects {
            let response = self.http.get(current.clone()).send().await?;
            let status = response.status();

            if is_followed_redirect(status) {
                if hop == self.max_redirects {
                    break;
                }
                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| HubError::BadStatus {
                        url: current.to_string(),
                        status: status.as_u16(),
                    })?;
                let next = current.join(location).map_err(|e| HubError::InvalidUrl {
                    url: location.to_string(),
                    reason: e.to_string(),
                })?;
                debug!(from = %current, to = %next, hop = hop + 1, "Following redirect");
                current = next;
                continue;
            }

            if !status.is_success() {
                return Err(HubError::BadStatus {
                    url: current.to_string(),
                    status: status.as_u16(),
                });
            }
            return Ok(response);
        }

        Err(HubError::TooManyRedirects { url: url.to_string(), max: self.max_redirects })
    }

    /// Write a streaming HTTP body to the acquisition's temporary file,
    /// reporting progress per chunk.
    async fn stream_to_disk<F>(
        &self,
        response: reqwest::Response,
        state: &mut Acquisition<'_>,
        on_progress: &mut F,
    ) -> HubResult<()>
    where
        F: FnMut(DownloadProgress) + Send,
    {
        let mut file = tokio::fs::File::create(state.tmp_path).await.map_err(HubError::Io)?;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await.map_err(HubError::Io)?;
            state.received += chunk.len() as u64;
            on_progress(state.progress());
        }

        file.flush().await.map_err(HubError::Io)?;
        file.sync_all().await.map_err(HubError::Io)?;
        Ok(())
    }
}

fn is_followed_redirect(status: StatusCode) -> bool {
    matches!(status.as_u16(), 301 | 302 | 303 | 307 | 308)
}

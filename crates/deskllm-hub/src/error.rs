use thiserror::Error;

#[derive(Debug, Error)]
pub enum HubError {
    #[error("Unknown model id: {0}")]
    UnknownModel(String),

    #[error("Model file missing: {path}")]
    FileMissing { path: String },

    #[error("Model file too small ({size} bytes, minimum {min}): {path}")]
    FileTooSmall { path: String, size: u64, min: u64 },

    #[error("HTTP {status} from {url}")]
    BadStatus { url: String, status: u16 },

    #[error("Too many redirects (more than {max}) starting at {url}")]
    TooManyRedirects { url: String, max: usize },

    #[error("Server reported {size} bytes for {url}, below the {min} byte minimum")]
    HeaderSizeTooSmall { url: String, size: u64, min: u64 },

    #[error("Downloaded only {size} bytes from {url}, below the {min} byte minimum")]
    WrittenSizeTooSmall { url: String, size: u64, min: u64 },

    #[error("All {attempts} download source(s) failed for '{model_id}': {last}")]
    AllMirrorsFailed {
        model_id: String,
        attempts: usize,
        #[source]
        last: Box<HubError>,
    },

    #[error("Integrity check failed for '{file}': expected {expected}, got {actual}")]
    IntegrityMismatch {
        file: String,
        expected: String,
        actual: String,
    },

    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid model catalog: {0}")]
    InvalidCatalog(String),

    #[error("Invalid models directory: {0}")]
    InvalidModelsDir(String),
}

pub type HubResult<T> = Result<T, HubError>;

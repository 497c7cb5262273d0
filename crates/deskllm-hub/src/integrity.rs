use std::io::BufReader;
use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{HubError, HubResult};

/// Compute the SHA-256 hex digest of a file, streaming it from disk.
pub fn sha256_file(path: &Path) -> HubResult<String> {
    let file = std::fs::File::open(path).map_err(HubError::Io)?;
    let mut reader = BufReader::with_capacity(1 << 20, file);
    let mut hasher = Sha256::new();
    std::io::copy(&mut reader, &mut hasher).map_err(HubError::Io)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Verify that `path` matches the expected SHA-256 hex string.
///
/// Returns `Ok(())` on success, `Err(HubError::IntegrityMismatch)` on failure.
pub fn verify_integrity(path: &Path, expected_sha256: &str) -> HubResult<()> {
    let actual = sha256_file(path)?;
    debug!(
        path = %path.display(),
        expected = expected_sha256,
        actual = %actual,
        "Verifying file integrity"
    );
    if actual.eq_ignore_ascii_case(expected_sha256) {
        Ok(())
    } else {
        Err(HubError::IntegrityMismatch {
            file: path.to_string_lossy().to_string(),
            expected: expected_sha256.to_string(),
            actual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    fn write_temp_file(dir: &TempDir, name: &str, contents: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_sha256_known_value() {
        let dir = TempDir::new().unwrap();
        let path = write_temp_file(&dir, "hello.txt", b"hello");
        assert_eq!(sha256_file(&path).unwrap(), HELLO_SHA256);
    }

    #[test]
    fn test_verify_integrity_case_insensitive() {
        let dir = TempDir::new().unwrap();
        let path = write_temp_file(&dir, "hello.txt", b"hello");
        assert!(verify_integrity(&path, &HELLO_SHA256.to_uppercase()).is_ok());
    }

    #[test]
    fn test_verify_integrity_mismatch() {
        let dir = TempDir::new().unwrap();
        let path = write_temp_file(&dir, "hello.txt", b"hello");
        let result = verify_integrity(&path, &"0".repeat(64));
        assert!(matches!(result, Err(HubError::IntegrityMismatch { .. })));
    }

    #[test]
    fn test_sha256_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let result = sha256_file(&dir.path().join("absent"));
        assert!(matches!(result, Err(HubError::Io(_))));
    }
}

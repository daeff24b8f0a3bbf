//! # Hash Module
//!
//! Digest helpers for evidence subjects. Subjects are always identified by a
//! SHA-256 digest.
//!
//! ## Examples
//!
//! ```
//! use evidence_cli::hash::{HashAlgorithm, calculate_hash, is_valid_digest};
//!
//! let hash = calculate_hash(b"Hello, World!");
//! assert_eq!(hash.len(), 64);
//! assert!(is_valid_digest(&hash, &HashAlgorithm::Sha256));
//! ```

use crate::error::Result;
use crate::utils::safe_open_file;
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;
use subtle::ConstantTimeEq;

/// Hash algorithms usable in a subject digest set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    Sha256,
}

impl HashAlgorithm {
    /// The in-toto digest set key for this algorithm.
    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
        }
    }

    /// Length of the hex-encoded digest.
    pub fn hex_len(&self) -> usize {
        match self {
            HashAlgorithm::Sha256 => 64,
        }
    }
}

/// Calculate the SHA-256 hash of `data` as lowercase hex.
pub fn calculate_hash(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Calculate the SHA-256 hash of a file, streaming its content.
///
/// # Examples
///
/// ```no_run
/// use evidence_cli::hash::calculate_file_hash;
///
/// let hash = calculate_file_hash("artifact.tgz").unwrap();
/// assert_eq!(hash.len(), 64);
/// ```
pub fn calculate_file_hash(path: impl AsRef<Path>) -> Result<String> {
    let file = safe_open_file(path.as_ref(), false)?;
    hash_reader::<Sha256, _>(file)
}

/// Whether `value` is a well-formed hex digest for `algorithm`.
pub fn is_valid_digest(value: &str, algorithm: &HashAlgorithm) -> bool {
    value.len() == algorithm.hex_len() && value.chars().all(|c| c.is_ascii_hexdigit())
}

/// Compare two hex digests in constant time, ignoring letter case.
pub fn digests_equal(a: &str, b: &str) -> bool {
    let a = a.to_ascii_lowercase();
    let b = b.to_ascii_lowercase();

    if a.len() != b.len() {
        return false;
    }

    a.as_bytes().ct_eq(b.as_bytes()).into()
}

fn hash_reader<D: Digest, R: Read>(mut reader: R) -> Result<String> {
    let mut hasher = D::new();
    let mut buffer = [0u8; 8192];

    loop {
        let read = reader.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_hash_known_values() {
        assert_eq!(
            calculate_hash(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            calculate_hash(b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_calculate_file_hash_matches_memory_hash() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("artifact.bin");
        let content = vec![0x42u8; 20_000];
        fs::write(&path, &content)?;

        assert_eq!(calculate_file_hash(&path)?, calculate_hash(&content));
        Ok(())
    }

    #[test]
    fn test_file_not_found_error() {
        let result = calculate_file_hash("/nonexistent/artifact.bin");
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[test]
    fn test_digests_equal() {
        let hash = calculate_hash(b"data");
        assert!(digests_equal(&hash, &hash.to_uppercase()));
        assert!(!digests_equal(&hash, &calculate_hash(b"other")));
        assert!(!digests_equal(&hash, &hash[..10]));
    }

    #[test]
    fn test_is_valid_digest_rejects_garbage() {
        assert!(!is_valid_digest("deadbeef", &HashAlgorithm::Sha256));
        assert!(!is_valid_digest(&"z".repeat(64), &HashAlgorithm::Sha256));
    }
}

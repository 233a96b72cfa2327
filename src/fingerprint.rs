//! Content fingerprinting
//!
//! A fingerprint is the SHA-256 digest of a file's complete byte content,
//! stored as a lowercase hex string. Files are read in bounded-size chunks
//! so memory use is independent of file size, and an I/O failure partway
//! through never yields a partial digest.
//!
//! SHA-256 is deliberately cryptographic strength: the digest space is
//! large enough that accidental collisions are not a practical correctness
//! concern, so fingerprint equality is treated as content equality.

use crate::error::{RelinkError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Read buffer size for streaming hashes
const CHUNK_SIZE: usize = 8192;

/// Hex length of a SHA-256 digest
const HEX_LEN: usize = 64;

/// A content fingerprint: the lowercase hex encoding of a SHA-256 digest.
///
/// Two files with identical content always carry identical fingerprints;
/// zero-byte files all carry the digest of the empty input and form one
/// group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Wrap a raw digest
    fn from_digest(digest: &[u8]) -> Self {
        Fingerprint(hex::encode(digest))
    }

    /// Parse a fingerprint from its hex form, validating shape.
    ///
    /// Used when loading index rows; anything that is not exactly 64
    /// lowercase hex characters is rejected so a damaged index surfaces as
    /// corruption instead of as a never-matching cache entry.
    pub fn parse(s: &str) -> Option<Self> {
        if s.len() == HEX_LEN && s.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
        {
            Some(Fingerprint(s.to_string()))
        } else {
            None
        }
    }

    /// The hex form
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fingerprint a file's content efficiently using SHA-256
///
/// Streams the file in 8 KiB chunks. Fails with
/// [`RelinkError::ReadError`] if the file cannot be opened or an I/O error
/// occurs during reading; a partial digest is never returned.
///
/// # Example
///
/// ```rust,no_run
/// use relink::fingerprint::fingerprint_file;
/// use std::path::Path;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let fp = fingerprint_file(Path::new("example.txt"))?;
/// assert_eq!(fp.as_str().len(), 64);
/// # Ok(())
/// # }
/// ```
pub fn fingerprint_file(path: &Path) -> Result<Fingerprint> {
    let read_err = |source: std::io::Error| RelinkError::ReadError {
        path: path.to_path_buf(),
        source,
    };

    let mut file = File::open(path).map_err(read_err)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];

    loop {
        let bytes_read = file.read(&mut buffer).map_err(read_err)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(Fingerprint::from_digest(&hasher.finalize()))
}

/// Fingerprint arbitrary in-memory data using SHA-256
///
/// Convenience for tests and benchmarks that need the expected fingerprint
/// of known content without going through a file.
pub fn fingerprint_data(data: &[u8]) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(data);
    Fingerprint::from_digest(&hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_fingerprint_matches_data() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f.txt");
        fs::write(&path, b"hello").unwrap();

        assert_eq!(fingerprint_file(&path).unwrap(), fingerprint_data(b"hello"));
    }

    #[test]
    fn test_identical_content_identical_fingerprint() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        fs::write(&a, b"same bytes").unwrap();
        fs::write(&b, b"same bytes").unwrap();

        assert_eq!(fingerprint_file(&a).unwrap(), fingerprint_file(&b).unwrap());
    }

    #[test]
    fn test_different_content_different_fingerprint() {
        assert_ne!(fingerprint_data(b"x"), fingerprint_data(b"y"));
    }

    #[test]
    fn test_empty_files_share_fingerprint() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        fs::write(&a, b"").unwrap();
        fs::write(&b, b"").unwrap();

        let fp = fingerprint_file(&a).unwrap();
        assert_eq!(fp, fingerprint_file(&b).unwrap());
        assert_eq!(fp, fingerprint_data(b""));
    }

    #[test]
    fn test_large_file_streams() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big");
        // Spans many read chunks, not a multiple of the buffer size
        let content = vec![0xabu8; CHUNK_SIZE * 3 + 17];
        fs::write(&path, &content).unwrap();

        assert_eq!(fingerprint_file(&path).unwrap(), fingerprint_data(&content));
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let dir = TempDir::new().unwrap();
        let err = fingerprint_file(&dir.path().join("absent")).unwrap_err();
        assert!(matches!(err, RelinkError::ReadError { .. }));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_parse_validates_shape() {
        let good = fingerprint_data(b"hello");
        assert_eq!(Fingerprint::parse(good.as_str()), Some(good));

        assert_eq!(Fingerprint::parse(""), None);
        assert_eq!(Fingerprint::parse("zz"), None);
        // Right length, uppercase hex
        let upper = "A".repeat(64);
        assert_eq!(Fingerprint::parse(&upper), None);
        // Right length, non-hex byte
        let bad = format!("{}g", "0".repeat(63));
        assert_eq!(Fingerprint::parse(&bad), None);
    }
}

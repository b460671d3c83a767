//! SHA-256 hashing helpers: one-shot, incremental, and whole-file.

use crate::error::Result;
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

/// Hex digest of a byte slice.
#[must_use]
pub fn sha256_hex(data: impl AsRef<[u8]>) -> String {
    hex::encode(Sha256::digest(data))
}

/// Incremental SHA-256 hasher.
#[derive(Default)]
pub struct Sha256Hasher {
    inner: Sha256,
}

impl Sha256Hasher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed more bytes.
    pub fn update(&mut self, data: impl AsRef<[u8]>) {
        self.inner.update(data);
    }

    /// Finish and return the hex digest.
    #[must_use]
    pub fn finish_hex(self) -> String {
        hex::encode(self.inner.finalize())
    }
}

/// Hash a file's contents, streaming in fixed-size chunks.
///
/// # Errors
///
/// Returns an `Io` error if the file cannot be opened or read.
pub fn hash_file(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    // FIPS 180-2 test vector for the empty message.
    const EMPTY_SHA256: &str =
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn empty_string_matches_fips_vector() {
        assert_eq!(sha256_hex(b""), EMPTY_SHA256);
    }

    #[test]
    fn incremental_equals_one_shot() {
        let mut h = Sha256Hasher::new();
        h.update(b"hello ");
        h.update(b"world");
        assert_eq!(h.finish_hex(), sha256_hex(b"hello world"));
    }

    #[test]
    fn file_hash_matches_content_hash() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), b"module top; endmodule\n").unwrap();
        assert_eq!(
            hash_file(tmp.path()).unwrap(),
            sha256_hex(b"module top; endmodule\n")
        );
    }

    #[test]
    fn missing_file_errors() {
        assert!(hash_file(Path::new("/nonexistent/loom-hash")).is_err());
    }
}

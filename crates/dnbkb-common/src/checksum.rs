//! SHA-256 helpers for asset verification
//!
//! Downloads are hashed while they stream, so the digest is built
//! incrementally from chunks instead of re-reading the stored file.

use crate::error::{KbError, Result};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

/// Incremental SHA-256 digest that also counts the bytes fed into it.
#[derive(Debug, Clone, Default)]
pub struct StreamingDigest {
    hasher: Sha256,
    bytes: u64,
}

impl StreamingDigest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
        self.bytes += chunk.len() as u64;
    }

    /// Total number of bytes hashed so far
    pub fn bytes_seen(&self) -> u64 {
        self.bytes
    }

    /// Consume the digest and return the lowercase hex encoding
    pub fn finalize_hex(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

/// Hex-encoded SHA-256 of an in-memory buffer
pub fn sha256_hex(data: &[u8]) -> String {
    let mut digest = StreamingDigest::new();
    digest.update(data);
    digest.finalize_hex()
}

/// Hex-encoded SHA-256 of any readable source
pub fn compute_sha256<R: Read>(reader: &mut R) -> Result<String> {
    let mut digest = StreamingDigest::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        digest.update(&buffer[..bytes_read]);
    }

    Ok(digest.finalize_hex())
}

/// Verify that a file on disk has the expected SHA-256
pub fn verify_file_sha256(path: impl AsRef<Path>, expected: &str) -> Result<()> {
    let mut file = std::fs::File::open(path)?;
    let actual = compute_sha256(&mut file)?;
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(KbError::ChecksumMismatch {
            expected: expected.to_string(),
            actual,
        })
    }
}

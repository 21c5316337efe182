//! Content fingerprints
//!
//! A fingerprint is the BLAKE3 digest of a file's bytes and nothing else:
//! names, paths and timestamps never enter the hash, so a renamed copy of a
//! document maps to the same key.

use crate::error::Result;
use blake3::Hasher;
use std::path::Path;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Read buffer size used while streaming
pub const HASH_CHUNK_SIZE: usize = 64 * 1024;

/// Length of a hex-encoded fingerprint
pub const HASH_HEX_LEN: usize = 64;

/// Compute the fingerprint of an in-memory buffer
pub fn hash_bytes(content: &[u8]) -> String {
    let mut hasher = Hasher::new();
    hasher.update(content);
    hasher.finalize().to_hex().to_string()
}

/// Compute the fingerprint of a reader, holding at most one chunk in memory
pub async fn hash_reader<R>(mut reader: R) -> Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut hasher = Hasher::new();
    let mut buf = vec![0u8; HASH_CHUNK_SIZE];

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hasher.finalize().to_hex().to_string())
}

/// Compute the fingerprint of a file on disk
pub async fn hash_file(path: &Path) -> Result<String> {
    let file = tokio::fs::File::open(path).await?;
    hash_reader(file).await
}

//! Streamed SHA-256 hashing and digest comparison

use crate::error::VerifyError;
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::io::AsyncReadExt;

const CHUNK_SIZE: usize = 8192;

/// Compute the hex SHA-256 of a file, reading it in fixed-size chunks.
pub async fn compute_file_sha256(path: &Path) -> Result<String, VerifyError> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| VerifyError::io(path, e))?;

    let mut hasher = Sha256::new();
    let mut buffer = [0u8; CHUNK_SIZE];

    loop {
        let bytes_read = file
            .read(&mut buffer)
            .await
            .map_err(|e| VerifyError::io(path, e))?;

        if bytes_read == 0 {
            break;
        }

        if let Some(chunk) = buffer.get(..bytes_read) {
            hasher.update(chunk);
        }
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Read the expected digest from a checksum file.
///
/// Surrounding whitespace is dropped. For `sha256sum` output
/// (`<digest>  <name>`) only the digest token is kept.
pub async fn read_expected_digest(path: &Path) -> Result<String, VerifyError> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| VerifyError::io(path, e))?;
    Ok(parse_expected_digest(&contents))
}

fn parse_expected_digest(contents: &str) -> String {
    contents
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Compare the image digest against the checksum file, case-sensitively.
pub async fn checksum_matches(image: &Path, checksum_file: &Path) -> Result<bool, VerifyError> {
    let expected = read_expected_digest(checksum_file).await?;
    let actual = compute_file_sha256(image).await?;
    tracing::debug!(%expected, %actual, "Comparing firmware digest");
    Ok(!expected.is_empty() && expected == actual)
}

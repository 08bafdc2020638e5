//! Detached-signature verification backends
//!
//! Two backends are provided. [`OpensslVerifier`] shells out to
//! `openssl dgst -sha256 -verify`, which covers RSA and EC keys in PEM form.
//! [`Ed25519Verifier`] checks Ed25519 signatures in-process.

use crate::error::VerifyError;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Checks a detached signature over a file
#[async_trait]
pub trait SignatureVerifier: Send + Sync {
    /// Returns `Ok(true)` if `signature` is a valid signature of `signed`
    /// under `public_key`, `Ok(false)` if it is not.
    async fn verify(
        &self,
        public_key: &Path,
        signature: &Path,
        signed: &Path,
    ) -> Result<bool, VerifyError>;

    /// Short backend name for logs
    fn name(&self) -> &'static str;
}

/// Verifies with the `openssl` command-line tool.
#[derive(Debug, Clone)]
pub struct OpensslVerifier {
    program: String,
    leading_args: Vec<String>,
}

impl OpensslVerifier {
    /// `tool` may carry leading arguments, e.g. `"sudo -n openssl"`.
    pub fn new(tool: &str) -> Self {
        let mut tokens = tool.split_whitespace().map(str::to_string);
        let program = tokens.next().unwrap_or_else(|| "openssl".to_string());
        Self {
            program,
            leading_args: tokens.collect(),
        }
    }
}

impl Default for OpensslVerifier {
    fn default() -> Self {
        Self::new("openssl")
    }
}

#[async_trait]
impl SignatureVerifier for OpensslVerifier {
    async fn verify(
        &self,
        public_key: &Path,
        signature: &Path,
        signed: &Path,
    ) -> Result<bool, VerifyError> {
        let output = Command::new(&self.program)
            .args(&self.leading_args)
            .arg("dgst")
            .arg("-sha256")
            .arg("-verify")
            .arg(public_key)
            .arg("-signature")
            .arg(signature)
            .arg(signed)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| VerifyError::Tool(format!("failed to run {}: {e}", self.program)))?;

        debug!(
            status = ?output.status,
            stdout = %String::from_utf8_lossy(&output.stdout).trim(),
            stderr = %String::from_utf8_lossy(&output.stderr).trim(),
            "openssl verification finished"
        );

        Ok(output.status.success())
    }

    fn name(&self) -> &'static str {
        "openssl"
    }
}

/// Verifies Ed25519 signatures in-process.
///
/// The key file holds 32 bytes and the signature file 64 bytes, each either
/// raw, hex-encoded or base64-encoded.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519Verifier;

#[async_trait]
impl SignatureVerifier for Ed25519Verifier {
    async fn verify(
        &self,
        public_key: &Path,
        signature: &Path,
        signed: &Path,
    ) -> Result<bool, VerifyError> {
        let key_bytes: [u8; 32] = read_encoded(public_key).await?;
        let signature_bytes: [u8; 64] = read_encoded(signature).await?;
        let content = tokio::fs::read(signed)
            .await
            .map_err(|e| VerifyError::io(signed, e))?;

        let key = VerifyingKey::from_bytes(&key_bytes)
            .map_err(|e| VerifyError::KeyFormat(format!("invalid public key: {e}")))?;
        let signature = Signature::from_bytes(&signature_bytes);

        Ok(key.verify(&content, &signature).is_ok())
    }

    fn name(&self) -> &'static str {
        "ed25519"
    }
}

async fn read_encoded<const N: usize>(path: &Path) -> Result<[u8; N], VerifyError> {
    let raw = tokio::fs::read(path)
        .await
        .map_err(|e| VerifyError::io(path, e))?;
    decode_fixed(&raw).ok_or_else(|| {
        VerifyError::KeyFormat(format!(
            "{} is not {N} bytes of raw, hex or base64 data",
            path.display()
        ))
    })
}

fn decode_fixed<const N: usize>(raw: &[u8]) -> Option<[u8; N]> {
    if let Ok(bytes) = <[u8; N]>::try_from(raw) {
        return Some(bytes);
    }

    let text = std::str::from_utf8(raw).ok()?.trim();
    hex::decode(text)
        .ok()
        .or_else(|| BASE64.decode(text).ok())
        .and_then(|bytes| <[u8; N]>::try_from(bytes.as_slice()).ok())
}

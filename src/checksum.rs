//! SHA-256 verification of downloaded artifacts.

use anyhow::{Context, Result};
use log::{debug, info};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

use crate::error::InstallError;
use crate::runtime::Runtime;

/// Compute the lowercase hex SHA-256 of a file.
#[tracing::instrument(skip(runtime))]
pub fn sha256_file<R: Runtime>(runtime: &R, path: &Path) -> Result<String> {
    let mut reader = runtime
        .open(path)
        .with_context(|| format!("Failed to open {:?} for hashing", path))?;

    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let n = reader
            .read(&mut buffer)
            .with_context(|| format!("Failed to read {:?} for hashing", path))?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Check `path` against `expected`. `url` only appears in the error.
#[tracing::instrument(skip(runtime))]
pub fn verify<R: Runtime>(runtime: &R, path: &Path, expected: &str, url: &str) -> Result<()> {
    let actual = sha256_file(runtime, path)?;
    debug!("sha256 of {:?} is {}", path, actual);

    if !actual.eq_ignore_ascii_case(expected) {
        return Err(InstallError::ChecksumMismatch {
            url: url.to_string(),
            expected: expected.to_lowercase(),
            actual,
        }
        .into());
    }

    info!("Checksum verified for {}", url);
    Ok(())
}

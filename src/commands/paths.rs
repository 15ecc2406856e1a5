use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::runtime::Runtime;

/// Get the default state directory (receipts live here)
#[tracing::instrument(skip(runtime))]
pub fn default_root<R: Runtime>(runtime: &R) -> Result<PathBuf> {
    if runtime.is_privileged() {
        Ok(system_root())
    } else {
        let home_dir = runtime
            .home_dir()
            .context("Could not find home directory")?;
        Ok(home_dir.join(".dify-installer"))
    }
}

/// Get the default directory the executable is placed in
#[tracing::instrument(skip(runtime))]
pub fn default_bin_dir<R: Runtime>(runtime: &R) -> Result<PathBuf> {
    if runtime.is_privileged() {
        Ok(system_bin_dir())
    } else {
        let home_dir = runtime
            .home_dir()
            .context("Could not find home directory")?;
        Ok(home_dir.join(".local").join("bin"))
    }
}

#[cfg(target_os = "macos")]
fn system_root() -> PathBuf {
    PathBuf::from("/opt/dify-installer")
}

#[cfg(target_os = "windows")]
fn system_root() -> PathBuf {
    PathBuf::from(r"C:\ProgramData\dify-installer")
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn system_root() -> PathBuf {
    PathBuf::from("/usr/local/dify-installer")
}

#[cfg(target_os = "windows")]
fn system_bin_dir() -> PathBuf {
    PathBuf::from(r"C:\ProgramData\dify-installer\bin")
}

#[cfg(not(target_os = "windows"))]
fn system_bin_dir() -> PathBuf {
    PathBuf::from("/usr/local/bin")
}

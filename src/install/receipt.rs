//! Install receipts: what was installed, from where, and when.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::formula::ResolvedVariant;
use crate::platform::{Arch, Os};
use crate::runtime::Runtime;

/// Outcome of the post-install check, as far as the receipt knows.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum CheckStatus {
    /// The check was started and has not passed; the install is not complete.
    Pending,
    Passed,
    /// Not run: `--skip-test`, or a binary for another platform.
    #[default]
    Skipped,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Receipt {
    pub formula: String,
    pub version: String,
    pub os: Os,
    pub arch: Arch,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    pub installed_path: PathBuf,
    /// Seconds since the Unix epoch
    pub installed_at: u64,
    #[serde(default)]
    pub check: CheckStatus,
}

impl Receipt {
    pub fn new(formula: &str, version: &str, variant: &ResolvedVariant, installed_path: &Path) -> Self {
        Self {
            formula: formula.to_string(),
            version: version.to_string(),
            os: variant.platform.os,
            arch: variant.platform.arch,
            url: variant.url.clone(),
            sha256: variant.sha256.clone(),
            installed_path: installed_path.to_path_buf(),
            installed_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default(),
            check: CheckStatus::Skipped,
        }
    }

    /// Whether this receipt describes a finished install.
    pub fn is_complete(&self) -> bool {
        self.check != CheckStatus::Pending
    }

    /// `<root>/receipts/<formula>.json`
    pub fn path_for(root: &Path, formula: &str) -> PathBuf {
        root.join("receipts").join(format!("{}.json", formula))
    }

    /// Reads a receipt; `Ok(None)` when there is none.
    #[tracing::instrument(skip(runtime))]
    pub fn load<R: Runtime>(runtime: &R, path: &Path) -> Result<Option<Self>> {
        if !runtime.exists(path) {
            return Ok(None);
        }
        let content = runtime.read_to_string(path)?;
        let receipt = serde_json::from_str(&content)
            .with_context(|| format!("Corrupt install receipt {:?}", path))?;
        Ok(Some(receipt))
    }

    #[tracing::instrument(skip(self, runtime))]
    pub fn save<R: Runtime>(&self, runtime: &R, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            runtime.create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        let tmp_path = path.with_extension("json.tmp");

        runtime.write(&tmp_path, json.as_bytes())?;
        runtime.rename(&tmp_path, path)?;
        Ok(())
    }
}

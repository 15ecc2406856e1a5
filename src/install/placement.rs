//! Putting the executable into the bin directory.

use anyhow::{Context, Result};
use log::debug;
use std::path::{Path, PathBuf};

use crate::cleanup::{SharedCleanupContext, lock};
use crate::runtime::Runtime;

/// Mode given to installed executables.
pub const EXECUTABLE_MODE: u32 = 0o755;

/// Copies `source` to `<bin_dir>/<name>`, replacing any previous install.
///
/// The copy goes to a hidden temporary name first and is renamed into place,
/// so an interrupted install never leaves a truncated executable behind.
#[tracing::instrument(skip(runtime, cleanup_ctx))]
pub fn place<R: Runtime>(
    runtime: &R,
    source: &Path,
    bin_dir: &Path,
    name: &str,
    cleanup_ctx: &SharedCleanupContext,
) -> Result<PathBuf> {
    runtime
        .create_dir_all(bin_dir)
        .with_context(|| format!("Failed to create bin directory {:?}", bin_dir))?;

    let dest = bin_dir.join(name);
    let tmp = bin_dir.join(format!(".{}.tmp", name));
    lock(cleanup_ctx).add(tmp.clone());

    debug!("Copying {:?} to {:?}", source, tmp);
    runtime.copy(source, &tmp)?;
    runtime.set_permissions(&tmp, EXECUTABLE_MODE)?;
    runtime
        .rename(&tmp, &dest)
        .with_context(|| format!("Failed to move executable into place at {:?}", dest))?;

    lock(cleanup_ctx).remove(&tmp);
    Ok(dest)
}

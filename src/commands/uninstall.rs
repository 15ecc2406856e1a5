use anyhow::Result;
use std::path::Path;

use crate::{archive::ArchiveExtractor, runtime::Runtime};

use super::{Config, load_formula};

/// Remove the installed executable and its receipt
#[tracing::instrument(skip(config))]
pub fn uninstall<R: Runtime + 'static, E: ArchiveExtractor>(
    config: Config<R, E>,
    formula: Option<&Path>,
) -> Result<()> {
    let formula = load_formula(&config.runtime, formula)?;
    let options = config.options(false, true);
    config.into_installer().uninstall(&formula, &options)?;
    Ok(())
}

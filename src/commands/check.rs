use anyhow::Result;
use std::path::Path;

use crate::{archive::ArchiveExtractor, platform::Target, runtime::Runtime};

use super::{Config, load_formula};

/// Run the post-install check against the installed executable
#[tracing::instrument(skip(config))]
pub fn test<R: Runtime + 'static, E: ArchiveExtractor>(
    config: Config<R, E>,
    formula: Option<&Path>,
    target: &Target,
) -> Result<()> {
    let formula = load_formula(&config.runtime, formula)?;
    let options = config.options(false, false);
    let installer = config.into_installer();

    let path = installer.test(&formula, target, &options)?;
    println!("      passed {} {}", formula.name, path.display());
    Ok(())
}

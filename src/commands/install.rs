use anyhow::Result;
use std::path::Path;

use crate::{archive::ArchiveExtractor, platform::Target, runtime::Runtime};

use super::{Config, load_formula};

/// Install the formula's executable for `target`
#[tracing::instrument(skip(config))]
pub async fn install<R: Runtime + 'static, E: ArchiveExtractor>(
    config: Config<R, E>,
    formula: Option<&Path>,
    target: &Target,
    force: bool,
    skip_test: bool,
) -> Result<()> {
    let formula = load_formula(&config.runtime, formula)?;
    let options = config.options(force, skip_test);
    let installer = config.into_installer();
    installer.install(&formula, target, &options).await?;
    Ok(())
}

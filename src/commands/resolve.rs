use anyhow::Result;
use std::path::Path;

use crate::{formula::ResolvedVariant, platform::Target, runtime::Runtime};

use super::load_formula;

/// Print the variant selected for `target`, or every variant with `all`
#[tracing::instrument(skip(runtime))]
pub fn resolve<R: Runtime>(
    runtime: &R,
    formula: Option<&Path>,
    target: &Target,
    all: bool,
) -> Result<()> {
    let formula = load_formula(runtime, formula)?;

    let variants = if all {
        formula.resolve_all()?
    } else {
        vec![formula.resolve(target)?]
    };

    for variant in &variants {
        println!("{}", describe(variant));
    }
    Ok(())
}

/// `<platform>\t<url>\t<sha256 or ->`
pub(crate) fn describe(variant: &ResolvedVariant) -> String {
    format!(
        "{}\t{}\t{}",
        variant.platform,
        variant.url,
        variant.sha256.as_deref().unwrap_or("-")
    )
}

use anyhow::Result;
use log::debug;
use std::path::Path;

use crate::{
    archive::ArchiveExtractor,
    formula::Formula,
    install::receipt::Receipt,
    runtime::Runtime,
};

use super::{Config, load_formula};

/// Show the formula and whether it is installed
#[tracing::instrument(skip(config))]
pub fn show<R: Runtime, E: ArchiveExtractor>(
    config: &Config<R, E>,
    formula: Option<&Path>,
) -> Result<()> {
    let formula = load_formula(&config.runtime, formula)?;
    let receipt_path = Receipt::path_for(&config.root, &formula.name);
    debug!("Looking for receipt at {:?}", receipt_path);

    let receipt = Receipt::load(&config.runtime, &receipt_path)?;
    let installed = receipt
        .as_ref()
        .is_some_and(|r| config.runtime.exists(&r.installed_path));

    print!("{}", render(&formula, receipt.as_ref(), installed));
    Ok(())
}

fn render(formula: &Formula, receipt: Option<&Receipt>, present: bool) -> String {
    let mut out = format!("{} {}\n", formula.name, formula.version);
    if !formula.desc.is_empty() {
        out.push_str(&format!("{}\n", formula.desc));
    }
    if !formula.homepage.is_empty() {
        out.push_str(&format!("Homepage: {}\n", formula.homepage));
    }
    if let Some(license) = &formula.license {
        out.push_str(&format!("License: {}\n", license));
    }

    let platforms: Vec<String> = formula
        .supported_platforms()
        .iter()
        .map(|p| p.to_string())
        .collect();
    out.push_str(&format!("Platforms: {}\n", platforms.join(", ")));

    let status = match receipt {
        None => "not installed".to_string(),
        Some(r) if !present => format!("missing (receipt points at {})", r.installed_path.display()),
        Some(r) if !r.is_complete() => format!(
            "{} at {} failed its post-install check",
            r.version,
            r.installed_path.display()
        ),
        Some(r) if r.version != formula.version => format!(
            "{} installed at {} ({} available)",
            r.version,
            r.installed_path.display(),
            formula.version
        ),
        Some(r) => format!("installed at {}", r.installed_path.display()),
    };
    out.push_str(&format!("Status: {}\n", status));
    out
}

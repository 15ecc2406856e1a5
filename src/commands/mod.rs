use anyhow::Result;
use std::path::Path;

use crate::{formula::Formula, runtime::Runtime};

pub mod config;
mod check;
mod install;
mod paths;
mod resolve;
mod show;
mod uninstall;

pub use check::test;
pub use config::Config;
pub use install::install;
pub use resolve::resolve;
pub use show::show;
pub use uninstall::uninstall;

/// The formula at `path`, or the built-in one.
pub(crate) fn load_formula<R: Runtime>(runtime: &R, path: Option<&Path>) -> Result<Formula> {
    match path {
        Some(path) => Formula::load(runtime, path),
        None => Formula::builtin(),
    }
}

//! Post-install check: run the installed executable and look at what it says.

use anyhow::Result;
use log::{debug, info};
use std::path::Path;

use crate::error::InstallError;
use crate::formula::{Assertion, SmokeTest};
use crate::runtime::{CommandOutput, Runtime};

/// Decides whether `output` satisfies `test` for the given `version`.
pub fn evaluate(test: &SmokeTest, version: &str, output: &CommandOutput) -> Result<(), String> {
    if !output.success() {
        return Err(match output.code {
            Some(code) => format!("exited with status {}", code),
            None => "terminated by a signal".to_string(),
        });
    }

    match test.assertion {
        Assertion::ExitCode => Ok(()),
        Assertion::Version => {
            let combined = output.combined();
            if combined.contains(version) {
                Ok(())
            } else {
                Err(format!(
                    "expected output to contain {:?}, got {:?}",
                    version,
                    combined.trim()
                ))
            }
        }
    }
}

/// Runs `test` against the executable at `path`.
#[tracing::instrument(skip(runtime, test))]
pub fn run<R: Runtime>(runtime: &R, path: &Path, test: &SmokeTest, version: &str) -> Result<()> {
    let command = format!("{} {}", path.display(), test.args.join(" "));
    info!("Running post-install check: {}", command);

    let output = runtime.run_command(path, &test.args).map_err(|e| {
        InstallError::SmokeTestFailed {
            command: command.clone(),
            reason: format!("{:#}", e),
        }
    })?;
    debug!("Check output: {:?}", output);

    evaluate(test, version, &output)
        .map_err(|reason| InstallError::SmokeTestFailed { command, reason }.into())
}

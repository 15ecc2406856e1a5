//! Locating the executable inside a download and checking what it is.

use anyhow::{Context, Result};
use log::debug;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::error::InstallError;
use crate::platform::Os;
use crate::runtime::Runtime;

/// All regular files under `root`, sorted.
pub fn collect_files<R: Runtime>(runtime: &R, root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        for entry in runtime
            .read_dir(&dir)
            .with_context(|| format!("Failed to list {:?}", dir))?
        {
            if runtime.is_dir(&entry) {
                pending.push(entry);
            } else {
                files.push(entry);
            }
        }
    }

    files.sort();
    Ok(files)
}

/// Picks the one file in `files` matching `pattern`.
///
/// The glob is tried against each file name first and then against the path
/// relative to `root`, so both `dify-plugin-*` and `bin/dify` work. Without a
/// pattern there must be exactly one file.
pub fn select_member(root: &Path, files: &[PathBuf], pattern: Option<&str>) -> Result<PathBuf> {
    let relative = |p: &Path| -> String {
        p.strip_prefix(root)
            .unwrap_or(p)
            .to_string_lossy()
            .replace('\\', "/")
    };

    let matches: Vec<&PathBuf> = match pattern {
        None => files.iter().collect(),
        Some(pattern) => {
            let glob = glob::Pattern::new(pattern)
                .with_context(|| format!("Invalid binary pattern {:?}", pattern))?;
            let by_name: Vec<&PathBuf> = files
                .iter()
                .filter(|f| {
                    f.file_name()
                        .map(|n| glob.matches(&n.to_string_lossy()))
                        .unwrap_or(false)
                })
                .collect();
            if by_name.is_empty() {
                files
                    .iter()
                    .filter(|f| glob.matches(&relative(f)))
                    .collect()
            } else {
                by_name
            }
        }
    };

    match matches.as_slice() {
        [single] => {
            debug!("Selected {:?}", single);
            Ok((*single).clone())
        }
        _ => Err(InstallError::ArtifactNotFound {
            pattern: pattern.unwrap_or("*").to_string(),
            candidates: if matches.is_empty() {
                Vec::new()
            } else {
                matches.iter().map(|f| relative(f)).collect()
            },
        }
        .into()),
    }
}

/// Executable container format, as far as goblin can tell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryFormat {
    Elf,
    MachO,
    Pe,
    /// Scripts, data, or anything goblin does not recognise
    Other,
}

impl BinaryFormat {
    /// The native format for executables on `os`.
    pub fn native_for(os: Os) -> Self {
        match os {
            Os::Darwin => BinaryFormat::MachO,
            Os::Linux => BinaryFormat::Elf,
            Os::Windows => BinaryFormat::Pe,
        }
    }
}

impl std::fmt::Display for BinaryFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            BinaryFormat::Elf => "ELF",
            BinaryFormat::MachO => "Mach-O",
            BinaryFormat::Pe => "PE",
            BinaryFormat::Other => "non-native",
        })
    }
}

/// Sniffs the binary format of `path`.
pub fn inspect<R: Runtime>(runtime: &R, path: &Path) -> Result<BinaryFormat> {
    let mut buffer = Vec::new();
    runtime
        .open(path)?
        .read_to_end(&mut buffer)
        .with_context(|| format!("Failed to read {:?}", path))?;

    Ok(match goblin::Object::parse(&buffer) {
        Ok(goblin::Object::Elf(_)) => BinaryFormat::Elf,
        Ok(goblin::Object::Mach(_)) => BinaryFormat::MachO,
        Ok(goblin::Object::PE(_)) => BinaryFormat::Pe,
        _ => BinaryFormat::Other,
    })
}

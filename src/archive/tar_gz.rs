use crate::runtime::Runtime;
use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use log::debug;
use std::path::Path;
use tar::{Archive, EntryType};

use super::{ArchiveExtractor, sanitize_entry_path};

/// Extractor for .tar.gz / .tgz archives
pub struct TarGzExtractor;

impl ArchiveExtractor for TarGzExtractor {
    fn can_handle(&self, archive_path: &Path) -> bool {
        let name = archive_path.to_string_lossy().to_lowercase();
        name.ends_with(".tar.gz") || name.ends_with(".tgz")
    }

    fn extract<R: Runtime + 'static>(
        &self,
        runtime: &R,
        archive_path: &Path,
        extract_to: &Path,
    ) -> Result<()> {
        debug!("Extracting tar.gz archive to {:?}...", extract_to);
        let file = runtime
            .open(archive_path)
            .with_context(|| format!("Failed to open archive at {:?}", archive_path))?;

        let mut archive = Archive::new(GzDecoder::new(file));
        let entries = archive
            .entries()
            .with_context(|| format!("Failed to read tar.gz archive {:?}", archive_path))?;

        let mut extracted = 0usize;
        for entry in entries {
            let mut entry = entry.context("Failed to read tar entry")?;
            let raw_path = entry.path().context("Invalid path in tar entry")?.into_owned();

            let Some(relative) = sanitize_entry_path(&raw_path) else {
                debug!("Skipping entry with unsafe path {:?}", raw_path);
                continue;
            };
            let full_path = extract_to.join(&relative);

            match entry.header().entry_type() {
                EntryType::Directory => runtime.create_dir_all(&full_path)?,
                EntryType::Regular | EntryType::Continuous => {
                    if let Some(parent) = full_path.parent() {
                        runtime.create_dir_all(parent)?;
                    }
                    let mut dest_file = runtime.create_file(&full_path)?;
                    std::io::copy(&mut entry, &mut dest_file)
                        .with_context(|| format!("Failed to extract file {:?}", full_path))?;
                    drop(dest_file);

                    #[cfg(unix)]
                    if let Ok(mode) = entry.header().mode()
                        && let Err(e) = runtime.set_permissions(&full_path, mode & 0o7777)
                    {
                        debug!("Failed to set permissions on {:?}: {}", full_path, e);
                    }
                    extracted += 1;
                }
                other => debug!("Skipping {:?} entry {:?}", other, raw_path),
            }
        }

        debug!("Extracted {} files from {:?}", extracted, archive_path);
        Ok(())
    }
}

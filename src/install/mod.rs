//! The install pipeline: resolve, download, verify, extract, place, test.

pub mod artifact;
pub mod placement;
pub mod receipt;
pub mod smoke;

use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};

use crate::archive::ArchiveExtractor;
use crate::checksum;
use crate::cleanup::{self, SharedCleanupContext, lock};
use crate::download::fetch;
use crate::error::InstallError;
use crate::formula::{Formula, ResolvedVariant};
use crate::http::HttpClient;
use crate::platform::{Platform, Target};
use crate::runtime::Runtime;

use artifact::BinaryFormat;
use receipt::{CheckStatus, Receipt};

/// Where things go and which steps to run.
#[derive(Debug, Clone)]
pub struct InstallOptions {
    /// Directory the executable is placed in
    pub bin_dir: PathBuf,
    /// State directory holding receipts
    pub root: PathBuf,
    /// Reinstall even when the same version is present
    pub force: bool,
    pub skip_test: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InstallOutcome {
    Installed { path: PathBuf, version: String },
    AlreadyInstalled { path: PathBuf, version: String },
}

pub struct Installer<R: Runtime, E: ArchiveExtractor> {
    pub runtime: R,
    pub http_client: HttpClient,
    pub extractor: E,
    /// Platform this process runs on; binaries for any other are not executed.
    pub host: Option<Platform>,
}

impl<R: Runtime + 'static, E: ArchiveExtractor> Installer<R, E> {
    #[tracing::instrument(skip(runtime, http_client, extractor))]
    pub fn new(runtime: R, http_client: HttpClient, extractor: E) -> Self {
        Self {
            runtime,
            http_client,
            extractor,
            host: Target::detect().platform(),
        }
    }

    #[tracing::instrument(skip(self, formula), fields(formula = %formula.name))]
    pub async fn install(
        &self,
        formula: &Formula,
        target: &Target,
        options: &InstallOptions,
    ) -> Result<InstallOutcome> {
        println!("   resolving {} {} for {}", formula.name, formula.version, target);
        // Unsupported platforms fail here, before anything is touched
        let variant = formula.resolve(target)?;
        info!("Selected variant {} -> {}", variant.platform, variant.url);

        let receipt_path = Receipt::path_for(&options.root, &formula.name);
        let dest = options.bin_dir.join(&variant.installed_name);

        if !options.force
            && let Some(existing) = Receipt::load(&self.runtime, &receipt_path)?
            && existing.version == formula.version
            && existing.installed_path == dest
            && existing.is_complete()
            && self.runtime.exists(&dest)
        {
            println!(
                "   {} {} is already installed at {}",
                formula.name,
                formula.version,
                dest.display()
            );
            return Ok(InstallOutcome::AlreadyInstalled {
                path: dest,
                version: formula.version.clone(),
            });
        }

        let cleanup_ctx = cleanup::new_shared();
        let ctrl_c_handler = cleanup::spawn_ctrl_c_handler(cleanup_ctx.clone());

        let result = self
            .stage_and_place(formula, &variant, &options.bin_dir, &cleanup_ctx)
            .await;

        ctrl_c_handler.abort();
        // Staging and half-written files go whether or not placement worked
        lock(&cleanup_ctx).cleanup();

        let path = result?;

        let mut receipt = Receipt::new(&formula.name, &formula.version, &variant, &path);

        if options.skip_test {
            info!("Skipping post-install check");
        } else if self.host != Some(variant.platform) {
            warn!(
                "Skipping post-install check: {} binary cannot run on this host",
                variant.platform
            );
        } else {
            // A failed check leaves the binary in place but the receipt pending,
            // so the next install does not treat it as done
            receipt.check = CheckStatus::Pending;
            self.save_receipt(&receipt, &receipt_path)?;

            println!("     testing {}", path.display());
            smoke::run(&self.runtime, &path, &formula.test, &formula.version)?;
            receipt.check = CheckStatus::Passed;
        }
        self.save_receipt(&receipt, &receipt_path)?;

        println!(
            "   installed {} {} -> {}",
            formula.name,
            formula.version,
            path.display()
        );
        Ok(InstallOutcome::Installed {
            path,
            version: formula.version.clone(),
        })
    }

    fn save_receipt(&self, receipt: &Receipt, path: &Path) -> Result<()> {
        receipt
            .save(&self.runtime, path)
            .with_context(|| format!("Failed to write install receipt {:?}", path))
    }

    /// Download, verify, and extract in a staging directory, then place the
    /// executable. Returns the installed path.
    async fn stage_and_place(
        &self,
        formula: &Formula,
        variant: &ResolvedVariant,
        bin_dir: &Path,
        cleanup_ctx: &SharedCleanupContext,
    ) -> Result<PathBuf> {
        let staging = self.runtime.temp_dir().join(format!(
            "dify-installer-{}-{}-{}",
            formula.name,
            formula.version,
            std::process::id()
        ));
        if self.runtime.exists(&staging) {
            self.runtime.remove_dir_all(&staging)?;
        }
        self.runtime.create_dir_all(&staging)?;
        lock(cleanup_ctx).add(staging.clone());
        debug!("Staging in {:?}", staging);

        let asset_name = match variant.asset_name() {
            "" => "download",
            name => name,
        };
        let asset_path = staging.join(asset_name);

        println!(" downloading {}", variant.url);
        fetch(&self.runtime, &variant.url, &asset_path, &self.http_client)
            .await
            .with_context(|| format!("Failed to fetch {}", variant.url))?;

        if let Some(expected) = &variant.sha256 {
            println!("   verifying sha256");
            checksum::verify(&self.runtime, &asset_path, expected, &variant.url)?;
        } else {
            debug!("No checksum pinned for {}", variant.platform);
        }

        let member = if self.extractor.can_handle(&asset_path) {
            let extract_dir = staging.join("extracted");
            self.runtime.create_dir_all(&extract_dir)?;
            println!("  extracting {}", asset_name);
            self.extractor
                .extract(&self.runtime, &asset_path, &extract_dir)?;
            let files = artifact::collect_files(&self.runtime, &extract_dir)?;
            artifact::select_member(&extract_dir, &files, variant.binary.as_deref())?
        } else {
            artifact::select_member(
                &staging,
                std::slice::from_ref(&asset_path),
                variant.binary.as_deref(),
            )?
        };

        let expected = BinaryFormat::native_for(variant.platform.os);
        match artifact::inspect(&self.runtime, &member)? {
            format if format == expected => debug!("{:?} is a {} executable", member, format),
            format => warn!(
                "{:?} looks like a {} file, expected {} for {}",
                member, format, expected, variant.platform
            ),
        }

        println!("  installing {} as {}", asset_name, variant.installed_name);
        placement::place(
            &self.runtime,
            &member,
            bin_dir,
            &variant.installed_name,
            cleanup_ctx,
        )
    }

    /// Runs the smoke test against an existing install.
    #[tracing::instrument(skip(self, formula), fields(formula = %formula.name))]
    pub fn test(&self, formula: &Formula, target: &Target, options: &InstallOptions) -> Result<PathBuf> {
        let path = self.installed_path(formula, target, options)?;
        smoke::run(&self.runtime, &path, &formula.test, &formula.version)?;

        let receipt_path = Receipt::path_for(&options.root, &formula.name);
        if let Some(mut receipt) = Receipt::load(&self.runtime, &receipt_path)?
            && receipt.installed_path == path
            && receipt.version == formula.version
            && receipt.check != CheckStatus::Passed
        {
            receipt.check = CheckStatus::Passed;
            self.save_receipt(&receipt, &receipt_path)?;
        }
        Ok(path)
    }

    /// Removes the executable and its receipt.
    #[tracing::instrument(skip(self, formula), fields(formula = %formula.name))]
    pub fn uninstall(&self, formula: &Formula, options: &InstallOptions) -> Result<PathBuf> {
        let receipt_path = Receipt::path_for(&options.root, &formula.name);
        let receipt = Receipt::load(&self.runtime, &receipt_path)?
            .ok_or_else(|| InstallError::NotInstalled(formula.name.clone()))?;

        if self.runtime.exists(&receipt.installed_path) {
            self.runtime.remove_file(&receipt.installed_path)?;
        } else {
            warn!(
                "{:?} was already removed, dropping the receipt",
                receipt.installed_path
            );
        }
        self.runtime.remove_file(&receipt_path)?;

        println!(
            " uninstalled {} {} from {}",
            receipt.formula,
            receipt.version,
            receipt.installed_path.display()
        );
        Ok(receipt.installed_path)
    }

    /// Where the executable lives: the receipt's path, or the bin dir guess.
    pub fn installed_path(
        &self,
        formula: &Formula,
        target: &Target,
        options: &InstallOptions,
    ) -> Result<PathBuf> {
        let receipt_path = Receipt::path_for(&options.root, &formula.name);
        let path = match Receipt::load(&self.runtime, &receipt_path)? {
            Some(receipt) => receipt.installed_path,
            None => {
                let os = target
                    .platform()
                    .map(|p| p.os)
                    .ok_or_else(|| InstallError::NotInstalled(formula.name.clone()))?;
                options.bin_dir.join(formula.installed_name(os))
            }
        };

        if !self.runtime.exists(&path) {
            return Err(InstallError::NotInstalled(formula.name.clone()).into());
        }
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{ArchiveExtractorImpl, test_archives};
    use crate::http::RetryPolicy;
    use crate::platform::{Arch, Os, Platform};
    use crate::runtime::RealRuntime;
    use reqwest::Client;
    use std::fs;
    use tempfile::{TempDir, tempdir};

    // sha256("hello world")
    const HELLO_SHA: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    fn installer() -> Installer<RealRuntime, ArchiveExtractorImpl> {
        let mut installer = Installer::new(
            RealRuntime,
            HttpClient::new(Client::new()).with_policy(RetryPolicy::immediate()),
            ArchiveExtractorImpl::new(),
        );
        // Fixtures are shell scripts declared as linux-amd64 builds
        installer.host = Some(Platform::new(Os::Linux, Arch::Amd64));
        installer
    }

    fn options(dir: &TempDir) -> InstallOptions {
        InstallOptions {
            bin_dir: dir.path().join("bin"),
            root: dir.path().join("state"),
            force: false,
            skip_test: true,
        }
    }

    fn linux() -> Target {
        Target::from(Platform::new(Os::Linux, Arch::Amd64))
    }

    fn formula(url: &str, sha256: Option<&str>, binary: Option<&str>) -> Formula {
        let mut variant = serde_json::json!({ "os": "linux", "arch": "amd64", "url": url });
        if let Some(sha) = sha256 {
            variant["sha256"] = sha.into();
        }
        if let Some(binary) = binary {
            variant["binary"] = binary.into();
        }
        let text = serde_json::json!({
            "name": "dify",
            "version": "0.0.1-beta.20",
            "variants": [variant],
        })
        .to_string();
        Formula::from_json(&text, None).unwrap()
    }

    #[test_log::test(tokio::test)]
    async fn test_install_raw_asset_from_http() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/download/dify-plugin-linux-amd64")
            .with_status(200)
            .with_body("hello world")
            .create_async()
            .await;

        let dir = tempdir().unwrap();
        let opts = options(&dir);
        let url = format!("{}/download/dify-plugin-linux-amd64", server.url());

        let outcome = installer()
            .install(&formula(&url, Some(HELLO_SHA), None), &linux(), &opts)
            .await
            .unwrap();

        mock.assert_async().await;
        let dest = opts.bin_dir.join("dify");
        assert_eq!(
            outcome,
            InstallOutcome::Installed {
                path: dest.clone(),
                version: "0.0.1-beta.20".into()
            }
        );
        assert_eq!(fs::read_to_string(&dest).unwrap(), "hello world");
        assert!(!opts.bin_dir.join("dify-plugin-linux-amd64").exists());

        let receipt = Receipt::load(&RealRuntime, &Receipt::path_for(&opts.root, "dify"))
            .unwrap()
            .unwrap();
        assert_eq!(receipt.url, url);
        assert_eq!(receipt.installed_path, dest);
    }

    #[tokio::test]
    async fn test_install_from_local_tarball_selects_member() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("dify-plugin-linux-amd64.tar.gz");
        fs::write(
            &archive,
            test_archives::tar_gz(&[
                ("dify-plugin-linux-amd64", "the binary", 0o755),
                ("README.md", "docs", 0o644),
            ])
            .unwrap(),
        )
        .unwrap();
        let opts = options(&dir);

        installer()
            .install(
                &formula(&archive.to_string_lossy(), None, Some("dify-plugin-{os}-{arch}")),
                &linux(),
                &opts,
            )
            .await
            .unwrap();

        assert_eq!(
            fs::read_to_string(opts.bin_dir.join("dify")).unwrap(),
            "the binary"
        );
    }

    #[tokio::test]
    async fn test_checksum_mismatch_halts_before_placement() {
        let dir = tempdir().unwrap();
        let asset = dir.path().join("dify-plugin-linux-amd64");
        fs::write(&asset, "tampered").unwrap();
        let opts = options(&dir);

        let err = installer()
            .install(
                &formula(&asset.to_string_lossy(), Some(HELLO_SHA), None),
                &linux(),
                &opts,
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<InstallError>(),
            Some(InstallError::ChecksumMismatch { .. })
        ));
        assert!(!opts.bin_dir.join("dify").exists());
        assert!(!Receipt::path_for(&opts.root, "dify").exists());
    }

    #[tokio::test]
    async fn test_unsupported_platform_touches_nothing() {
        let dir = tempdir().unwrap();
        let opts = options(&dir);

        let err = installer()
            .install(
                &formula("https://example.invalid/dify", None, None),
                &Target::new("freebsd", "amd64"),
                &opts,
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<InstallError>(),
            Some(InstallError::UnsupportedPlatform { .. })
        ));
        assert!(!opts.bin_dir.exists());
        assert!(!opts.root.exists());
    }

    #[tokio::test]
    async fn test_download_404_fails_without_placing() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/dify")
            .with_status(404)
            .create_async()
            .await;

        let dir = tempdir().unwrap();
        let opts = options(&dir);
        let err = installer()
            .install(&formula(&format!("{}/dify", server.url()), None, None), &linux(), &opts)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("Failed to fetch"));
        assert!(!opts.bin_dir.join("dify").exists());
    }

    #[tokio::test]
    async fn test_reinstall_same_version_is_skipped_unless_forced() {
        let dir = tempdir().unwrap();
        let asset = dir.path().join("dify-plugin-linux-amd64");
        fs::write(&asset, "v1").unwrap();
        let f = formula(&asset.to_string_lossy(), None, None);
        let mut opts = options(&dir);

        installer().install(&f, &linux(), &opts).await.unwrap();
        fs::write(&asset, "v1-rebuilt").unwrap();

        let second = installer().install(&f, &linux(), &opts).await.unwrap();
        assert!(matches!(second, InstallOutcome::AlreadyInstalled { .. }));
        assert_eq!(fs::read_to_string(opts.bin_dir.join("dify")).unwrap(), "v1");

        opts.force = true;
        let third = installer().install(&f, &linux(), &opts).await.unwrap();
        assert!(matches!(third, InstallOutcome::Installed { .. }));
        assert_eq!(
            fs::read_to_string(opts.bin_dir.join("dify")).unwrap(),
            "v1-rebuilt"
        );
    }

    #[tokio::test]
    async fn test_upgrade_overwrites_previous_version() {
        let dir = tempdir().unwrap();
        let asset = dir.path().join("dify-plugin-linux-amd64");
        fs::write(&asset, "old").unwrap();
        let opts = options(&dir);

        let mut f = formula(&asset.to_string_lossy(), None, None);
        installer().install(&f, &linux(), &opts).await.unwrap();

        fs::write(&asset, "new").unwrap();
        f.version = "0.0.2".into();
        installer().install(&f, &linux(), &opts).await.unwrap();

        assert_eq!(fs::read_to_string(opts.bin_dir.join("dify")).unwrap(), "new");
        let receipt = Receipt::load(&RealRuntime, &Receipt::path_for(&opts.root, "dify"))
            .unwrap()
            .unwrap();
        assert_eq!(receipt.version, "0.0.2");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_smoke_test_accepts_and_rejects_by_version() {
        let dir = tempdir().unwrap();
        let good = dir.path().join("good");
        fs::write(&good, "#!/bin/sh\necho dify version 0.0.1-beta.20\n").unwrap();
        let bad = dir.path().join("bad");
        fs::write(&bad, "#!/bin/sh\necho dify version 9.9.9\n").unwrap();

        let mut opts = options(&dir);
        opts.skip_test = false;

        installer()
            .install(&formula(&good.to_string_lossy(), None, None), &linux(), &opts)
            .await
            .unwrap();

        opts.force = true;
        let err = installer()
            .install(&formula(&bad.to_string_lossy(), None, None), &linux(), &opts)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<InstallError>(),
            Some(InstallError::SmokeTestFailed { .. })
        ));
        // No rollback: the failed binary stays in place
        assert!(opts.bin_dir.join("dify").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_check_is_not_reported_as_installed() {
        let dir = tempdir().unwrap();
        let bad = dir.path().join("dify-plugin-linux-amd64");
        fs::write(&bad, "#!/bin/sh\necho dify version 9.9.9\n").unwrap();
        let f = formula(&bad.to_string_lossy(), None, None);
        let mut opts = options(&dir);
        opts.skip_test = false;

        for _ in 0..2 {
            let err = installer().install(&f, &linux(), &opts).await.unwrap_err();
            assert!(matches!(
                err.downcast_ref::<InstallError>(),
                Some(InstallError::SmokeTestFailed { .. })
            ));
        }

        let receipt = Receipt::load(&RealRuntime, &Receipt::path_for(&opts.root, "dify"))
            .unwrap()
            .unwrap();
        assert_eq!(receipt.check, CheckStatus::Pending);
        assert!(opts.bin_dir.join("dify").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_check_is_skipped_for_foreign_platform() {
        let dir = tempdir().unwrap();
        let bad = dir.path().join("dify-plugin-linux-amd64");
        fs::write(&bad, "#!/bin/sh\nexit 1\n").unwrap();
        let mut opts = options(&dir);
        opts.skip_test = false;

        let mut installer = installer();
        installer.host = Some(Platform::new(Os::Darwin, Arch::Arm64));
        installer
            .install(&formula(&bad.to_string_lossy(), None, None), &linux(), &opts)
            .await
            .unwrap();

        let receipt = Receipt::load(&RealRuntime, &Receipt::path_for(&opts.root, "dify"))
            .unwrap()
            .unwrap();
        assert_eq!(receipt.check, CheckStatus::Skipped);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_check_marks_receipt_passed() {
        let dir = tempdir().unwrap();
        let good = dir.path().join("dify-plugin-linux-amd64");
        fs::write(&good, "#!/bin/sh\necho dify version 0.0.1-beta.20\n").unwrap();
        let f = formula(&good.to_string_lossy(), None, None);
        let opts = options(&dir);

        installer().install(&f, &linux(), &opts).await.unwrap();
        let receipt_path = Receipt::path_for(&opts.root, "dify");
        let before = Receipt::load(&RealRuntime, &receipt_path).unwrap().unwrap();
        assert_eq!(before.check, CheckStatus::Skipped);

        installer().test(&f, &linux(), &opts).unwrap();
        let after = Receipt::load(&RealRuntime, &receipt_path).unwrap().unwrap();
        assert_eq!(after.check, CheckStatus::Passed);
    }

    #[tokio::test]
    async fn test_uninstall_removes_binary_and_receipt() {
        let dir = tempdir().unwrap();
        let asset = dir.path().join("dify-plugin-linux-amd64");
        fs::write(&asset, "bin").unwrap();
        let opts = options(&dir);
        let f = formula(&asset.to_string_lossy(), None, None);

        installer().install(&f, &linux(), &opts).await.unwrap();
        let removed = installer().uninstall(&f, &opts).unwrap();

        assert_eq!(removed, opts.bin_dir.join("dify"));
        assert!(!removed.exists());
        assert!(!Receipt::path_for(&opts.root, "dify").exists());

        let err = installer().uninstall(&f, &opts).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<InstallError>(),
            Some(InstallError::NotInstalled(_))
        ));
    }

    #[test]
    fn test_installed_path_without_install() {
        let dir = tempdir().unwrap();
        let f = formula("https://example.invalid/dify", None, None);
        let err = installer()
            .installed_path(&f, &linux(), &options(&dir))
            .unwrap_err();
        assert!(err.to_string().contains("dify is not installed"));
    }
}

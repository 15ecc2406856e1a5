//! Formula descriptors: which artifact to fetch for which platform, and how
//! to check it once installed.

pub mod template;

use anyhow::{Context, Result, bail};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::InstallError;
use crate::platform::{Arch, Os, Platform, Target};
use crate::runtime::Runtime;
use template::TemplateContext;

const BUILTIN_FORMULA: &str = include_str!("../../formulas/dify.json");

fn default_bin_name() -> String {
    "dify".to_string()
}

fn default_test_args() -> Vec<String> {
    vec!["--version".to_string()]
}

/// A package descriptor.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Formula {
    pub name: String,
    #[serde(default)]
    pub desc: String,
    #[serde(default)]
    pub homepage: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    /// Name of the installed executable, whatever the asset is called.
    #[serde(default = "default_bin_name")]
    pub bin_name: String,
    pub variants: Vec<Variant>,
    #[serde(default)]
    pub test: SmokeTest,
    /// Directory the formula was loaded from, substituted for `{dir}`.
    #[serde(skip)]
    pub origin_dir: Option<PathBuf>,
}

/// One (OS, architecture) entry of a formula.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Variant {
    pub os: Os,
    pub arch: Arch,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    /// Glob for the file to install when the asset is an archive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary: Option<String>,
}

impl Variant {
    pub fn platform(&self) -> Platform {
        Platform::new(self.os, self.arch)
    }
}

/// What the post-install check asserts.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Assertion {
    /// Exit status 0 and the output contains the formula version.
    #[default]
    Version,
    /// Exit status 0 only.
    ExitCode,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SmokeTest {
    #[serde(default = "default_test_args")]
    pub args: Vec<String>,
    #[serde(default, rename = "assert")]
    pub assertion: Assertion,
}

impl Default for SmokeTest {
    fn default() -> Self {
        Self {
            args: default_test_args(),
            assertion: Assertion::default(),
        }
    }
}

/// A variant with all templates expanded.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedVariant {
    pub platform: Platform,
    pub url: String,
    pub sha256: Option<String>,
    pub binary: Option<String>,
    /// File name the executable is installed under.
    pub installed_name: String,
}

impl ResolvedVariant {
    /// File name of the asset, taken from the last URL segment.
    pub fn asset_name(&self) -> &str {
        let path = self.url.split(['?', '#']).next().unwrap_or(&self.url);
        path.rsplit(['/', '\\']).next().unwrap_or(path)
    }
}

impl Formula {
    /// The formula compiled into the binary.
    pub fn builtin() -> Result<Self> {
        Self::from_json(BUILTIN_FORMULA, None).context("Built-in formula is invalid")
    }

    #[tracing::instrument(skip(text))]
    pub fn from_json(text: &str, origin_dir: Option<&Path>) -> Result<Self> {
        let mut formula: Formula =
            serde_json::from_str(text).context("Failed to parse formula JSON")?;
        formula.origin_dir = origin_dir.map(Path::to_path_buf);
        formula.validate()?;
        Ok(formula)
    }

    #[tracing::instrument(skip(runtime))]
    pub fn load<R: Runtime>(runtime: &R, path: &Path) -> Result<Self> {
        debug!("Loading formula from {:?}", path);
        let text = runtime
            .read_to_string(path)
            .with_context(|| format!("Failed to read formula {:?}", path))?;
        let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
        Self::from_json(&text, Some(dir.unwrap_or(Path::new("."))))
            .with_context(|| format!("Invalid formula {:?}", path))
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            bail!("Formula name must not be empty");
        }
        if self.version.trim().is_empty() {
            bail!("Formula {} has an empty version", self.name);
        }
        if self.bin_name.trim().is_empty() || self.bin_name.contains(['/', '\\']) {
            bail!("Formula {} has an invalid bin_name {:?}", self.name, self.bin_name);
        }
        if self.variants.is_empty() {
            bail!("Formula {} declares no variants", self.name);
        }
        if self.test.args.is_empty() {
            bail!("Formula {} has a test with no arguments", self.name);
        }

        let mut seen = HashSet::new();
        for variant in &self.variants {
            let platform = variant.platform();
            if !seen.insert(platform) {
                bail!(
                    "Formula {} declares more than one variant for {}",
                    self.name,
                    platform
                );
            }
            if variant.url.trim().is_empty() {
                bail!("Variant {} of {} has an empty url", platform, self.name);
            }
            template::validate(&variant.url)
                .with_context(|| format!("Variant {} of {}", platform, self.name))?;
            if let Some(binary) = &variant.binary {
                template::validate(binary)
                    .with_context(|| format!("Variant {} of {}", platform, self.name))?;
            }
            if let Some(sha) = &variant.sha256
                && (sha.len() != 64 || !sha.chars().all(|c| c.is_ascii_hexdigit()))
            {
                bail!(
                    "Variant {} of {} has a malformed sha256 {:?}",
                    platform,
                    self.name,
                    sha
                );
            }
        }

        Ok(())
    }

    /// Platforms this formula has variants for, sorted.
    pub fn supported_platforms(&self) -> Vec<Platform> {
        let mut platforms: Vec<Platform> = self.variants.iter().map(Variant::platform).collect();
        platforms.sort();
        platforms
    }

    /// The file name the executable is installed under on `os`.
    pub fn installed_name(&self, os: Os) -> String {
        format!("{}{}", self.bin_name, os.exe_suffix())
    }

    /// Select the single variant for `target` and expand its templates.
    #[tracing::instrument(skip(self), fields(formula = %self.name))]
    pub fn resolve(&self, target: &Target) -> Result<ResolvedVariant> {
        let unsupported = || InstallError::UnsupportedPlatform {
            formula: self.name.clone(),
            platform: target.to_string(),
            supported: self.supported_platforms(),
        };

        let platform = target.platform().ok_or_else(unsupported)?;
        let mut matches = self.variants.iter().filter(|v| v.platform() == platform);

        let variant = matches.next().ok_or_else(unsupported)?;
        if matches.next().is_some() {
            return Err(InstallError::AmbiguousVariant {
                formula: self.name.clone(),
                platform,
            }
            .into());
        }

        self.resolve_variant(variant)
    }

    /// Every declared variant, resolved, in declaration order.
    pub fn resolve_all(&self) -> Result<Vec<ResolvedVariant>> {
        self.variants.iter().map(|v| self.resolve_variant(v)).collect()
    }

    fn resolve_variant(&self, variant: &Variant) -> Result<ResolvedVariant> {
        let ctx = TemplateContext {
            version: &self.version,
            platform: variant.platform(),
            dir: self.origin_dir.as_deref(),
        };

        let url = template::expand(&variant.url, &ctx)?;
        if url.trim().is_empty() {
            bail!("Variant {} of {} resolved to an empty url", ctx.platform, self.name);
        }
        let binary = variant
            .binary
            .as_deref()
            .map(|b| template::expand(b, &ctx))
            .transpose()?;

        Ok(ResolvedVariant {
            platform: ctx.platform,
            url,
            sha256: variant.sha256.as_ref().map(|s| s.to_lowercase()),
            binary,
            installed_name: self.installed_name(variant.os),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::MockRuntime;
    use mockall::predicate::eq;

    const SHA: &str = "39ab1029634acf1caa8e68efcc393162a0fc760170472071b5fc02d06b084993";

    fn all_platforms() -> Vec<Platform> {
        vec![
            Platform::new(Os::Darwin, Arch::Amd64),
            Platform::new(Os::Darwin, Arch::Arm64),
            Platform::new(Os::Linux, Arch::Amd64),
            Platform::new(Os::Linux, Arch::Arm64),
            Platform::new(Os::Windows, Arch::Amd64),
        ]
    }

    fn sample() -> Formula {
        Formula::from_json(
            &format!(
                r#"{{
                    "name": "dify",
                    "version": "0.0.1-beta.20",
                    "variants": [
                        {{ "os": "darwin", "arch": "arm64",
                           "url": "file://{{dir}}/bin/dify-plugin-{{os}}-{{arch}}.tar.gz",
                           "sha256": "{}",
                           "binary": "dify-plugin-{{os}}-{{arch}}" }},
                        {{ "os": "linux", "arch": "amd64",
                           "url": "https://example.com/{{version}}/dify-plugin-{{os}}-{{arch}}" }}
                    ]
                }}"#,
                SHA.to_uppercase()
            ),
            Some(Path::new("/formulas")),
        )
        .unwrap()
    }

    #[test]
    fn test_builtin_resolves_every_supported_platform_to_one_url() {
        let formula = Formula::builtin().unwrap();
        assert_eq!(formula.name, "dify");
        assert_eq!(formula.supported_platforms(), all_platforms());

        for platform in all_platforms() {
            let resolved = formula.resolve(&Target::from(platform)).unwrap();
            assert_eq!(resolved.platform, platform);
            assert!(!resolved.url.is_empty());
            assert!(resolved.url.contains(&format!(
                "dify-plugin-{}-{}",
                platform.os, platform.arch
            )));
            assert!(resolved.url.contains(&formula.version));
        }
    }

    #[test]
    fn test_installed_name_is_fixed() {
        let formula = Formula::builtin().unwrap();
        for platform in all_platforms() {
            let resolved = formula.resolve(&Target::from(platform)).unwrap();
            let expected = if platform.os == Os::Windows {
                "dify.exe"
            } else {
                "dify"
            };
            assert_eq!(resolved.installed_name, expected);
            assert_ne!(resolved.installed_name, resolved.asset_name());
        }
    }

    #[test]
    fn test_resolve_expands_templates_and_normalizes_sha() {
        let formula = sample();
        let resolved = formula.resolve(&Target::new("macos", "aarch64")).unwrap();
        assert_eq!(
            resolved.url,
            "file:///formulas/bin/dify-plugin-darwin-arm64.tar.gz"
        );
        assert_eq!(resolved.sha256.as_deref(), Some(SHA));
        assert_eq!(resolved.binary.as_deref(), Some("dify-plugin-darwin-arm64"));
        assert_eq!(resolved.asset_name(), "dify-plugin-darwin-arm64.tar.gz");
    }

    #[test]
    fn test_resolve_unknown_os_fails_instead_of_defaulting() {
        let formula = Formula::builtin().unwrap();
        let err = formula.resolve(&Target::new("freebsd", "amd64")).unwrap_err();
        match err.downcast_ref::<InstallError>() {
            Some(InstallError::UnsupportedPlatform { platform, .. }) => {
                assert_eq!(platform, "freebsd-amd64")
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_resolve_unknown_arch_fails() {
        let formula = Formula::builtin().unwrap();
        let err = formula.resolve(&Target::new("linux", "riscv64")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<InstallError>(),
            Some(InstallError::UnsupportedPlatform { .. })
        ));
    }

    #[test]
    fn test_resolve_known_but_undeclared_platform_fails() {
        // windows-arm64 is a platform we can name, but no variant covers it
        let formula = Formula::builtin().unwrap();
        let err = formula.resolve(&Target::new("windows", "arm64")).unwrap_err();
        assert!(err.to_string().contains("does not support platform windows-arm64"));
    }

    #[test]
    fn test_resolve_ambiguous_variant() {
        let mut formula = sample();
        let duplicate = formula.variants[1].clone();
        formula.variants.push(duplicate);

        let err = formula.resolve(&Target::new("linux", "amd64")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<InstallError>(),
            Some(InstallError::AmbiguousVariant { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        let text = r#"{
            "name": "dify", "version": "1",
            "variants": [
                { "os": "linux", "arch": "amd64", "url": "a" },
                { "os": "linux", "arch": "x86_64", "url": "b" }
            ]
        }"#;
        let err = Formula::from_json(text, None).unwrap_err();
        assert!(err.to_string().contains("more than one variant"));
    }

    #[test]
    fn test_validate_rejects_bad_fields() {
        let cases = [
            r#"{"name": "", "version": "1", "variants": [{"os": "linux", "arch": "amd64", "url": "a"}]}"#,
            r#"{"name": "d", "version": " ", "variants": [{"os": "linux", "arch": "amd64", "url": "a"}]}"#,
            r#"{"name": "d", "version": "1", "variants": []}"#,
            r#"{"name": "d", "version": "1", "variants": [{"os": "linux", "arch": "amd64", "url": ""}]}"#,
            r#"{"name": "d", "version": "1", "bin_name": "a/b", "variants": [{"os": "linux", "arch": "amd64", "url": "a"}]}"#,
            r#"{"name": "d", "version": "1", "variants": [{"os": "linux", "arch": "amd64", "url": "a", "sha256": "abc"}]}"#,
            r#"{"name": "d", "version": "1", "variants": [{"os": "linux", "arch": "amd64", "url": "{nope}"}]}"#,
            r#"{"name": "d", "version": "1", "variants": [{"os": "freebsd", "arch": "amd64", "url": "a"}]}"#,
        ];
        for text in cases {
            assert!(Formula::from_json(text, None).is_err(), "accepted: {}", text);
        }
    }

    #[test]
    fn test_defaults() {
        let formula = Formula::from_json(
            r#"{"name": "d", "version": "1", "variants": [{"os": "linux", "arch": "amd64", "url": "a"}]}"#,
            None,
        )
        .unwrap();
        assert_eq!(formula.bin_name, "dify");
        assert_eq!(formula.test.args, vec!["--version"]);
        assert_eq!(formula.test.assertion, Assertion::Version);
        assert!(formula.license.is_none());
    }

    #[test]
    fn test_builtin_checks_exit_code_only() {
        let formula = Formula::builtin().unwrap();
        assert_eq!(formula.test.assertion, Assertion::ExitCode);
    }

    #[test]
    fn test_local_formula_is_macos_only() {
        let text = include_str!("../../formulas/dify-local.json");
        let formula = Formula::from_json(text, Some(Path::new("/tap"))).unwrap();

        let intel = formula.resolve(&Target::new("darwin", "amd64")).unwrap();
        assert_eq!(
            intel.url,
            "file:///tap/bin/dify-plugin-darwin-amd64.tar.gz"
        );
        assert!(intel.sha256.is_some());
        // Intel archives name their member after the CPU, not the Go arch
        assert_eq!(intel.binary.as_deref(), Some("dify-plugin-darwin-x86_64"));

        let apple = formula.resolve(&Target::new("darwin", "arm64")).unwrap();
        assert_eq!(apple.binary.as_deref(), Some("dify-plugin-darwin-arm64"));

        assert!(formula.resolve(&Target::new("linux", "amd64")).is_err());
        assert!(formula.resolve(&Target::new("windows", "amd64")).is_err());
    }

    #[test]
    fn test_resolve_all() {
        let formula = sample();
        let all = formula.resolve_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].url, "https://example.com/0.0.1-beta.20/dify-plugin-linux-amd64");
    }

    #[test]
    fn test_load_uses_parent_dir() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_read_to_string()
            .with(eq(Path::new("/tap/dify.json").to_path_buf()))
            .returning(|_| Ok(include_str!("../../formulas/dify-local.json").to_string()));

        let formula = Formula::load(&runtime, Path::new("/tap/dify.json")).unwrap();
        assert_eq!(formula.origin_dir.as_deref(), Some(Path::new("/tap")));
    }

    #[test]
    fn test_load_bare_file_name_uses_current_dir() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_read_to_string()
            .returning(|_| Ok(include_str!("../../formulas/dify-local.json").to_string()));

        let formula = Formula::load(&runtime, Path::new("dify.json")).unwrap();
        assert_eq!(formula.origin_dir.as_deref(), Some(Path::new(".")));
    }

    #[test]
    fn test_load_missing_file() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_read_to_string()
            .returning(|_| Err(anyhow::anyhow!("No such file")));

        let err = Formula::load(&runtime, Path::new("/nope.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to read formula"));
    }
}

//! Install failures that callers need to tell apart.
//!
//! Everything else travels as a plain `anyhow::Error` with context; these are
//! wrapped into `anyhow::Error` too and recovered with `downcast_ref`.

use crate::platform::Platform;

#[derive(Debug)]
pub enum InstallError {
    /// No variant of the formula covers the platform.
    UnsupportedPlatform {
        formula: String,
        platform: String,
        supported: Vec<Platform>,
    },
    /// More than one variant claims the same platform.
    AmbiguousVariant { formula: String, platform: Platform },
    /// Downloaded artifact does not hash to the pinned value.
    ChecksumMismatch {
        url: String,
        expected: String,
        actual: String,
    },
    /// The executable to install could not be located in the download.
    ArtifactNotFound { pattern: String, candidates: Vec<String> },
    /// The installed executable failed its post-install check.
    SmokeTestFailed { command: String, reason: String },
    /// Nothing has been installed for this formula.
    NotInstalled(String),
}

impl std::fmt::Display for InstallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstallError::UnsupportedPlatform {
                formula,
                platform,
                supported,
            } => {
                let supported: Vec<String> = supported.iter().map(|p| p.to_string()).collect();
                write!(
                    f,
                    "{} does not support platform {} (supported: {})",
                    formula,
                    platform,
                    if supported.is_empty() {
                        "none".to_string()
                    } else {
                        supported.join(", ")
                    }
                )
            }
            InstallError::AmbiguousVariant { formula, platform } => {
                write!(
                    f,
                    "{} declares more than one variant for {}",
                    formula, platform
                )
            }
            InstallError::ChecksumMismatch {
                url,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "SHA-256 mismatch for {}\n  expected: {}\n    actual: {}",
                    url, expected, actual
                )
            }
            InstallError::ArtifactNotFound {
                pattern,
                candidates,
            } => {
                if candidates.is_empty() {
                    write!(f, "No file matching {:?} found in download", pattern)
                } else {
                    write!(
                        f,
                        "Expected exactly one file matching {:?}, found:\n  {}",
                        pattern,
                        candidates.join("\n  ")
                    )
                }
            }
            InstallError::SmokeTestFailed { command, reason } => {
                write!(f, "Post-install check `{}` failed: {}", command, reason)
            }
            InstallError::NotInstalled(name) => write!(f, "{} is not installed", name),
        }
    }
}

impl std::error::Error for InstallError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{Arch, Os};

    #[test]
    fn test_unsupported_platform_display_lists_supported() {
        let err = InstallError::UnsupportedPlatform {
            formula: "dify".into(),
            platform: "linux-amd64".into(),
            supported: vec![
                Platform::new(Os::Darwin, Arch::Amd64),
                Platform::new(Os::Darwin, Arch::Arm64),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("does not support platform linux-amd64"));
        assert!(msg.contains("darwin-amd64, darwin-arm64"));
    }

    #[test]
    fn test_checksum_mismatch_display() {
        let err = InstallError::ChecksumMismatch {
            url: "https://example.com/dify".into(),
            expected: "aa".into(),
            actual: "bb".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("SHA-256 mismatch"));
        assert!(msg.contains("expected: aa"));
        assert!(msg.contains("actual: bb"));
    }

    #[test]
    fn test_artifact_not_found_display() {
        let none = InstallError::ArtifactNotFound {
            pattern: "dify-*".into(),
            candidates: vec![],
        };
        assert!(none.to_string().contains("No file matching"));

        let many = InstallError::ArtifactNotFound {
            pattern: "*".into(),
            candidates: vec!["a".into(), "b".into()],
        };
        assert!(many.to_string().contains("exactly one"));
    }

    #[test]
    fn test_downcast_through_anyhow() {
        let err = anyhow::Error::from(InstallError::NotInstalled("dify".into()))
            .context("uninstall failed");
        assert!(matches!(
            err.downcast_ref::<InstallError>(),
            Some(InstallError::NotInstalled(_))
        ));
    }
}

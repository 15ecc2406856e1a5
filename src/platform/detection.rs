use super::{Arch, Os, Platform};

/// Raw platform information, either detected or given on the command line.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub os: String,
    pub arch: String,
}

impl Target {
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
        }
    }

    /// Detect the current platform
    pub fn detect() -> Self {
        Self {
            os: Self::detect_os(),
            arch: Self::detect_arch(),
        }
    }

    /// Detect the current platform, replacing either half with an override.
    pub fn detect_with(os: Option<String>, arch: Option<String>) -> Self {
        let host = Self::detect();
        Self {
            os: os.unwrap_or(host.os),
            arch: arch.unwrap_or(host.arch),
        }
    }

    fn detect_os() -> String {
        #[cfg(target_os = "macos")]
        {
            "darwin".to_string()
        }
        #[cfg(target_os = "linux")]
        {
            "linux".to_string()
        }
        #[cfg(target_os = "windows")]
        {
            "windows".to_string()
        }
        #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
        {
            std::env::consts::OS.to_string()
        }
    }

    fn detect_arch() -> String {
        #[cfg(target_arch = "x86_64")]
        {
            "amd64".to_string()
        }
        #[cfg(target_arch = "aarch64")]
        {
            "arm64".to_string()
        }
        #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
        {
            std::env::consts::ARCH.to_string()
        }
    }

    /// The supported platform this target names, if any.
    pub fn platform(&self) -> Option<Platform> {
        let os = self.os.parse::<Os>().ok()?;
        let arch = self.arch.parse::<Arch>().ok()?;
        Some(Platform::new(os, arch))
    }
}

impl From<Platform> for Target {
    fn from(platform: Platform) -> Self {
        Self::new(platform.os.as_str(), platform.arch.as_str())
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.os, self.arch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_detect() {
        let target = Target::detect();

        assert!(!target.os.is_empty());
        assert!(!target.arch.is_empty());

        #[cfg(target_os = "macos")]
        assert_eq!(target.os, "darwin");

        #[cfg(target_os = "linux")]
        assert_eq!(target.os, "linux");

        #[cfg(target_arch = "x86_64")]
        assert_eq!(target.arch, "amd64");

        #[cfg(target_arch = "aarch64")]
        assert_eq!(target.arch, "arm64");
    }

    #[test]
    fn test_detect_with_overrides() {
        let target = Target::detect_with(Some("freebsd".into()), None);
        assert_eq!(target.os, "freebsd");
        assert_eq!(target.arch, Target::detect().arch);

        let both = Target::detect_with(Some("darwin".into()), Some("arm64".into()));
        assert_eq!(both, Target::new("darwin", "arm64"));
    }

    #[test]
    fn test_target_platform() {
        assert_eq!(
            Target::new("macos", "x86_64").platform(),
            Some(Platform::new(Os::Darwin, Arch::Amd64))
        );
        assert_eq!(Target::new("freebsd", "amd64").platform(), None);
        assert_eq!(Target::new("linux", "mips").platform(), None);
    }

    #[test]
    fn test_target_from_platform_round_trip() {
        let platform = Platform::new(Os::Windows, Arch::Amd64);
        let target = Target::from(platform);
        assert_eq!(target.to_string(), "windows-amd64");
        assert_eq!(target.platform(), Some(platform));
    }
}

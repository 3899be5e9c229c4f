//! Target platform: operating system × CPU architecture.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{GwsupError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Os {
    Macos,
    Linux,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    Arm64,
    X64,
}

impl Os {
    pub const ALL: [Os; 2] = [Os::Macos, Os::Linux];

    /// Token used in release asset names.
    pub fn token(&self) -> &'static str {
        match self {
            Os::Macos => "macos",
            Os::Linux => "linux",
        }
    }
}

impl Arch {
    pub const ALL: [Arch; 2] = [Arch::Arm64, Arch::X64];

    pub fn token(&self) -> &'static str {
        match self {
            Arch::Arm64 => "arm64",
            Arch::X64 => "x64",
        }
    }
}

impl FromStr for Os {
    type Err = GwsupError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "macos" | "darwin" | "osx" => Ok(Os::Macos),
            "linux" => Ok(Os::Linux),
            other => Err(GwsupError::UnsupportedPlatform {
                platform: format!("os {}", other),
                version: None,
            }),
        }
    }
}

impl FromStr for Arch {
    type Err = GwsupError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "arm64" | "aarch64" => Ok(Arch::Arm64),
            "x64" | "x86_64" | "amd64" => Ok(Arch::X64),
            other => Err(GwsupError::UnsupportedPlatform {
                platform: format!("arch {}", other),
                version: None,
            }),
        }
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// One of the four supported (os, arch) combinations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Platform {
    pub os: Os,
    pub arch: Arch,
}

impl Platform {
    pub const ALL: [Platform; 4] = [
        Platform { os: Os::Macos, arch: Arch::Arm64 },
        Platform { os: Os::Macos, arch: Arch::X64 },
        Platform { os: Os::Linux, arch: Arch::Arm64 },
        Platform { os: Os::Linux, arch: Arch::X64 },
    ];

    pub fn new(os: Os, arch: Arch) -> Self {
        Self { os, arch }
    }

    /// Parse separate os and arch names, e.g. ("darwin", "aarch64").
    pub fn parse(os: &str, arch: &str) -> Result<Self> {
        Ok(Self::new(os.parse()?, arch.parse()?))
    }

    /// Platform of the running host. Hosts outside the supported set are an error, never a default.
    pub fn current() -> Result<Self> {
        Self::from_target(std::env::consts::OS, std::env::consts::ARCH)
    }

    fn from_target(os: &str, arch: &str) -> Result<Self> {
        let unsupported = || GwsupError::UnsupportedPlatform {
            platform: format!("{}/{}", os, arch),
            version: None,
        };
        let os = match os {
            "macos" => Os::Macos,
            "linux" => Os::Linux,
            _ => return Err(unsupported()),
        };
        let arch = match arch {
            "aarch64" => Arch::Arm64,
            "x86_64" => Arch::X64,
            _ => return Err(unsupported()),
        };
        Ok(Self::new(os, arch))
    }
}

/// `<os>_<arch>`, the fragment used in asset names and formula keys.
impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.os, self.arch)
    }
}

impl FromStr for Platform {
    type Err = GwsupError;

    fn from_str(s: &str) -> Result<Self> {
        let (os, arch) = s
            .split_once(['_', '/', '-'])
            .ok_or_else(|| GwsupError::UnsupportedPlatform {
                platform: s.to_string(),
                version: None,
            })?;
        Self::parse(os, arch)
    }
}

impl Serialize for Platform {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Platform {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_aliases() {
        assert_eq!(
            Platform::parse("darwin", "aarch64").unwrap(),
            Platform::new(Os::Macos, Arch::Arm64)
        );
        assert_eq!(
            Platform::parse("Linux", "amd64").unwrap(),
            Platform::new(Os::Linux, Arch::X64)
        );
        assert_eq!("linux_x64".parse::<Platform>().unwrap().to_string(), "linux_x64");
        assert_eq!("macos/arm64".parse::<Platform>().unwrap().to_string(), "macos_arm64");
    }

    #[test]
    fn test_unsupported_platforms_fail() {
        for (os, arch) in [("windows", "x64"), ("linux", "riscv64"), ("freebsd", "arm64"), ("linux", "x86")] {
            let err = Platform::parse(os, arch).unwrap_err();
            assert!(matches!(err, GwsupError::UnsupportedPlatform { .. }), "{}/{}", os, arch);
        }
        assert!("linux".parse::<Platform>().is_err());
    }

    #[test]
    fn test_from_target() {
        assert_eq!(
            Platform::from_target("linux", "x86_64").unwrap(),
            Platform::new(Os::Linux, Arch::X64)
        );
        assert_eq!(
            Platform::from_target("macos", "aarch64").unwrap(),
            Platform::new(Os::Macos, Arch::Arm64)
        );
        assert!(Platform::from_target("windows", "x86_64").is_err());
        assert!(Platform::from_target("linux", "powerpc64").is_err());
    }

    #[test]
    fn test_all_has_four_distinct_keys() {
        let keys: std::collections::HashSet<String> =
            Platform::ALL.iter().map(|p| p.to_string()).collect();
        assert_eq!(keys.len(), 4);
        assert!(keys.contains("macos_arm64"));
        assert!(keys.contains("linux_x64"));
    }
}

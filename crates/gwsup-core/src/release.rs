//! Release index: (version, platform) → download locator + SHA-256 digest.
//!
//! The table mirrors a package-manager formula. It ships compiled in
//! ([`ReleaseIndex::builtin`]) and can be replaced by a JSON formula file:
//!
//! ```json
//! {
//!   "name": "gws",
//!   "homepage": "https://github.com/tasuku43/gws",
//!   "releases": [
//!     { "version": "0.1.0",
//!       "assets": { "linux_x64": { "url": "https://…/gws_v0.1.0_linux_x64.tar.gz", "sha256": "…" } } }
//!   ]
//! }
//! ```
//!
//! Published entries are immutable: [`ReleaseIndex::append`] refuses to change
//! an existing (version, platform) pair.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use semver::Version;
use serde::{Deserialize, Serialize};

use crate::error::{
    utils::{formula_error, io_error},
    GwsupError, Result,
};
use crate::integrity::Sha256Digest;
use crate::platform::Platform;

pub const PACKAGE_NAME: &str = "gws";
pub const DEFAULT_HOMEPAGE: &str = "https://github.com/tasuku43/gws";
/// Name of the single executable inside every release archive.
pub const BINARY_NAME: &str = "gws";

/// `gws_vX.Y.Z_<os>_<arch>.tar.gz`
pub fn asset_file_name(version: &Version, platform: Platform) -> String {
    format!("{}_v{}_{}.tar.gz", PACKAGE_NAME, version, platform)
}

/// `<base>/releases/download/vX.Y.Z/<asset file name>`
pub fn asset_url(base: &str, version: &Version, platform: Platform) -> String {
    format!(
        "{}/releases/download/v{}/{}",
        base.trim_end_matches('/'),
        version,
        asset_file_name(version, platform)
    )
}

/// Accepts "0.1.0" and "v0.1.0".
pub fn parse_version(s: &str) -> Result<Version> {
    let t = s.trim();
    let t = t.strip_prefix('v').unwrap_or(t);
    Version::parse(t).map_err(|e| GwsupError::Formula {
        operation: "parse version".to_string(),
        source: format!("{:?}: {}", s, e),
    })
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub url: String,
    pub sha256: Sha256Digest,
}

/// Result of resolving a (version, platform) request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ResolvedAsset {
    pub version: Version,
    pub platform: Platform,
    pub url: String,
    pub sha256: Sha256Digest,
}

impl ResolvedAsset {
    pub fn file_name(&self) -> String {
        asset_file_name(&self.version, self.platform)
    }

    pub fn is_placeholder(&self) -> bool {
        self.sha256.is_placeholder()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub version: Version,
    pub assets: BTreeMap<Platform, Asset>,
}

impl Release {
    /// Build a release whose assets follow the standard download layout under `base`.
    pub fn from_digests(
        base: &str,
        version: Version,
        digests: impl IntoIterator<Item = (Platform, Sha256Digest)>,
    ) -> Self {
        let assets = digests
            .into_iter()
            .map(|(platform, sha256)| {
                let url = asset_url(base, &version, platform);
                (platform, Asset { url, sha256 })
            })
            .collect();
        Self { version, assets }
    }

    /// Placeholder releases carry only all-zero digests and are never installable.
    pub fn is_placeholder(&self) -> bool {
        !self.assets.is_empty() && self.assets.values().all(|a| a.sha256.is_placeholder())
    }
}

#[derive(Serialize, Deserialize)]
struct FormulaFile {
    #[serde(default = "default_name")]
    name: String,
    #[serde(default = "default_homepage")]
    homepage: String,
    #[serde(default)]
    releases: Vec<Release>,
}

fn default_name() -> String {
    PACKAGE_NAME.to_string()
}

fn default_homepage() -> String {
    DEFAULT_HOMEPAGE.to_string()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReleaseIndex {
    pub name: String,
    pub homepage: String,
    releases: BTreeMap<Version, Release>,
}

impl Default for ReleaseIndex {
    fn default() -> Self {
        Self::empty()
    }
}

impl ReleaseIndex {
    pub fn empty() -> Self {
        Self {
            name: default_name(),
            homepage: default_homepage(),
            releases: BTreeMap::new(),
        }
    }

    /// Release table compiled into the binary.
    pub fn builtin() -> Self {
        let mut index = Self::empty();
        let placeholder = Release::from_digests(
            DEFAULT_HOMEPAGE,
            Version::new(0, 0, 0),
            Platform::ALL.iter().map(|p| (*p, Sha256Digest::PLACEHOLDER)),
        );
        index.releases.insert(placeholder.version.clone(), placeholder);
        index
    }

    /// Load a JSON formula file. Duplicate versions in the file are an error.
    pub fn load(path: &Path) -> Result<Self> {
        let s = fs::read_to_string(path).map_err(|e| io_error("read formula", Some(path), e))?;
        Self::from_json(&s)
    }

    pub fn from_json(s: &str) -> Result<Self> {
        let file: FormulaFile =
            serde_json::from_str(s).map_err(|e| formula_error("parse formula", e))?;
        let mut index = Self {
            name: file.name,
            homepage: file.homepage,
            releases: BTreeMap::new(),
        };
        for release in file.releases {
            if index.releases.contains_key(&release.version) {
                return Err(formula_error(
                    "parse formula",
                    format!("version {} listed more than once", release.version),
                ));
            }
            index.releases.insert(release.version.clone(), release);
        }
        Ok(index)
    }

    pub fn to_json(&self) -> Result<String> {
        let file = FormulaFile {
            name: self.name.clone(),
            homepage: self.homepage.clone(),
            releases: self.releases.values().cloned().collect(),
        };
        serde_json::to_string_pretty(&file).map_err(|e| formula_error("write formula", e))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| io_error("write formula", Some(parent), e))?;
        }
        fs::write(path, json + "\n").map_err(|e| io_error("write formula", Some(path), e))
    }

    pub fn releases(&self) -> impl Iterator<Item = &Release> {
        self.releases.values()
    }

    pub fn get(&self, version: &Version) -> Option<&Release> {
        self.releases.get(version)
    }

    /// Highest version that is not a placeholder.
    pub fn latest(&self) -> Option<&Release> {
        self.releases.values().rev().find(|r| !r.is_placeholder())
    }

    /// Exactly one asset for (version, platform), or an error. Never substitutes another platform.
    pub fn resolve(&self, version: &Version, platform: Platform) -> Result<ResolvedAsset> {
        let release = self.releases.get(version).ok_or_else(|| GwsupError::UnknownVersion {
            version: version.to_string(),
        })?;
        let asset = release
            .assets
            .get(&platform)
            .ok_or_else(|| GwsupError::UnsupportedPlatform {
                platform: platform.to_string(),
                version: Some(version.to_string()),
            })?;
        Ok(ResolvedAsset {
            version: version.clone(),
            platform,
            url: asset.url.clone(),
            sha256: asset.sha256,
        })
    }

    /// Resolve `version`, or the latest published release when `None`.
    pub fn resolve_or_latest(&self, version: Option<&Version>, platform: Platform) -> Result<ResolvedAsset> {
        match version {
            Some(v) => self.resolve(v, platform),
            None => {
                let latest = self.latest().ok_or_else(|| GwsupError::UnknownVersion {
                    version: "latest (no published releases)".to_string(),
                })?;
                self.resolve(&latest.version, platform)
            }
        }
    }

    /// Append a newly cut release. Returns `Ok(false)` when an identical
    /// release is already present; any change to a published entry is rejected.
    pub fn append(&mut self, release: Release) -> Result<bool> {
        if release.assets.is_empty() {
            return Err(formula_error(
                "append release",
                format!("release {} has no assets", release.version),
            ));
        }
        if let Some(existing) = self.releases.get(&release.version) {
            if *existing == release {
                return Ok(false);
            }
            return Err(formula_error(
                "append release",
                format!("release {} is already published and cannot change", release.version),
            ));
        }
        self.releases.insert(release.version.clone(), release);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{Arch, Os};

    fn digest(b: u8) -> Sha256Digest {
        Sha256Digest::from_bytes([b; 32])
    }

    fn sample_index() -> ReleaseIndex {
        let mut index = ReleaseIndex::builtin();
        let release = Release::from_digests(
            DEFAULT_HOMEPAGE,
            Version::new(0, 1, 0),
            Platform::ALL.iter().enumerate().map(|(i, p)| (*p, digest(i as u8 + 1))),
        );
        index.append(release).unwrap();
        index
    }

    #[test]
    fn test_asset_layout() {
        let v = Version::new(0, 1, 0);
        let p = Platform::new(Os::Linux, Arch::X64);
        assert_eq!(asset_file_name(&v, p), "gws_v0.1.0_linux_x64.tar.gz");
        assert_eq!(
            asset_url("https://github.com/tasuku43/gws/", &v, p),
            "https://github.com/tasuku43/gws/releases/download/v0.1.0/gws_v0.1.0_linux_x64.tar.gz"
        );
    }

    #[test]
    fn test_resolve_every_platform_gets_its_own_asset() {
        let index = sample_index();
        let v = Version::new(0, 1, 0);
        let mut seen = std::collections::HashSet::new();
        for p in Platform::ALL {
            let asset = index.resolve(&v, p).unwrap();
            assert_eq!(asset.platform, p);
            assert!(asset.url.ends_with(&asset_file_name(&v, p)));
            assert!(seen.insert(asset.sha256));
        }
    }

    #[test]
    fn test_missing_platform_does_not_fall_back() {
        let mut index = ReleaseIndex::empty();
        let release = Release::from_digests(
            DEFAULT_HOMEPAGE,
            Version::new(0, 2, 0),
            [(Platform::new(Os::Linux, Arch::X64), digest(9))],
        );
        index.append(release).unwrap();

        let err = index
            .resolve(&Version::new(0, 2, 0), Platform::new(Os::Linux, Arch::Arm64))
            .unwrap_err();
        match err {
            GwsupError::UnsupportedPlatform { platform, version } => {
                assert_eq!(platform, "linux_arm64");
                assert_eq!(version.as_deref(), Some("0.2.0"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_version() {
        let index = sample_index();
        let err = index
            .resolve(&Version::new(9, 9, 9), Platform::new(Os::Macos, Arch::X64))
            .unwrap_err();
        assert!(matches!(err, GwsupError::UnknownVersion { .. }));
    }

    #[test]
    fn test_builtin_is_placeholder_only() {
        let index = ReleaseIndex::builtin();
        let release = index.get(&Version::new(0, 0, 0)).unwrap();
        assert!(release.is_placeholder());
        assert_eq!(release.assets.len(), 4);
        assert!(index.latest().is_none());
        assert!(index.resolve_or_latest(None, Platform::new(Os::Linux, Arch::X64)).is_err());
    }

    #[test]
    fn test_latest_skips_placeholder() {
        let index = sample_index();
        let asset = index
            .resolve_or_latest(None, Platform::new(Os::Macos, Arch::Arm64))
            .unwrap();
        assert_eq!(asset.version, Version::new(0, 1, 0));
    }

    #[test]
    fn test_append_is_immutable() {
        let mut index = sample_index();
        let same = index.get(&Version::new(0, 1, 0)).unwrap().clone();
        assert!(!index.append(same.clone()).unwrap());

        let mut changed = same;
        changed
            .assets
            .get_mut(&Platform::new(Os::Linux, Arch::X64))
            .unwrap()
            .sha256 = digest(0xee);
        assert!(matches!(index.append(changed), Err(GwsupError::Formula { .. })));
    }

    #[test]
    fn test_json_roundtrip_and_duplicates() {
        let index = sample_index();
        let json = index.to_json().unwrap();
        assert!(json.contains("\"linux_x64\""));
        assert_eq!(ReleaseIndex::from_json(&json).unwrap(), index);

        let dup = r#"{"releases":[
            {"version":"0.1.0","assets":{}},
            {"version":"0.1.0","assets":{}}
        ]}"#;
        assert!(ReleaseIndex::from_json(dup).is_err());
    }

    #[test]
    fn test_formula_rejects_unknown_platform_key() {
        let bad = r#"{"releases":[{"version":"0.1.0","assets":{"windows_x64":{"url":"u","sha256":"00"}}}]}"#;
        assert!(ReleaseIndex::from_json(bad).is_err());
    }

    #[test]
    fn test_parse_version_accepts_v_prefix() {
        assert_eq!(parse_version("v0.1.0").unwrap(), Version::new(0, 1, 0));
        assert!(parse_version("0.1").is_err());
    }
}

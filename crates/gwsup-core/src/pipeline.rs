//! resolve → fetch → verify → install → test, strictly in order.
//! Each stage finishes before the next starts and any failure aborts the run,
//! tagged with the stage it came from.

use std::path::PathBuf;
use std::time::Duration;

use semver::Version;
use serde::Serialize;

use crate::error::{GwsupError, Result, Stage};
use crate::fetch::Fetcher;
use crate::install;
use crate::integrity::Sha256Digest;
use crate::platform::Platform;
use crate::release::{ReleaseIndex, ResolvedAsset};
use crate::smoke::{self, SmokeReport};
use crate::utils;

#[derive(Debug, Clone)]
pub struct InstallRequest {
    /// `None` installs the latest published release.
    pub version: Option<Version>,
    pub platform: Platform,
    pub run_smoke_test: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstallReport {
    pub version: Version,
    pub platform: Platform,
    pub url: String,
    pub sha256: Sha256Digest,
    pub installed: PathBuf,
    pub from_cache: bool,
    pub smoke: Option<SmokeReport>,
    /// Why the smoke test did not run, when it was requested but skipped.
    pub smoke_skipped: Option<String>,
}

pub struct Pipeline<'a> {
    index: &'a ReleaseIndex,
    fetcher: Fetcher,
    bin_dir: PathBuf,
    smoke_timeout: Duration,
}

/// Verification failures belong to the verify stage; everything else the fetcher raises is a fetch failure.
fn fetch_stage(err: &GwsupError) -> Stage {
    match err {
        GwsupError::Integrity { .. } | GwsupError::PlaceholderRelease { .. } => Stage::Verify,
        _ => Stage::Fetch,
    }
}

impl<'a> Pipeline<'a> {
    pub fn new(index: &'a ReleaseIndex, fetcher: Fetcher, bin_dir: PathBuf, smoke_timeout: Duration) -> Self {
        Self {
            index,
            fetcher,
            bin_dir,
            smoke_timeout,
        }
    }

    pub fn resolve(&self, request: &InstallRequest) -> Result<ResolvedAsset> {
        self.index
            .resolve_or_latest(request.version.as_ref(), request.platform)
            .map_err(|e| e.at(Stage::Resolve))
    }

    pub fn run(&self, request: &InstallRequest) -> Result<InstallReport> {
        let asset = self.resolve(request)?;
        utils::log(self.fetcher.cache_dir(), &format!("Resolved gws {} for {}: {}", asset.version, asset.platform, asset.url));

        let archive = self
            .fetcher
            .fetch_and_verify(&asset)
            .map_err(|e| {
                let stage = fetch_stage(&e);
                e.at(stage)
            })?;

        let installed = install::install_archive(&archive, &self.bin_dir).map_err(|e| e.at(Stage::Install))?;
        utils::log(self.fetcher.cache_dir(), &format!("Installed {}", installed.display()));

        let mut smoke = None;
        let mut smoke_skipped = None;
        if request.run_smoke_test {
            match Platform::current() {
                Ok(host) if host == asset.platform => {
                    let report = smoke::smoke_test(&installed, self.smoke_timeout).map_err(|e| e.at(Stage::Test))?;
                    utils::log(self.fetcher.cache_dir(), &format!("Smoke test passed: {}", report.stdout));
                    smoke = Some(report);
                }
                _ => {
                    let reason = format!("{} binary cannot run on this host", asset.platform);
                    utils::log(self.fetcher.cache_dir(), &format!("Skipping smoke test: {}", reason));
                    smoke_skipped = Some(reason);
                }
            }
        }

        Ok(InstallReport {
            version: asset.version,
            platform: asset.platform,
            url: asset.url,
            sha256: asset.sha256,
            installed,
            from_cache: archive.from_cache(),
            smoke,
            smoke_skipped,
        })
    }
}

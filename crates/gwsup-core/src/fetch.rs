//! Fetch a release archive and verify its digest before anything touches the bin dir.
//!
//! Verified archives are kept under `<cache>/archives/<sha256>.tar.gz`. A cache
//! hit is re-hashed before use; a corrupt entry is evicted and downloaded again.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use sha2::{Digest, Sha256};

use crate::error::{
    utils::{io_error, network_error},
    GwsupError, Result,
};
use crate::http_client::{Download, HttpClient};
use crate::integrity::{self, Sha256Digest};
use crate::release::ResolvedAsset;
use crate::utils::{self, ARCHIVES_DIR, STAGING_DIR};

/// An archive whose bytes matched the published digest. Only this module can create one.
#[derive(Debug)]
pub struct VerifiedArchive {
    path: PathBuf,
    digest: Sha256Digest,
    from_cache: bool,
}

impl VerifiedArchive {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn digest(&self) -> &Sha256Digest {
        &self.digest
    }

    pub fn from_cache(&self) -> bool {
        self.from_cache
    }
}

pub struct Fetcher {
    client: HttpClient,
    cache_dir: PathBuf,
    offline: bool,
    show_progress: bool,
}

/// `file:///abs/path` or a plain filesystem path; `None` for network URLs.
pub fn local_source(url: &str) -> Option<PathBuf> {
    if let Some(rest) = url.strip_prefix("file://") {
        return Some(PathBuf::from(rest));
    }
    if url.contains("://") {
        return None;
    }
    Some(PathBuf::from(url))
}

impl Fetcher {
    pub fn new(client: HttpClient, cache_dir: PathBuf) -> Self {
        Self {
            client,
            cache_dir,
            offline: false,
            show_progress: false,
        }
    }

    pub fn offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    pub fn show_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn cached_path(&self, digest: &Sha256Digest) -> PathBuf {
        self.cache_dir.join(ARCHIVES_DIR).join(format!("{}.tar.gz", digest))
    }

    /// Return a verified archive for `asset`, from cache or by downloading it.
    /// Placeholder digests are refused before any bytes are fetched.
    pub fn fetch_and_verify(&self, asset: &ResolvedAsset) -> Result<VerifiedArchive> {
        if asset.is_placeholder() {
            return Err(GwsupError::PlaceholderRelease {
                version: asset.version.to_string(),
                platform: asset.platform.to_string(),
            });
        }
        utils::init_cache(&self.cache_dir).map_err(|e| io_error("init cache", Some(&self.cache_dir), e))?;

        if let Some(hit) = self.lookup_cache(asset)? {
            return Ok(hit);
        }
        if self.offline {
            return Err(network_error(
                &asset.url,
                None,
                format!("offline mode and {} is not in the cache", asset.file_name()),
            ));
        }

        let (staged, actual) = self.download_to_staging(asset)?;
        if let Err(e) = integrity::verify_or_err(&asset.url, &asset.sha256, &actual) {
            let _ = fs::remove_file(&staged);
            utils::log(&self.cache_dir, &format!("Rejected {}: digest {} does not match {}", asset.url, actual, asset.sha256));
            return Err(e);
        }

        let dest = self.cached_path(&asset.sha256);
        fs::rename(&staged, &dest).map_err(|e| io_error("store archive", Some(&dest), e))?;
        utils::log(&self.cache_dir, &format!("Verified {} (sha256 {})", asset.file_name(), actual));
        Ok(VerifiedArchive {
            path: dest,
            digest: actual,
            from_cache: false,
        })
    }

    fn lookup_cache(&self, asset: &ResolvedAsset) -> Result<Option<VerifiedArchive>> {
        let path = self.cached_path(&asset.sha256);
        if !path.is_file() {
            return Ok(None);
        }
        let actual = Sha256Digest::of_file(&path)?;
        if integrity::verify(&asset.sha256, &actual) {
            utils::log(&self.cache_dir, &format!("Using cached {}", asset.file_name()));
            return Ok(Some(VerifiedArchive {
                path,
                digest: actual,
                from_cache: true,
            }));
        }
        utils::log(&self.cache_dir, &format!("Evicting corrupt cache entry {}", path.display()));
        fs::remove_file(&path).map_err(|e| io_error("evict cache entry", Some(&path), e))?;
        Ok(None)
    }

    fn open_source(&self, url: &str) -> Result<Download> {
        match local_source(url) {
            Some(path) => {
                let file = File::open(&path).map_err(|e| network_error(url, None, e))?;
                let content_length = file.metadata().ok().map(|m| m.len());
                Ok(Download {
                    content_length,
                    reader: Box::new(file),
                })
            }
            None => self.client.open(url),
        }
    }

    /// Stream the asset into the staging dir, hashing as it is written.
    fn download_to_staging(&self, asset: &ResolvedAsset) -> Result<(PathBuf, Sha256Digest)> {
        let staging = self
            .cache_dir
            .join(STAGING_DIR)
            .join(format!("{}.partial-{}", asset.file_name(), std::process::id()));
        let mut download = self.open_source(&asset.url)?;
        let progress = self.progress_bar(download.content_length, &asset.file_name());

        let result = (|| -> Result<Sha256Digest> {
            let mut out = File::create(&staging).map_err(|e| io_error("create staging file", Some(&staging), e))?;
            let mut hasher = Sha256::new();
            let mut buf = [0u8; 64 * 1024];
            loop {
                let n = download
                    .reader
                    .read(&mut buf)
                    .map_err(|e| network_error(&asset.url, None, e))?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
                out.write_all(&buf[..n])
                    .map_err(|e| io_error("write staging file", Some(&staging), e))?;
                progress.inc(n as u64);
            }
            out.sync_all().map_err(|e| io_error("write staging file", Some(&staging), e))?;
            Ok(Sha256Digest::from_bytes(hasher.finalize().into()))
        })();
        progress.finish_and_clear();

        match result {
            Ok(digest) => Ok((staging, digest)),
            Err(e) => {
                let _ = fs::remove_file(&staging);
                Err(e)
            }
        }
    }

    fn progress_bar(&self, len: Option<u64>, name: &str) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = match len {
            Some(n) => ProgressBar::new(n),
            None => ProgressBar::new_spinner(),
        };
        let template = if len.is_some() {
            "{msg} [{bar:30}] {bytes}/{total_bytes}"
        } else {
            "{spinner:.dim} {msg} {bytes}"
        };
        if let Ok(style) = ProgressStyle::default_bar().template(template) {
            pb.set_style(style.progress_chars("=> "));
        }
        pb.set_message(name.to_string());
        pb
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{Arch, Os, Platform};
    use semver::Version;

    fn asset_for(path: &Path, sha256: Sha256Digest) -> ResolvedAsset {
        ResolvedAsset {
            version: Version::new(0, 1, 0),
            platform: Platform::new(Os::Linux, Arch::X64),
            url: format!("file://{}", path.display()),
            sha256,
        }
    }

    fn fetcher(cache: &Path) -> Fetcher {
        Fetcher::new(HttpClient::new(1_000, 0, 1), cache.to_path_buf())
    }

    #[test]
    fn test_local_source() {
        assert_eq!(local_source("file:///tmp/a.tar.gz"), Some(PathBuf::from("/tmp/a.tar.gz")));
        assert_eq!(local_source("/tmp/a.tar.gz"), Some(PathBuf::from("/tmp/a.tar.gz")));
        assert_eq!(local_source("https://example.com/a.tar.gz"), None);
    }

    #[test]
    fn test_fetch_verifies_and_caches() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("gws_v0.1.0_linux_x64.tar.gz");
        fs::write(&src, b"archive bytes").unwrap();
        let digest = Sha256Digest::of_bytes(b"archive bytes");
        let cache = tmp.path().join("cache");

        let f = fetcher(&cache);
        let first = f.fetch_and_verify(&asset_for(&src, digest)).unwrap();
        assert!(!first.from_cache());
        assert_eq!(first.digest(), &digest);
        assert_eq!(fs::read(first.path()).unwrap(), b"archive bytes");

        let second = f.fetch_and_verify(&asset_for(&src, digest)).unwrap();
        assert!(second.from_cache());

        let log = fs::read_to_string(cache.join(utils::LOG_FILE)).unwrap();
        assert!(log.contains("Verified gws_v0.1.0_linux_x64.tar.gz"), "{}", log);
        assert!(log.contains("Using cached gws_v0.1.0_linux_x64.tar.gz"), "{}", log);
    }

    #[test]
    fn test_mismatch_is_rejected_and_not_cached() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("a.tar.gz");
        fs::write(&src, b"tampered").unwrap();
        let expected = Sha256Digest::of_bytes(b"original");
        let cache = tmp.path().join("cache");

        let f = fetcher(&cache);
        let err = f.fetch_and_verify(&asset_for(&src, expected)).unwrap_err();
        assert!(matches!(err, GwsupError::Integrity { .. }));
        assert!(!f.cached_path(&expected).exists());
        let leftovers = fs::read_dir(cache.join(STAGING_DIR)).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_placeholder_is_refused() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("a.tar.gz");
        fs::write(&src, b"anything").unwrap();
        let f = fetcher(&tmp.path().join("cache"));
        let err = f
            .fetch_and_verify(&asset_for(&src, Sha256Digest::PLACEHOLDER))
            .unwrap_err();
        assert!(matches!(err, GwsupError::PlaceholderRelease { .. }));
    }

    #[test]
    fn test_corrupt_cache_entry_is_evicted() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("a.tar.gz");
        fs::write(&src, b"good bytes").unwrap();
        let digest = Sha256Digest::of_bytes(b"good bytes");
        let cache = tmp.path().join("cache");
        let f = fetcher(&cache);

        utils::init_cache(&cache).unwrap();
        fs::write(f.cached_path(&digest), b"bit rot").unwrap();

        let archive = f.fetch_and_verify(&asset_for(&src, digest)).unwrap();
        assert!(!archive.from_cache());
        assert_eq!(fs::read(archive.path()).unwrap(), b"good bytes");
    }

    #[test]
    fn test_offline_requires_cache() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("a.tar.gz");
        fs::write(&src, b"bytes").unwrap();
        let digest = Sha256Digest::of_bytes(b"bytes");
        let f = fetcher(&tmp.path().join("cache")).offline(true);
        let err = f.fetch_and_verify(&asset_for(&src, digest)).unwrap_err();
        assert!(matches!(err, GwsupError::Network { .. }));
    }
}

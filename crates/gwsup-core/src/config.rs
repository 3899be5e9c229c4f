//! Optional config from .gwsuprc or ~/.gwsuprc (JSON). Merged with env and CLI.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{GwsupError, Result};
use crate::utils;

pub const DEFAULT_HTTP_RETRIES: usize = 2;
pub const DEFAULT_HTTP_RETRY_BACKOFF_MS: u64 = 250;
pub const DEFAULT_HTTP_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_SMOKE_TIMEOUT_SECS: u64 = 30;

/// Values from a .gwsuprc file. CLI and env override these.
#[derive(Default, Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileConfig {
    pub bin_dir: Option<String>,
    pub cache_dir: Option<String>,
    pub formula: Option<String>,
    pub offline: Option<bool>,
}

/// Load config from .gwsuprc in dir, then ~/.gwsuprc. The first file found wins.
/// A missing file is the default; a file that does not parse is an error.
pub fn load_config(dir: &Path) -> Result<FileConfig> {
    let mut candidates = vec![dir.join(".gwsuprc")];
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(".gwsuprc"));
    }
    for path in &candidates {
        if path.is_file() {
            let s = std::fs::read_to_string(path).map_err(|e| GwsupError::Config {
                field: None,
                source: format!("{}: {}", path.display(), e),
            })?;
            return serde_json::from_str(&s).map_err(|e| GwsupError::Config {
                field: None,
                source: format!("{}: {}", path.display(), e),
            });
        }
    }
    Ok(FileConfig::default())
}

/// Effective settings after applying CLI > env > file > defaults.
#[derive(Debug, Clone)]
pub struct Settings {
    pub bin_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub formula: Option<PathBuf>,
    pub offline: bool,
    pub http_retries: usize,
    pub http_retry_backoff_ms: u64,
    pub http_timeout_ms: u64,
    pub smoke_timeout: Duration,
}

/// Command-line overrides; `None` means "not given".
#[derive(Default, Debug, Clone)]
pub struct Overrides {
    pub bin_dir: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    pub formula: Option<PathBuf>,
    pub offline: bool,
}

fn env_nonempty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match env_nonempty(name) {
        None => Ok(default),
        Some(v) => v.trim().parse().map_err(|_| GwsupError::Config {
            field: Some(name.to_string()),
            source: format!("invalid value {:?}", v),
        }),
    }
}

impl Settings {
    pub fn resolve(file: &FileConfig, cli: &Overrides) -> Result<Self> {
        let bin_dir = cli
            .bin_dir
            .clone()
            .or_else(|| env_nonempty("GWSUP_BIN_DIR").map(|v| utils::expand_home(&v)))
            .or_else(|| file.bin_dir.as_deref().map(utils::expand_home))
            .unwrap_or_else(utils::default_bin_dir);
        let cache_dir = cli
            .cache_dir
            .clone()
            .or_else(|| env_nonempty("GWSUP_CACHE_DIR").map(|v| utils::expand_home(&v)))
            .or_else(|| file.cache_dir.as_deref().map(utils::expand_home))
            .unwrap_or_else(utils::get_cache_dir);
        let formula = cli
            .formula
            .clone()
            .or_else(|| env_nonempty("GWSUP_FORMULA").map(|v| utils::expand_home(&v)))
            .or_else(|| file.formula.as_deref().map(utils::expand_home));
        let offline = cli.offline || utils::env_flag("GWSUP_OFFLINE") || file.offline.unwrap_or(false);

        Ok(Self {
            bin_dir,
            cache_dir,
            formula,
            offline,
            http_retries: env_parse("GWSUP_HTTP_RETRIES", DEFAULT_HTTP_RETRIES)?,
            http_retry_backoff_ms: env_parse("GWSUP_HTTP_RETRY_BACKOFF_MS", DEFAULT_HTTP_RETRY_BACKOFF_MS)?,
            http_timeout_ms: env_parse("GWSUP_HTTP_TIMEOUT_MS", DEFAULT_HTTP_TIMEOUT_MS)?,
            smoke_timeout: Duration::from_secs(env_parse(
                "GWSUP_SMOKE_TIMEOUT_SECS",
                DEFAULT_SMOKE_TIMEOUT_SECS,
            )?),
        })
    }

    /// Load .gwsuprc from `dir` and apply env and CLI overrides.
    pub fn load(dir: &Path, cli: &Overrides) -> Result<Self> {
        let file = load_config(dir)?;
        Self::resolve(&file, cli)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_file() {
        let file = FileConfig {
            bin_dir: Some("/from/file".to_string()),
            cache_dir: Some("/cache/file".to_string()),
            formula: Some("/formula.json".to_string()),
            offline: Some(false),
        };
        let cli = Overrides {
            bin_dir: Some(PathBuf::from("/from/cli")),
            cache_dir: Some(PathBuf::from("/cache/cli")),
            formula: None,
            offline: true,
        };
        let s = Settings::resolve(&file, &cli).unwrap();
        assert_eq!(s.bin_dir, PathBuf::from("/from/cli"));
        assert_eq!(s.cache_dir, PathBuf::from("/cache/cli"));
        assert!(s.offline);
        if std::env::var_os("GWSUP_FORMULA").is_none() {
            assert_eq!(s.formula, Some(PathBuf::from("/formula.json")));
        }
    }

    #[test]
    fn test_rc_file_in_dir() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join(".gwsuprc"),
            r#"{"binDir":"/opt/gws/bin","offline":true}"#,
        )
        .unwrap();
        let cfg = load_config(tmp.path()).unwrap();
        assert_eq!(cfg.bin_dir.as_deref(), Some("/opt/gws/bin"));
        assert_eq!(cfg.offline, Some(true));
        assert_eq!(cfg.cache_dir, None);
    }

    #[test]
    fn test_invalid_rc_is_config_error() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(".gwsuprc"), "{ not json").unwrap();
        assert!(matches!(load_config(tmp.path()), Err(GwsupError::Config { .. })));
    }
}

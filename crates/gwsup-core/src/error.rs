//! Error types for gwsup operations.
//! Every variant is terminal for the install pipeline; the fetcher retries
//! transient network failures internally before surfacing `Network`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Pipeline stage, used to tell the user where an install stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Resolve,
    Fetch,
    Verify,
    Install,
    Test,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Resolve => "resolve",
            Stage::Fetch => "fetch",
            Stage::Verify => "verify",
            Stage::Install => "install",
            Stage::Test => "test",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Main error type for gwsup operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GwsupError {
    /// No release asset exists for the requested platform
    UnsupportedPlatform {
        platform: String,
        version: Option<String>,
    },
    /// Requested version is not in the release index
    UnknownVersion { version: String },
    /// Downloaded bytes do not match the published digest
    Integrity {
        url: String,
        expected: String,
        actual: String,
    },
    /// Release carries the all-zero placeholder digest
    PlaceholderRelease { version: String, platform: String },
    /// Network/HTTP errors
    Network {
        url: String,
        status: Option<u16>,
        source: String,
    },
    /// I/O related errors
    Io {
        operation: String,
        path: Option<String>,
        source: String,
    },
    /// Target directory cannot be written
    Permission { path: String, source: String },
    /// Archive does not have the expected layout
    Archive { path: String, reason: String },
    /// Installed binary did not exit 0 on `--version`
    SmokeTest {
        binary: String,
        status: Option<i32>,
        output: String,
    },
    /// Formula file / release table errors
    Formula { operation: String, source: String },
    /// Configuration errors
    Config { field: Option<String>, source: String },
    /// Error raised inside a pipeline stage
    Stage { stage: Stage, source: Box<GwsupError> },
}

impl fmt::Display for GwsupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GwsupError::UnsupportedPlatform { platform, version } => {
                write!(f, "unsupported platform: {}", platform)?;
                if let Some(version) = version {
                    write!(f, " (version: {})", version)?;
                }
                Ok(())
            }
            GwsupError::UnknownVersion { version } => {
                write!(f, "unknown release version: {}", version)
            }
            GwsupError::Integrity { url, expected, actual } => write!(
                f,
                "integrity check failed for {}: expected sha256 {}, got {}",
                url, expected, actual
            ),
            GwsupError::PlaceholderRelease { version, platform } => write!(
                f,
                "release {} ({}) has a placeholder digest and cannot be installed",
                version, platform
            ),
            GwsupError::Network { url, status, source } => {
                write!(f, "network error: {} (url: {})", source, url)?;
                if let Some(status) = status {
                    write!(f, " (status: {})", status)?;
                }
                Ok(())
            }
            GwsupError::Io { operation, path, source } => {
                write!(f, "I/O error in {}: {}", operation, source)?;
                if let Some(path) = path {
                    write!(f, " (path: {})", path)?;
                }
                Ok(())
            }
            GwsupError::Permission { path, source } => {
                write!(f, "cannot write to {}: {}", path, source)
            }
            GwsupError::Archive { path, reason } => {
                write!(f, "invalid archive {}: {}", path, reason)
            }
            GwsupError::SmokeTest { binary, status, output } => {
                write!(f, "{} --version failed", binary)?;
                match status {
                    Some(code) => write!(f, " (exit status: {})", code)?,
                    None => write!(f, " (terminated without exit status)")?,
                }
                if !output.trim().is_empty() {
                    write!(f, ": {}", output.trim())?;
                }
                Ok(())
            }
            GwsupError::Formula { operation, source } => {
                write!(f, "formula error in {}: {}", operation, source)
            }
            GwsupError::Config { field, source } => {
                write!(f, "configuration error: {}", source)?;
                if let Some(field) = field {
                    write!(f, " (field: {})", field)?;
                }
                Ok(())
            }
            GwsupError::Stage { stage, source } => write!(f, "{} failed: {}", stage, source),
        }
    }
}

impl std::error::Error for GwsupError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GwsupError::Stage { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl GwsupError {
    /// Tag this error with the pipeline stage it came from. Already tagged errors keep their stage.
    pub fn at(self, stage: Stage) -> Self {
        match self {
            GwsupError::Stage { .. } => self,
            other => GwsupError::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    pub fn stage(&self) -> Option<Stage> {
        match self {
            GwsupError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Innermost error, with any stage wrapper removed.
    pub fn root(&self) -> &GwsupError {
        match self {
            GwsupError::Stage { source, .. } => source.root(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, GwsupError>;

/// Helpers for common error conversions
pub mod utils {
    use super::*;

    pub fn io_error(operation: &str, path: Option<&std::path::Path>, source: std::io::Error) -> GwsupError {
        GwsupError::Io {
            operation: operation.to_string(),
            path: path.map(|p| p.display().to_string()),
            source: source.to_string(),
        }
    }

    /// Map a write failure in `dir` to `Permission` when the OS says so, `Io` otherwise.
    pub fn write_error(operation: &str, dir: &std::path::Path, source: std::io::Error) -> GwsupError {
        if source.kind() == std::io::ErrorKind::PermissionDenied {
            GwsupError::Permission {
                path: dir.display().to_string(),
                source: source.to_string(),
            }
        } else {
            io_error(operation, Some(dir), source)
        }
    }

    pub fn network_error(url: &str, status: Option<u16>, source: impl ToString) -> GwsupError {
        GwsupError::Network {
            url: url.to_string(),
            status,
            source: source.to_string(),
        }
    }

    pub fn formula_error(operation: &str, source: impl ToString) -> GwsupError {
        GwsupError::Formula {
            operation: operation.to_string(),
            source: source.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = GwsupError::Io {
            operation: "read_file".to_string(),
            path: Some("/path/to/file".to_string()),
            source: "Permission denied".to_string(),
        };

        let display = format!("{}", error);
        assert!(display.contains("read_file"));
        assert!(display.contains("Permission denied"));
        assert!(display.contains("/path/to/file"));
    }

    #[test]
    fn test_stage_wrapping_names_stage() {
        let err = GwsupError::Integrity {
            url: "https://example.com/a.tar.gz".to_string(),
            expected: "00".repeat(32),
            actual: "ff".repeat(32),
        }
        .at(Stage::Verify);

        assert_eq!(err.stage(), Some(Stage::Verify));
        assert!(err.to_string().starts_with("verify failed: integrity check failed"));
        assert!(matches!(err.root(), GwsupError::Integrity { .. }));
    }

    #[test]
    fn test_stage_is_not_rewrapped() {
        let err = GwsupError::UnknownVersion { version: "9.9.9".to_string() }
            .at(Stage::Resolve)
            .at(Stage::Install);
        assert_eq!(err.stage(), Some(Stage::Resolve));
    }

    #[test]
    fn test_permission_denied_maps_to_permission() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = utils::write_error("install", std::path::Path::new("/usr/local/bin"), io);
        assert!(matches!(err, GwsupError::Permission { .. }));

        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let err = utils::write_error("install", std::path::Path::new("/usr/local/bin"), io);
        assert!(matches!(err, GwsupError::Io { .. }));
    }
}

//! Post-install smoke test: `gws --version` must exit 0. Output is kept for display only.

use std::path::Path;
use std::time::Duration;

use serde::Serialize;

use crate::error::{utils::io_error, GwsupError, Result};
use crate::utils::run_command_timeout;

pub const VERSION_FLAG: &str = "--version";

#[derive(Debug, Clone, Serialize)]
pub struct SmokeReport {
    pub binary: String,
    pub stdout: String,
}

pub fn smoke_test(binary: &Path, timeout: Duration) -> Result<SmokeReport> {
    let out = run_command_timeout(binary, &[VERSION_FLAG], timeout)
        .map_err(|e| io_error("run smoke test", Some(binary), e))?;
    let stdout = String::from_utf8_lossy(&out.stdout).trim().to_string();
    let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();

    if out.timed_out {
        return Err(GwsupError::SmokeTest {
            binary: binary.display().to_string(),
            status: None,
            output: format!("timed out after {:?}", timeout),
        });
    }
    match out.status {
        Some(status) if status.success() => Ok(SmokeReport {
            binary: binary.display().to_string(),
            stdout,
        }),
        status => Err(GwsupError::SmokeTest {
            binary: binary.display().to_string(),
            status: status.and_then(|s| s.code()),
            output: if stderr.is_empty() { stdout } else { stderr },
        }),
    }
}

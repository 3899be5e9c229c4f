use std::path::Path;
use std::time::Duration;

use serde::Serialize;

use crate::install;
use crate::platform::Platform;
use crate::smoke;
use crate::utils;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DoctorReport {
    pub details: Vec<String>,
    pub warnings: Vec<String>,
    pub issues: Vec<Issue>,
}

impl DoctorReport {
    pub fn is_healthy(&self) -> bool {
        self.issues.is_empty()
    }

    fn issue(&mut self, kind: &str, message: String) {
        self.issues.push(Issue {
            kind: kind.to_string(),
            message,
        });
    }
}

/// Check the installed gws binary in `bin_dir`: present, executable, on PATH, and `--version` exits 0.
pub fn check_installation(bin_dir: &Path, timeout: Duration) -> DoctorReport {
    let mut report = DoctorReport::default();

    match Platform::current() {
        Ok(p) => report.details.push(format!("platform: {}", p)),
        Err(e) => report.issue("unsupported_platform", e.to_string()),
    }
    report.details.push(format!("bin dir: {}", bin_dir.display()));

    if !utils::dir_on_path(bin_dir) {
        report
            .warnings
            .push(format!("{} is not on PATH", bin_dir.display()));
    }

    let binary = install::installed_path(bin_dir);
    if !binary.exists() {
        report.issue("missing_binary", format!("{} not found", binary.display()));
        return report;
    }
    report.details.push(format!("binary: {}", binary.display()));

    if !install::is_executable(&binary) {
        report.issue("not_executable", format!("{} is not executable", binary.display()));
        return report;
    }

    match smoke::smoke_test(&binary, timeout) {
        Ok(r) => report.details.push(format!("version: {}", r.stdout)),
        Err(e) => report.issue("version_check_failed", e.to_string()),
    }
    report
}

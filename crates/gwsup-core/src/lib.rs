//! Core library for gwsup: release index, fetch, verify, install, smoke test, doctor.
//! Used by the CLI binary; can be reused by other tools that need to install gws.

pub mod config;
pub mod doctor;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod http_client;
pub mod install;
pub mod integrity;
pub mod pipeline;
pub mod platform;
pub mod release;
pub mod smoke;
pub mod utils;

// Re-export main API for CLI
pub use config::{load_config, FileConfig, Overrides, Settings};
pub use doctor::{check_installation, DoctorReport};
pub use error::{GwsupError, Result, Stage};
pub use fetch::{Fetcher, VerifiedArchive};
pub use http_client::HttpClient;
pub use install::{installed_path, uninstall};
pub use integrity::Sha256Digest;
pub use pipeline::{InstallReport, InstallRequest, Pipeline};
pub use platform::{Arch, Os, Platform};
pub use release::{parse_version, Release, ReleaseIndex, ResolvedAsset};
pub use smoke::smoke_test;
pub use utils::log;

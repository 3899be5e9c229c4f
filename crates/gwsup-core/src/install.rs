//! Place the verified executable into the bin dir.

use std::fs;
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

use crate::error::{
    utils::{io_error, write_error},
    Result,
};
use crate::extract;
use crate::fetch::VerifiedArchive;
use crate::release::BINARY_NAME;

pub const EXECUTABLE_MODE: u32 = 0o755;

/// Path the binary is installed to inside `bin_dir`.
pub fn installed_path(bin_dir: &Path) -> PathBuf {
    bin_dir.join(binary_file_name())
}

fn binary_file_name() -> String {
    if cfg!(windows) {
        format!("{}.exe", BINARY_NAME)
    } else {
        BINARY_NAME.to_string()
    }
}

/// Extract `gws` from `archive` and install it into `bin_dir`.
pub fn install_archive(archive: &VerifiedArchive, bin_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(bin_dir).map_err(|e| write_error("create bin dir", bin_dir, e))?;
    // Extract next to the target so the final rename stays on one filesystem.
    let scratch = bin_dir.join(format!(".{}-install-{}", BINARY_NAME, std::process::id()));
    // First write into an existing bin dir; a read-only dir must surface as a permission error.
    fs::create_dir_all(&scratch).map_err(|e| write_error("create scratch dir", bin_dir, e))?;
    let result = extract::extract_binary(archive, &scratch)
        .and_then(|extracted| place_executable(&extracted, bin_dir));
    let _ = fs::remove_dir_all(&scratch);
    result
}

/// Copy `source` into `bin_dir` as `gws` with executable permissions, replacing any previous binary.
pub fn place_executable(source: &Path, bin_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(bin_dir).map_err(|e| write_error("create bin dir", bin_dir, e))?;
    let target = installed_path(bin_dir);
    let tmp = bin_dir.join(format!(".{}.tmp-{}", binary_file_name(), std::process::id()));

    let write = || -> Result<()> {
        fs::copy(source, &tmp).map_err(|e| write_error("write binary", bin_dir, e))?;
        #[cfg(unix)]
        {
            let mut perms = fs::metadata(&tmp)
                .map_err(|e| io_error("read permissions", Some(&tmp), e))?
                .permissions();
            perms.set_mode(EXECUTABLE_MODE);
            fs::set_permissions(&tmp, perms).map_err(|e| write_error("set permissions", bin_dir, e))?;
        }
        fs::rename(&tmp, &target).map_err(|e| write_error("replace binary", bin_dir, e))
    };
    if let Err(e) = write() {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(target)
}

/// Remove the installed binary. Returns whether a file was removed.
pub fn uninstall(bin_dir: &Path) -> Result<bool> {
    let target = installed_path(bin_dir);
    match fs::remove_file(&target) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(write_error("remove binary", bin_dir, e)),
    }
}

/// Whether `path` is a regular file with an execute bit set (any regular file on non-Unix).
pub fn is_executable(path: &Path) -> bool {
    let Ok(meta) = fs::metadata(path) else {
        return false;
    };
    if !meta.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        meta.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

//! Pull the single `gws` executable out of a verified release tarball.

use std::fs::{self, File};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tar::{Archive, EntryType};

use crate::error::{utils::io_error, GwsupError, Result};
use crate::fetch::VerifiedArchive;
use crate::release::BINARY_NAME;

/// Extract the `gws` member of `archive` into `dest_dir`, returning the extracted path.
pub fn extract_binary(archive: &VerifiedArchive, dest_dir: &Path) -> Result<PathBuf> {
    extract_member(archive.path(), BINARY_NAME, dest_dir)
}

/// Accepts `name`, `./name`, and `<top>/name`. Anything deeper or containing `..` is not a match.
fn is_member(path: &str, name: &str) -> bool {
    let comps: Vec<Component> = Path::new(path)
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect();
    if comps.iter().any(|c| !matches!(c, Component::Normal(_))) {
        return false;
    }
    match comps.as_slice() {
        [Component::Normal(f)] => *f == name,
        [Component::Normal(_), Component::Normal(f)] => *f == name,
        _ => false,
    }
}

pub(crate) fn extract_member(tarball_path: &Path, name: &str, dest_dir: &Path) -> Result<PathBuf> {
    let archive_err = |reason: String| GwsupError::Archive {
        path: tarball_path.display().to_string(),
        reason,
    };

    let file = File::open(tarball_path).map_err(|e| io_error("open archive", Some(tarball_path), e))?;
    let mut archive = Archive::new(GzDecoder::new(file));

    fs::create_dir_all(dest_dir).map_err(|e| io_error("create extract dir", Some(dest_dir), e))?;
    let dest_path = dest_dir.join(name);
    if dest_path.exists() {
        fs::remove_file(&dest_path).map_err(|e| io_error("clear extract dir", Some(&dest_path), e))?;
    }

    let mut found = false;
    let entries = archive
        .entries()
        .map_err(|e| archive_err(format!("failed to read archive: {}", e)))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| archive_err(format!("failed to read entry: {}", e)))?;
        let path = entry
            .path()
            .map_err(|e| archive_err(format!("failed to get path: {}", e)))?
            .to_string_lossy()
            .to_string();

        if !is_member(&path, name) {
            continue;
        }
        let kind = entry.header().entry_type();
        if kind.is_dir() {
            continue;
        }
        if kind != EntryType::Regular && kind != EntryType::Continuous {
            return Err(archive_err(format!("{} is not a regular file", path)));
        }
        if found {
            let _ = fs::remove_file(&dest_path);
            return Err(archive_err(format!("more than one `{}` member", name)));
        }
        entry
            .unpack(&dest_path)
            .map_err(|e| archive_err(format!("failed to unpack {}: {}", path, e)))?;
        found = true;
    }

    if !found {
        return Err(archive_err(format!("no `{}` executable in archive", name)));
    }
    Ok(dest_path)
}

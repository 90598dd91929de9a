use std::ffi::{OsStr, OsString};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{FetchError, FsContext, Result};
use crate::extract::ScratchDir;
use crate::sanitize::is_single_component;

/// Entries archivers add that are never part of the payload.
const NOISE_ENTRIES: &[&str] = &["__MACOSX", ".DS_Store"];

/// Move the contents of `scratch` into `output_dir` and return the path
/// that now represents the asset.
///
/// - one file: moved to `output_dir/<name>` as a file
/// - one directory: renamed to `output_dir/<name>`, replacing any existing one
/// - several entries: gathered under `output_dir/<name>`, where the default
///   name is the scratch label
///
/// Whatever was at the destination is replaced, so re-running with the
/// same inputs yields the same layout.
pub fn promote(
    scratch: &ScratchDir,
    output_dir: &Path,
    name_override: Option<&str>,
) -> Result<PathBuf> {
    let entries = significant_entries(scratch.path())?;

    let dest = match entries.as_slice() {
        [] => {
            return Err(FetchError::corrupt(
                scratch.asset_name(),
                "archive contains no files",
            ))
        }
        [entry] => {
            let name = destination_name(name_override, entry.file_name().unwrap_or_default())?;
            let dest = output_dir.join(name);
            let metadata = fs::symlink_metadata(entry).fs_context(entry)?;
            if metadata.is_dir() {
                replace_with(entry, &dest)?;
            } else {
                move_file(entry, &dest)?;
            }
            dest
        }
        entries => {
            let name = destination_name(name_override, OsStr::new(scratch.label()))?;
            let dest = output_dir.join(name);
            gather_into(entries, &dest)?;
            dest
        }
    };

    tracing::info!("Placed {} at {}", scratch.asset_name(), dest.display());
    Ok(dest)
}

/// Top-level entries of `dir` minus archiver noise, sorted by name.
fn significant_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).fs_context(dir)? {
        let entry = entry.fs_context(dir)?;
        let name = entry.file_name();
        if NOISE_ENTRIES.iter().any(|noise| name == *noise) {
            tracing::debug!("Ignoring {}", name.to_string_lossy());
            continue;
        }
        entries.push(entry.path());
    }
    entries.sort();
    Ok(entries)
}

fn destination_name(name_override: Option<&str>, fallback: &OsStr) -> Result<OsString> {
    let name = name_override.map(OsStr::new).unwrap_or(fallback);
    let valid = name
        .to_str()
        .map(is_single_component)
        .unwrap_or(!name.is_empty());
    if !valid {
        return Err(FetchError::InvalidName {
            name: name.to_string_lossy().into_owned(),
        });
    }
    Ok(name.to_os_string())
}

/// Remove whatever is at `path`, if anything.
fn clear(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(metadata) if metadata.is_dir() => fs::remove_dir_all(path).fs_context(path),
        Ok(_) => fs::remove_file(path).fs_context(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).fs_context(path),
    }
}

/// True when both paths exist and resolve to the same location.
fn same_location(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn move_file(src: &Path, dest: &Path) -> Result<()> {
    if same_location(src, dest) {
        tracing::debug!("{} is already in place", dest.display());
        return Ok(());
    }
    clear(dest)?;
    fs::rename(src, dest).fs_context(dest)
}

fn replace_with(src: &Path, dest: &Path) -> Result<()> {
    clear(dest)?;
    fs::rename(src, dest).fs_context(dest)
}

/// `dest` is always recreated empty, so nothing from an earlier release
/// survives next to the new entries.
fn gather_into(entries: &[PathBuf], dest: &Path) -> Result<()> {
    clear(dest)?;
    fs::create_dir_all(dest).fs_context(dest)?;

    for entry in entries {
        let Some(name) = entry.file_name() else {
            continue;
        };
        let target = dest.join(name);
        fs::rename(entry, &target).fs_context(&target)?;
    }
    Ok(())
}

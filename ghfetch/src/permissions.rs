use std::fs;
use std::path::Path;

use crate::error::{FsContext, Result};

/// Parse an octal permission string such as `0755`, `755` or `0o755`.
pub fn parse_mode(value: &str) -> Option<u32> {
    let value = value.trim();
    let digits = value
        .strip_prefix("0o")
        .or_else(|| value.strip_prefix("0O"))
        .unwrap_or(value);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    u32::from_str_radix(digits, 8)
        .ok()
        .filter(|mode| *mode <= 0o7777)
}

#[cfg(unix)]
pub fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).fs_context(path)
}

#[cfg(not(unix))]
pub fn set_mode(path: &Path, _mode: u32) -> Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "permission bits are not supported on this platform",
    ))
    .fs_context(path)
}

/// Apply a user-supplied chmod value to a materialized asset.
///
/// Never fails the run: bad values, directories and I/O errors are logged
/// and skipped. Returns whether the mode was applied.
pub fn apply_chmod(path: &Path, value: &str) -> bool {
    let Some(mode) = parse_mode(value) else {
        tracing::warn!(
            "Invalid chmod value '{}' for {}; expected octal such as 0755",
            value,
            path.display()
        );
        return false;
    };

    match fs::symlink_metadata(path) {
        Ok(metadata) if metadata.is_file() => {}
        Ok(_) => {
            tracing::warn!("Not applying chmod {} to {}: not a regular file", value, path.display());
            return false;
        }
        Err(e) => {
            tracing::warn!("Cannot chmod {}: {}", path.display(), e);
            return false;
        }
    }

    match set_mode(path, mode) {
        Ok(()) => {
            tracing::info!("Set mode {:o} on {}", mode, path.display());
            true
        }
        Err(e) => {
            tracing::warn!("{}", e);
            false
        }
    }
}

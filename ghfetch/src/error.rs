use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Invalid repository format '{input}'. Expected format: owner/repo (e.g., jpillora/chisel)")]
    InvalidRepo { input: String },

    #[error("Invalid asset pattern /{pattern}/: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("No asset matching /{pattern}/ in the latest release of {repo}. Available assets: {available}")]
    NotFound {
        pattern: String,
        repo: String,
        available: String,
    },

    #[error("{operation} failed: {message}")]
    Network { operation: String, message: String },

    #[error("Refusing to extract {archive}: member '{member}' {reason}")]
    UnsafeArchive {
        archive: String,
        member: String,
        reason: String,
    },

    #[error("Archive extraction failed for {archive}: {reason}")]
    CorruptArchive { archive: String, reason: String },

    #[error("Invalid output name '{name}'. Names must be a single path component")]
    InvalidName { name: String },

    #[error("Filesystem error at {path}: {source}")]
    Filesystem {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl FetchError {
    pub fn corrupt(archive: &str, reason: impl ToString) -> Self {
        FetchError::CorruptArchive {
            archive: archive.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn unsafe_member(archive: &str, member: &Path, reason: &str) -> Self {
        FetchError::UnsafeArchive {
            archive: archive.to_string(),
            member: member.display().to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FetchError>;

/// Attach the path an I/O operation was working on.
pub(crate) trait FsContext<T> {
    fn fs_context(self, path: &Path) -> Result<T>;
}

impl<T> FsContext<T> for std::io::Result<T> {
    fn fs_context(self, path: &Path) -> Result<T> {
        self.map_err(|source| FetchError::Filesystem {
            path: path.display().to_string(),
            source,
        })
    }
}

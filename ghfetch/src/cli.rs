use clap::Parser;
use std::path::PathBuf;

use crate::error::FetchError;

#[derive(Parser, Debug, Clone)]
#[clap(
    name = "ghfetch",
    version,
    about = "Download assets from the latest GitHub release and unpack them",
    long_about = None
)]
pub struct Args {
    /// Repository to download from
    /// Format: owner/repo (e.g., jpillora/chisel)
    #[clap(value_name = "OWNER/REPO")]
    pub repo: String,

    /// Regex patterns matched against asset names, one asset per pattern
    #[clap(value_name = "PATTERN", required = true, num_args = 1..)]
    pub patterns: Vec<String>,

    /// Destination directory
    #[clap(short, long, default_value = ".")]
    pub output: String,

    /// Names for the downloaded files or extracted folders, in pattern order
    #[clap(short, long, num_args = 1..)]
    pub names: Vec<String>,

    /// Octal permissions for downloaded files, in pattern order (e.g., 0755)
    #[clap(short = 'm', long, num_args = 1..)]
    pub chmod: Vec<String>,

    /// Warn and continue when a pattern matches no asset
    #[clap(long)]
    pub allow_missing: bool,

    /// GitHub token used to avoid rate limiting
    #[clap(short, long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Configuration file path
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// Maximum number of retries for transient network errors
    #[clap(long, default_value_t = 3)]
    pub max_retries: u32,

    /// Disable retries for network operations
    #[clap(long)]
    pub no_retry: bool,

    /// Enable verbose output
    #[clap(long)]
    pub verbose: bool,
}

/// A repository identifier of the form `owner/name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoId {
    pub owner: String,
    pub name: String,
}

impl RepoId {
    pub fn parse(input: &str) -> Result<Self, FetchError> {
        let invalid = || FetchError::InvalidRepo {
            input: input.to_string(),
        };

        let (owner, name) = input.split_once('/').ok_or_else(invalid)?;
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return Err(invalid());
        }

        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }
}

impl std::fmt::Display for RepoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl Args {
    /// Parse the repository argument
    pub fn parse_repo(&self) -> Result<RepoId, FetchError> {
        RepoId::parse(&self.repo)
    }

    /// Get the output directory as PathBuf, expanding ~
    pub fn output_dir(&self) -> PathBuf {
        expand_home(&self.output)
    }
}

/// Expand a leading `~` to the user's home directory
pub fn expand_home(path: &str) -> PathBuf {
    if path.starts_with('~') {
        if let Some(home) = directories::BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf())
        {
            let rest = path.strip_prefix('~').unwrap_or(path);
            let rest = rest.strip_prefix('/').unwrap_or(rest);
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repo_id_parse() {
        let repo = RepoId::parse("WithSecureLabs/chainsaw").unwrap();
        assert_eq!(repo.owner, "WithSecureLabs");
        assert_eq!(repo.name, "chainsaw");
        assert_eq!(repo.to_string(), "WithSecureLabs/chainsaw");
    }

    #[test]
    fn test_repo_id_rejects_malformed() {
        for input in ["chainsaw", "/chainsaw", "owner/", "a/b/c", ""] {
            assert!(
                matches!(RepoId::parse(input), Err(FetchError::InvalidRepo { .. })),
                "expected {input:?} to be rejected"
            );
        }
    }

    #[test]
    fn test_expand_home_leaves_relative_paths() {
        assert_eq!(expand_home("."), PathBuf::from("."));
        assert_eq!(expand_home("/opt/peas"), PathBuf::from("/opt/peas"));
    }
}

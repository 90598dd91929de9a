use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::cli::RepoId;

#[derive(Debug, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub default: DefaultConfig,

    #[serde(default)]
    pub repo: HashMap<String, RepoConfig>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DefaultConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for DefaultConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            timeout: default_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

/// Per-repository defaults, applied when the command line leaves them unset.
#[derive(Debug, Deserialize, Serialize, Default)]
pub struct RepoConfig {
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub chmod: Vec<String>,
    #[serde(default)]
    pub allow_missing: bool,
}

fn default_output_dir() -> String {
    ".".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        directories::BaseDirs::new()
            .map(|dirs| dirs.config_dir().join("ghfetch.toml"))
            .unwrap_or_else(|| PathBuf::from("~/.config/ghfetch.toml"))
    }

    /// Get repository-specific configuration
    pub fn get_repo_config(&self, repo: &RepoId) -> Option<&RepoConfig> {
        self.repo.get(&repo.to_string())
    }

    /// Merge configuration with command line arguments
    pub fn merge_with_args(&self, args: &mut crate::cli::Args, repo: &RepoId) {
        if args.output == "." && self.default.output_dir != "." {
            args.output = self.default.output_dir.clone();
        }

        if args.max_retries == default_max_retries() {
            args.max_retries = self.default.max_retries;
        }

        if let Some(repo_config) = self.get_repo_config(repo) {
            if args.names.is_empty() {
                args.names = repo_config.names.clone();
            }

            if args.chmod.is_empty() {
                args.chmod = repo_config.chmod.clone();
            }

            if !args.allow_missing && repo_config.allow_missing {
                args.allow_missing = true;
            }
        }
    }
}

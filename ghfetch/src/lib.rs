//! # ghfetch
//!
//! Download assets from the latest GitHub release of a repository and
//! unpack them into a local directory.
//!
//! ## Overview
//!
//! `ghfetch` resolves the latest release of `owner/repo` with one API call,
//! selects one asset per regular-expression pattern, downloads each asset
//! into memory, and materializes it in the output directory. Archives are
//! extracted in a private scratch directory first and only their contents
//! are moved into place, so a rejected archive never leaves partial output.
//!
//! ## Features
//!
//! - Zip, tar, tar.gz, tar.bz2 and tar.xz archives, plus single-file `.gz`
//! - Path containment checks for every archive member and link target
//! - Optional output names and octal permissions, aligned by pattern position
//! - `--allow-missing` to skip patterns that match nothing
//! - Retries with exponential backoff for transient network failures
//!
//! ## Usage
//!
//! ```bash
//! # Fetch the Linux build of chisel and make it executable
//! ghfetch jpillora/chisel 'linux_amd64\.gz$' -o tools -n chisel -m 0755
//!
//! # Several assets at once; a missing one is only a warning
//! ghfetch carlospolop/PEASS-ng 'linpeas\.sh$' 'winPEASx64\.exe$' --allow-missing
//! ```
//!
//! ## Configuration
//!
//! Defaults and per-repository settings can be placed in `ghfetch.toml`
//! in the user configuration directory, or passed with `--config`.

/// Command-line interface definitions and argument parsing
pub mod cli;

/// Configuration file handling and repository-specific settings
pub mod config;

/// Error types shared by every stage of a run
pub mod error;

/// Archive detection and extraction into a scratch directory
pub mod extract;

/// GitHub API client for release lookup and asset downloads
pub mod github;

/// Pattern compilation and asset selection
pub mod matcher;

/// Moving extracted content into its final location
pub mod materialize;

/// Octal permission handling for placed files
pub mod permissions;

/// End-to-end orchestration of one fetch
pub mod pipeline;

/// Network retry logic with exponential backoff
pub mod retry;

/// Path containment checks for archive members
pub mod sanitize;

use anyhow::Context;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cli::{Args, RepoId};
use crate::config::Config;
use crate::error::{FetchError, FsContext, Result};
use crate::extract::{self, ScratchDir};
use crate::github::GitHubClient;
use crate::matcher;
use crate::materialize;
use crate::permissions;
use crate::retry::RetryConfig;
use crate::sanitize::is_single_component;

/// Everything one run needs, after configuration has been merged.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub repo: RepoId,
    pub patterns: Vec<String>,
    pub output_dir: PathBuf,
    /// Override names, indexed by pattern position
    pub names: Vec<String>,
    /// Octal chmod values, indexed by pattern position
    pub chmod: Vec<String>,
    pub allow_missing: bool,
}

impl FetchRequest {
    pub fn from_args(args: &Args, repo: RepoId) -> Self {
        Self {
            repo,
            patterns: args.patterns.clone(),
            output_dir: args.output_dir(),
            names: args.names.clone(),
            chmod: args.chmod.clone(),
            allow_missing: args.allow_missing,
        }
    }
}

pub struct Pipeline {
    request: FetchRequest,
    github_client: GitHubClient,
}

impl Pipeline {
    pub fn new(mut args: Args) -> anyhow::Result<Self> {
        // Load configuration
        let config_path = args.config.clone().unwrap_or_else(Config::default_path);
        let config = Config::load(&config_path).context("Failed to load configuration")?;

        let repo = args.parse_repo()?;
        config.merge_with_args(&mut args, &repo);

        let retry_config = if args.no_retry {
            RetryConfig::disabled()
        } else {
            RetryConfig {
                max_retries: args.max_retries,
                ..Default::default()
            }
        };

        let github_client = GitHubClient::new(
            args.token.as_deref(),
            Duration::from_secs(config.default.timeout),
        )
        .context("Failed to create GitHub client")?
        .with_retry_config(retry_config);

        Ok(Self::with_client(
            FetchRequest::from_args(&args, repo),
            github_client,
        ))
    }

    pub fn with_client(request: FetchRequest, github_client: GitHubClient) -> Self {
        Self {
            request,
            github_client,
        }
    }

    /// Resolve, match, then fetch and place each asset in pattern order.
    ///
    /// Returns the materialized path of every asset that was placed.
    pub async fn run(&self) -> Result<Vec<PathBuf>> {
        let request = &self.request;
        self.check_arguments()?;

        tracing::info!(
            "Fetching {} pattern(s) from the latest release of {}",
            request.patterns.len(),
            request.repo
        );

        let release = self.github_client.latest_release(&request.repo).await?;

        // Every pattern is matched before anything is downloaded
        let matched = matcher::match_assets(
            &release.assets,
            &request.patterns,
            request.allow_missing,
            &request.repo.to_string(),
        )?;

        fs::create_dir_all(&request.output_dir).fs_context(&request.output_dir)?;

        let mut placed = Vec::with_capacity(matched.len());
        for m in &matched {
            let buffer = self.github_client.download_asset(&m.asset).await?;
            let name_override = request.names.get(m.pattern_index).map(String::as_str);

            let path = place_asset(&buffer, &m.asset.name, &request.output_dir, name_override)?;

            if let Some(mode) = request.chmod.get(m.pattern_index) {
                permissions::apply_chmod(&path, mode);
            }
            placed.push(path);
        }

        tracing::info!(
            "Placed {} of {} asset(s) in {}",
            placed.len(),
            request.patterns.len(),
            request.output_dir.display()
        );
        Ok(placed)
    }

    fn check_arguments(&self) -> Result<()> {
        let request = &self.request;
        matcher::compile_patterns(&request.patterns)?;

        if let Some(name) = request.names.iter().find(|n| !is_single_component(n)) {
            return Err(FetchError::InvalidName { name: name.clone() });
        }

        if request.names.len() > request.patterns.len() {
            tracing::warn!(
                "{} name(s) given for {} pattern(s); extra names are ignored",
                request.names.len(),
                request.patterns.len()
            );
        }
        if request.chmod.len() > request.patterns.len() {
            tracing::warn!(
                "{} chmod value(s) given for {} pattern(s); extra values are ignored",
                request.chmod.len(),
                request.patterns.len()
            );
        }
        Ok(())
    }
}

/// Unpack one downloaded asset in a scratch directory and move the result
/// into `output_dir`.
///
/// Nothing reaches `output_dir` unless extraction succeeded; the scratch
/// directory is removed on every path out of this function.
pub fn place_asset(
    buffer: &[u8],
    asset_name: &str,
    output_dir: &Path,
    name_override: Option<&str>,
) -> Result<PathBuf> {
    if !is_single_component(asset_name) {
        return Err(FetchError::InvalidName {
            name: asset_name.to_string(),
        });
    }

    let scratch = ScratchDir::new_in(output_dir, asset_name)?;
    extract::unpack(buffer, asset_name, scratch.path())?;
    materialize::promote(&scratch, output_dir, name_override)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn tar_gz(files: &[(&str, &[u8])]) -> Vec<u8> {
        let encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (path, data) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, path, *data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    fn leftovers(dir: &Path) -> Vec<String> {
        fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.starts_with(".ghfetch-"))
            .collect()
    }

    #[test]
    fn test_tarball_with_top_level_directory() {
        let out = tempdir().unwrap();
        let archive = tar_gz(&[("tool-1.2.3/bin/tool", b"bin"), ("tool-1.2.3/README", b"r")]);

        let path = place_asset(&archive, "tool-linux-amd64.tar.gz", out.path(), None).unwrap();
        assert_eq!(path, out.path().join("tool-1.2.3"));
        assert!(path.join("bin/tool").is_file());

        let path =
            place_asset(&archive, "tool-linux-amd64.tar.gz", out.path(), Some("tool")).unwrap();
        assert_eq!(path, out.path().join("tool"));
        assert!(path.join("README").is_file());

        assert!(leftovers(out.path()).is_empty());
    }

    #[test]
    fn test_gzip_single_file_is_suffix_stripped() {
        let out = tempdir().unwrap();
        let mut encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(b"not a tarball").unwrap();
        let data = encoder.finish().unwrap();

        let path = place_asset(&data, "binary.gz", out.path(), None).unwrap();

        assert_eq!(path, out.path().join("binary"));
        assert_eq!(fs::read(&path).unwrap(), b"not a tarball");
    }

    #[test]
    fn test_raw_asset_is_unchanged() {
        let out = tempdir().unwrap();
        let path = place_asset(b"# Read me\n", "README.txt", out.path(), None).unwrap();
        assert_eq!(path, out.path().join("README.txt"));
        assert_eq!(fs::read(&path).unwrap(), b"# Read me\n");
    }

    #[test]
    fn test_raw_asset_with_override() {
        let out = tempdir().unwrap();
        let path = place_asset(b"exe", "winPEASx64.exe", out.path(), Some("winpeas.exe")).unwrap();
        assert_eq!(path, out.path().join("winpeas.exe"));
        assert!(!out.path().join("winPEASx64.exe").exists());
    }

    #[test]
    fn test_failed_extraction_leaves_nothing_behind() {
        let out = tempdir().unwrap();
        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_size(2);
        header.set_cksum();
        builder.append_data(&mut header, "good/file", &b"ok"[..]).unwrap();

        let mut evil = tar::Header::new_old();
        evil.as_old_mut().name[..11].copy_from_slice(b"../evil.txt");
        evil.set_size(4);
        evil.set_mode(0o644);
        evil.set_cksum();
        builder.append(&evil, &b"evil"[..]).unwrap();
        let archive = builder.into_inner().unwrap();

        let result = place_asset(&archive, "evil.tar", out.path(), None);

        assert!(matches!(result, Err(FetchError::UnsafeArchive { .. })));
        assert_eq!(fs::read_dir(out.path()).unwrap().count(), 0);
        assert!(!out.path().parent().unwrap().join("evil.txt").exists());
    }

    #[test]
    fn test_asset_name_with_separator_is_rejected() {
        let out = tempdir().unwrap();
        let result = place_asset(b"x", "../README.txt", out.path(), None);
        assert!(matches!(result, Err(FetchError::InvalidName { .. })));
    }
}

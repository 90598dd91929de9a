use crate::cli::RepoId;
use crate::error::{FetchError, Result as FetchResult};
use crate::retry::{with_retry, RetryConfig};
use anyhow::{Context, Result};
use futures_util::StreamExt;
use octocrab::Octocrab;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

const USER_AGENT: &str = concat!("ghfetch/", env!("CARGO_PKG_VERSION"));

pub struct GitHubClient {
    octocrab: Octocrab,
    http_client: Client,
    retry_config: RetryConfig,
}

impl GitHubClient {
    /// Create a client for api.github.com
    pub fn new(token: Option<&str>, timeout: Duration) -> Result<Self> {
        Self::build(None, token, timeout)
    }

    /// Create a client that talks to an alternative API root (used by tests)
    pub fn with_api_base(api_base: &str, token: Option<&str>, timeout: Duration) -> Result<Self> {
        Self::build(Some(api_base), token, timeout)
    }

    fn build(api_base: Option<&str>, token: Option<&str>, timeout: Duration) -> Result<Self> {
        let mut builder = Octocrab::builder();
        if let Some(api_base) = api_base {
            builder = builder
                .base_uri(api_base)
                .with_context(|| format!("Invalid API base URL: {api_base}"))?;
        }
        if let Some(token) = token {
            builder = builder.personal_token(token.to_string());
        }
        let octocrab = builder.build()?;

        let mut headers = HeaderMap::new();
        if let Some(token) = token {
            tracing::debug!("Adding GitHub token to download requests");
            let mut auth = HeaderValue::from_str(&format!("Bearer {token}"))
                .context("GitHub token contains invalid header characters")?;
            auth.set_sensitive(true);
            headers.insert(AUTHORIZATION, auth);
        }

        let http_client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .connect_timeout(timeout)
            .build()?;

        Ok(Self {
            octocrab,
            http_client,
            retry_config: RetryConfig::default(),
        })
    }

    /// Replace the retry configuration
    pub fn with_retry_config(mut self, retry_config: RetryConfig) -> Self {
        self.retry_config = retry_config;
        self
    }

    /// Fetch the latest release of a repository with a single API call
    pub async fn latest_release(&self, repo: &RepoId) -> FetchResult<Release> {
        let operation_name = format!("Fetching latest release for {repo}");
        let route = format!("/repos/{}/{}/releases/latest", repo.owner, repo.name);
        let octocrab = self.octocrab.clone();

        let release = with_retry(&operation_name, &self.retry_config, || {
            let octocrab = octocrab.clone();
            let route = route.clone();

            async move {
                octocrab
                    .get::<Release, _, ()>(route, None)
                    .await
                    .map_err(anyhow::Error::from)
            }
        })
        .await
        .map_err(|e| {
            tracing::error!("{}: {}", operation_name, e);
            FetchError::Network {
                operation: operation_name.clone(),
                message: format!("{e:#}"),
            }
        })?;

        tracing::info!(
            "Latest release of {} is {} with {} asset(s)",
            repo,
            release.tag_name.as_deref().unwrap_or("<untagged>"),
            release.assets.len()
        );
        Ok(release)
    }

    /// Download an asset fully into memory
    pub async fn download_asset(&self, asset: &Asset) -> FetchResult<Vec<u8>> {
        tracing::info!("Downloading asset: {}", asset.name);

        let operation_name = format!("Downloading {}", asset.name);
        let url = asset.download_url.clone();
        let http_client = self.http_client.clone();

        with_retry(&operation_name, &self.retry_config, || {
            let http_client = http_client.clone();
            let url = url.clone();

            async move {
                let response = http_client.get(&url).send().await?.error_for_status()?;

                let mut buffer = Vec::new();
                let mut stream = response.bytes_stream();
                while let Some(chunk) = stream.next().await {
                    buffer.extend_from_slice(&chunk?);
                }

                Ok(buffer)
            }
        })
        .await
        .map_err(|e| FetchError::Network {
            operation: format!("Downloading {} from {}", asset.name, asset.download_url),
            message: format!("{e:#}"),
        })
    }
}

/// The part of a release response this tool consumes.
#[derive(Debug, Clone, Deserialize)]
pub struct Release {
    #[serde(default)]
    pub tag_name: Option<String>,
    #[serde(default)]
    pub assets: Vec<Asset>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Asset {
    pub name: String,
    #[serde(rename = "browser_download_url")]
    pub download_url: String,
}

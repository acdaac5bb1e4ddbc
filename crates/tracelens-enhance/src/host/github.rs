//! GitHub REST client.
//!
//! The access token is only ever passed to `bearer_auth`; it is never logged
//! or included in errors.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use reqwest::header::{HeaderMap, ACCEPT};
use reqwest::{Client, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

use super::{Blob, Commit, FileContent, HostClientFactory, RateInfo, SourceHost};
use crate::config::GitHubConfig;
use crate::error::HostError;

const GITHUB_JSON: &str = "application/vnd.github+json";
const API_VERSION_HEADER: &str = "X-GitHub-Api-Version";
const API_VERSION: &str = "2022-11-28";
const RATE_REMAINING_HEADER: &str = "x-ratelimit-remaining";
const RATE_RESET_HEADER: &str = "x-ratelimit-reset";

/// The contents endpoint answers with an object for files and an array for
/// directories.
#[derive(Deserialize)]
#[serde(untagged)]
enum ContentsResponse {
    File(RawFile),
    Directory(Vec<serde_json::Value>),
}

#[derive(Deserialize)]
struct RawFile {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    sha: Option<String>,
}

#[derive(Deserialize)]
struct RawBlob {
    content: String,
}

#[derive(Deserialize)]
struct RawCommit {
    sha: String,
}

#[derive(Deserialize)]
struct ApiMessage {
    message: String,
}

/// Authenticated GitHub API client.
#[derive(Debug)]
pub struct GitHubClient {
    client: Client,
    base_url: Url,
    token: SecretString,
}

impl GitHubClient {
    /// Create a client for the configured API root.
    pub fn new(config: &GitHubConfig, token: SecretString) -> Result<Self, HostError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| HostError::Setup(e.to_string()))?;

        let base_url = Url::parse(&config.api_url)
            .map_err(|e| HostError::Setup(format!("invalid API url {}: {e}", config.api_url)))?;
        if base_url.cannot_be_a_base() {
            return Err(HostError::Setup(format!(
                "API url {} cannot be a base",
                config.api_url
            )));
        }

        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    /// Builds `{base}/repos/{owner}/{name}/{segments...}` with every segment
    /// percent-encoded.
    fn repo_url<'a>(
        &self,
        repo: &str,
        segments: impl IntoIterator<Item = &'a str>,
    ) -> Result<Url, HostError> {
        let (owner, name) = repo
            .trim_matches('/')
            .split_once('/')
            .filter(|(owner, name)| !owner.is_empty() && !name.is_empty() && !name.contains('/'))
            .ok_or_else(|| HostError::InvalidRepository(repo.to_owned()))?;

        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| HostError::Setup("API url cannot be a base".to_owned()))?
            .pop_if_empty()
            .extend(["repos", owner, name])
            .extend(segments);
        Ok(url)
    }

    async fn get(&self, url: Url) -> Result<(Response, RateInfo), HostError> {
        let response = self
            .client
            .get(url.clone())
            .bearer_auth(self.token.expose_secret())
            .header(ACCEPT, GITHUB_JSON)
            .header(API_VERSION_HEADER, API_VERSION)
            .send()
            .await
            .map_err(|source| HostError::Request {
                url: url.to_string(),
                source,
            })?;

        let rate = rate_info(response.headers());
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiMessage>(&body)
                .map(|m| m.message)
                .unwrap_or(body);
            return Err(HostError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                message,
                rate,
            });
        }

        Ok((response, rate))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<(T, RateInfo), HostError> {
        let (response, rate) = self.get(url.clone()).await?;
        let body = response.json::<T>().await.map_err(|e| HostError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        Ok((body, rate))
    }
}

#[async_trait]
impl SourceHost for GitHubClient {
    async fn file_content(
        &self,
        repo: &str,
        path: &str,
        revision: &str,
    ) -> Result<Option<FileContent>, HostError> {
        let mut url = self.repo_url(repo, ["contents"])?;
        url.path_segments_mut()
            .map_err(|()| HostError::Setup("API url cannot be a base".to_owned()))?
            .extend(path.trim_start_matches('/').split('/'));
        url.query_pairs_mut().append_pair("ref", revision);

        let (body, rate) = self.get_json::<ContentsResponse>(url).await?;
        match body {
            ContentsResponse::File(file) => Ok(Some(FileContent {
                content: file.content.unwrap_or_default(),
                sha: file.sha,
                rate,
            })),
            ContentsResponse::Directory(_) => Ok(None),
        }
    }

    async fn blob(&self, repo: &str, sha: &str) -> Result<Blob, HostError> {
        let url = self.repo_url(repo, ["git", "blobs", sha])?;
        let (body, rate) = self.get_json::<RawBlob>(url).await?;
        Ok(Blob {
            content: body.content,
            rate,
        })
    }

    async fn latest_commit(&self, repo: &str) -> Result<Commit, HostError> {
        let mut url = self.repo_url(repo, ["commits"])?;
        url.query_pairs_mut().append_pair("per_page", "1");

        let (commits, rate) = self.get_json::<Vec<RawCommit>>(url).await?;
        commits
            .into_iter()
            .next()
            .map(|c| Commit { sha: c.sha, rate })
            .ok_or_else(|| HostError::NoCommits(repo.to_owned()))
    }
}

fn rate_info(headers: &HeaderMap) -> RateInfo {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    RateInfo {
        remaining: header(RATE_REMAINING_HEADER).and_then(|v| v.trim().parse().ok()),
        reset_at: header(RATE_RESET_HEADER)
            .and_then(|v| v.trim().parse::<i64>().ok())
            .and_then(|secs| DateTime::from_timestamp(secs, 0)),
    }
}

/// Builds [`GitHubClient`]s for one API root.
#[derive(Debug, Clone)]
pub struct GitHubClientFactory {
    config: GitHubConfig,
}

impl GitHubClientFactory {
    pub const fn new(config: GitHubConfig) -> Self {
        Self { config }
    }
}

impl HostClientFactory for GitHubClientFactory {
    fn connect(&self, token: &SecretString) -> Result<Arc<dyn SourceHost>, HostError> {
        let token = SecretString::from(token.expose_secret().to_owned());
        Ok(Arc::new(GitHubClient::new(&self.config, token)?))
    }
}

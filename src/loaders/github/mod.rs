
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::{StreamExt, TryStreamExt, stream};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;

use super::{Document, DocumentSource, has_extension};
use crate::config::{FilterType, GithubConfig};
use crate::http::{RetryPolicy, agent_with_timeout, send_with_retry};

const GITHUB_JSON: &str = "application/vnd.github+json";
const GITHUB_RAW: &str = "application/vnd.github.raw+json";
const GITHUB_API_VERSION: &str = "2022-11-28";

/// Minimal GitHub REST client for reading repository trees and file contents
#[derive(Clone)]
pub struct GithubClient {
    api_url: Url,
    token: Option<String>,
    agent: ureq::Agent,
    retry: RetryPolicy,
}

impl std::fmt::Debug for GithubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GithubClient")
            .field("api_url", &self.api_url.as_str())
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("retry", &self.retry)
            .finish()
    }
}

/// Response of `GET /repos/{owner}/{repo}/git/trees/{tree_sha}?recursive=1`
#[derive(Debug, Clone, Deserialize)]
pub struct GitTree {
    pub sha: String,
    pub tree: Vec<TreeEntry>,
    #[serde(default)]
    pub truncated: bool,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct TreeEntry {
    pub path: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub sha: String,
    #[serde(default)]
    pub size: Option<u64>,
}

impl TreeEntry {
    #[inline]
    pub fn is_blob(&self) -> bool {
        self.kind == "blob"
    }
}

impl GithubClient {
    #[inline]
    pub fn new(api_url: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
        let api_url =
            Url::parse(api_url).with_context(|| format!("Invalid GitHub API URL: {}", api_url))?;

        Ok(Self {
            api_url,
            token: token.filter(|t| !t.trim().is_empty()),
            agent: agent_with_timeout(timeout),
            retry: RetryPolicy::default(),
        })
    }

    /// Build a client from config, reading the token from `config.token_env`
    #[inline]
    pub fn from_config(config: &GithubConfig) -> Result<Self> {
        let token = std::env::var(&config.token_env).ok();
        if token.is_none() {
            warn!(
                "{} is not set, GitHub requests are unauthenticated and heavily rate limited",
                config.token_env
            );
        }
        Self::new(
            &config.api_url,
            token,
            Duration::from_secs(config.timeout_secs),
        )
    }

    #[inline]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[inline]
    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    /// List every entry of `branch`, recursively
    #[inline]
    pub fn get_tree(&self, owner: &str, repo: &str, branch: &str) -> Result<GitTree> {
        let mut url = self.endpoint(&["repos", owner, repo, "git", "trees", branch])?;
        url.query_pairs_mut().append_pair("recursive", "1");

        debug!("Fetching tree from {}", url);

        let body = send_with_retry(url.as_str(), self.retry, || {
            self.authorized(self.agent.get(url.as_str()))
                .header("Accept", GITHUB_JSON)
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
        .with_context(|| format!("Failed to fetch tree for {}/{}@{}", owner, repo, branch))?;

        let tree: GitTree =
            serde_json::from_str(&body).context("Failed to parse GitHub tree response")?;

        debug!("Tree {} has {} entries", tree.sha, tree.tree.len());
        Ok(tree)
    }

    /// Raw contents of `path` at `branch`, decoded lossily as UTF-8
    #[inline]
    pub fn get_file_contents(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        branch: &str,
    ) -> Result<String> {
        let mut segments = vec!["repos", owner, repo, "contents"];
        segments.extend(path.split('/').filter(|s| !s.is_empty()));
        let mut url = self.endpoint(&segments)?;
        url.query_pairs_mut().append_pair("ref", branch);

        debug!("Fetching file {}", url);

        let bytes = send_with_retry(url.as_str(), self.retry, || {
            self.authorized(self.agent.get(url.as_str()))
                .header("Accept", GITHUB_RAW)
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_vec())
        })
        .with_context(|| format!("Failed to fetch {} from {}/{}", path, owner, repo))?;

        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|()| anyhow::anyhow!("GitHub API URL cannot be a base: {}", self.api_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorized<B>(&self, request: ureq::RequestBuilder<B>) -> ureq::RequestBuilder<B> {
        let request = request.header("X-GitHub-Api-Version", GITHUB_API_VERSION);
        match &self.token {
            Some(token) => request.header("Authorization", &format!("Bearer {}", token)),
            None => request,
        }
    }
}

/// Directory and extension filters applied to repository paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryFilter {
    pub directories: Vec<String>,
    pub directory_filter: FilterType,
    pub extensions: Vec<String>,
    pub extension_filter: FilterType,
}

impl RepositoryFilter {
    #[inline]
    pub fn from_config(config: &GithubConfig) -> Self {
        Self {
            directories: config.directories.clone(),
            directory_filter: config.directory_filter,
            extensions: config.extensions.clone(),
            extension_filter: config.extension_filter,
        }
    }

    /// An empty list never filters anything out
    #[inline]
    pub fn matches(&self, path: &str) -> bool {
        let directory_ok = if self.directories.is_empty() {
            true
        } else {
            let inside = self.directories.iter().any(|dir| {
                let dir = dir.trim_matches('/');
                dir.is_empty()
                    || path == dir
                    || path
                        .strip_prefix(dir)
                        .is_some_and(|rest| rest.starts_with('/'))
            });
            match self.directory_filter {
                FilterType::Include => inside,
                FilterType::Exclude => !inside,
            }
        };

        let extension_ok = if self.extensions.is_empty() {
            true
        } else {
            let listed = has_extension(path, &self.extensions);
            match self.extension_filter {
                FilterType::Include => listed,
                FilterType::Exclude => !listed,
            }
        };

        directory_ok && extension_ok
    }
}

/// Loads filtered files of one repository as documents
#[derive(Debug, Clone)]
pub struct GithubRepositoryLoader {
    client: Arc<GithubClient>,
    owner: String,
    repo: String,
    filter: RepositoryFilter,
    concurrent_requests: usize,
    show_progress: bool,
}

impl GithubRepositoryLoader {
    #[inline]
    pub fn new(client: GithubClient, owner: &str, repo: &str, filter: RepositoryFilter) -> Self {
        Self {
            client: Arc::new(client),
            owner: owner.to_string(),
            repo: repo.to_string(),
            filter,
            concurrent_requests: 10,
            show_progress: console::user_attended_stderr(),
        }
    }

    #[inline]
    pub fn from_config(config: &GithubConfig) -> Result<Self> {
        let client = GithubClient::from_config(config)?;
        Ok(
            Self::new(client, &config.owner, &config.repo, RepositoryFilter::from_config(config))
                .with_concurrent_requests(config.concurrent_requests),
        )
    }

    #[inline]
    pub fn with_concurrent_requests(mut self, concurrent_requests: usize) -> Self {
        self.concurrent_requests = concurrent_requests.max(1);
        self
    }

    #[inline]
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Paths on `branch` that pass the filter, sorted
    #[inline]
    pub async fn list_files(&self, branch: &str) -> Result<Vec<String>> {
        let client = Arc::clone(&self.client);
        let (owner, repo, branch_name) = (self.owner.clone(), self.repo.clone(), branch.to_string());
        let tree = tokio::task::spawn_blocking(move || client.get_tree(&owner, &repo, &branch_name))
            .await
            .context("Tree listing task failed")??;

        if tree.truncated {
            warn!(
                "GitHub truncated the tree listing for {}/{}@{}, some files will be missing",
                self.owner, self.repo, branch
            );
        }

        let mut paths: Vec<String> = tree
            .tree
            .into_iter()
            .filter(|entry| entry.is_blob() && self.filter.matches(&entry.path))
            .map(|entry| entry.path)
            .collect();
        paths.sort();

        Ok(paths)
    }

    /// Fetch every matching file on `branch`
    #[inline]
    pub async fn load_data(&self, branch: &str) -> Result<Vec<Document>> {
        let paths = self.list_files(branch).await?;
        info!(
            "Loading {} files from {}/{}@{}",
            paths.len(),
            self.owner,
            self.repo,
            branch
        );

        let bar = if self.show_progress {
            ProgressBar::new(paths.len() as u64).with_style(
                ProgressStyle::with_template("{spinner} [{pos}/{len}] Fetching {msg}")
                    .expect("style template is valid"),
            )
        } else {
            ProgressBar::hidden()
        };
        bar.set_message(format!("{}/{}", self.owner, self.repo));

        let source = DocumentSource::Github {
            owner: self.owner.clone(),
            repo: self.repo.clone(),
            branch: branch.to_string(),
        };

        let mut documents: Vec<Document> = stream::iter(paths)
            .map(|path| {
                let client = Arc::clone(&self.client);
                let source = source.clone();
                let (owner, repo, branch) =
                    (self.owner.clone(), self.repo.clone(), branch.to_string());
                async move {
                    tokio::task::spawn_blocking(move || {
                        let text = client.get_file_contents(&owner, &repo, &path, &branch)?;
                        Ok::<_, anyhow::Error>(Document::new(&path, text, source))
                    })
                    .await
                    .context("File fetch task failed")?
                }
            })
            .buffer_unordered(self.concurrent_requests)
            .inspect_ok(|doc| {
                bar.inc(1);
                debug!("Fetched {} ({} bytes)", doc.metadata.file_path, doc.text.len());
            })
            .try_collect()
            .await?;

        bar.finish_and_clear();

        documents.sort_by(|a, b| a.metadata.file_path.cmp(&b.metadata.file_path));
        info!("Loaded {} documents from GitHub", documents.len());
        Ok(documents)
    }
}

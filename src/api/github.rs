//! GitHub releases API client, used as the public fallback channel.
//!
//! Only the fields the artifact locator needs are deserialized:
//!
//! ```json
//! [{"tag_name": "v1.2.0", "name": "...", "body": "...", "prerelease": false,
//!   "assets": [{"name": "...", "size": 123, "browser_download_url": "..."}]}]
//! ```

use crate::libs::http::{Transport, TransportError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

pub const GITHUB_API_URL: &str = "https://api.github.com";
pub const GITHUB_URL: &str = "https://github.com";

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct GitHubRelease {
    pub tag_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub assets: Vec<GitHubAsset>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct GitHubAsset {
    pub name: String,
    #[serde(default)]
    pub size: u64,
    pub browser_download_url: String,
}

#[derive(Debug, Error)]
pub enum GitHubError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("GitHub API error for {url}: HTTP {status}")]
    Api { url: String, status: u16 },
    #[error("malformed release list from {url}: {detail}")]
    Malformed { url: String, detail: String },
}

/// An `owner/repository` pair on GitHub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    pub owner: String,
    pub name: String,
}

impl Repository {
    /// Parses `https://github.com/owner/repo(.git)`, `git@github.com:owner/repo`
    /// or a bare `owner/repo`.
    pub fn parse(url: &str) -> Option<Self> {
        let url = url.trim().trim_end_matches('/');
        let path = if let Some(rest) = url.strip_prefix("git@github.com:") {
            rest
        } else if let Some(idx) = url.find("github.com/") {
            &url[idx + "github.com/".len()..]
        } else if url.contains("://") {
            return None;
        } else {
            url
        };

        let mut segments = path.split('/').filter(|s| !s.is_empty());
        let owner = segments.next()?;
        let name = segments.next()?.trim_end_matches(".git");
        if owner.is_empty() || name.is_empty() {
            return None;
        }
        Some(Self {
            owner: owner.to_owned(),
            name: name.to_owned(),
        })
    }

    pub fn releases_url(&self, api_base: &str) -> String {
        format!("{}/repos/{}/{}/releases", api_base.trim_end_matches('/'), self.owner, self.name)
    }

    pub fn download_url(&self, tag: &str, file_name: &str) -> String {
        format!("{}/{}/{}/releases/download/{}/{}", GITHUB_URL, self.owner, self.name, tag, file_name)
    }
}

pub struct GitHub {
    transport: Arc<dyn Transport>,
    api_base: String,
}

impl GitHub {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            api_base: GITHUB_API_URL.to_owned(),
        }
    }

    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.to_owned();
        self
    }

    pub async fn releases(&self, repo: &Repository) -> Result<Vec<GitHubRelease>, GitHubError> {
        let url = repo.releases_url(&self.api_base);
        let res = self.transport.get_text(&url, &[("per_page", "30".to_string())]).await?;
        if !res.is_success() {
            return Err(GitHubError::Api { url, status: res.status });
        }
        serde_json::from_str(&res.body).map_err(|e| GitHubError::Malformed {
            url,
            detail: e.to_string(),
        })
    }

    pub async fn probe(&self, url: &str) -> Result<Option<u64>, TransportError> {
        Ok(self.transport.probe(url).await?.content_length)
    }
}

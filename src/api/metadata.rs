//! Client for the licensed release metadata service.
//!
//! Each endpoint serves `GET {endpoint}/resources/{resource_id}/latest` with
//! the query parameters `current_version`, `user_agent`, `channel`, `os`,
//! `arch` and an optional `cdk` credential. The answer is always a JSON
//! envelope `{code, msg, data?}`; a non-zero `code` is an application-level
//! refusal (expired key, unknown resource, ...) that may still carry the
//! latest version number.

use crate::libs::http::{Transport, TransportError};
use crate::libs::release::Channel;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;

/// Application code for a successful answer.
pub const CODE_OK: i64 = 0;

#[derive(Debug, Deserialize)]
pub struct MetadataEnvelope {
    pub code: i64,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub data: Option<MetadataData>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MetadataData {
    #[serde(default)]
    pub version_name: Option<String>,
    #[serde(default)]
    pub version_number: Option<u64>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub sha256: Option<String>,
    #[serde(default)]
    pub release_note: Option<String>,
    #[serde(default)]
    pub update_type: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub filesize: Option<u64>,
}

impl MetadataEnvelope {
    pub fn is_success(&self) -> bool {
        self.code == CODE_OK
    }

    /// Remote version name, if the endpoint disclosed one.
    pub fn version_name(&self) -> Option<&str> {
        self.data
            .as_ref()
            .and_then(|d| d.version_name.as_deref())
            .filter(|v| !v.trim().is_empty())
    }
}

/// Everything one metadata request needs.
#[derive(Debug, Clone)]
pub struct MetadataQuery {
    pub resource_id: String,
    pub current_version: String,
    pub cdk: Option<String>,
    pub channel: Channel,
    pub user_agent: String,
    pub os: String,
    pub arch: String,
}

impl MetadataQuery {
    pub fn url(&self, endpoint: &str) -> String {
        format!("{}/resources/{}/latest", endpoint.trim_end_matches('/'), self.resource_id)
    }

    pub fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("current_version", self.current_version.clone()),
            ("user_agent", self.user_agent.clone()),
            ("channel", self.channel.to_string()),
            ("os", self.os.clone()),
            ("arch", self.arch.clone()),
        ];
        if let Some(cdk) = self.cdk.as_deref().filter(|c| !c.is_empty()) {
            params.push(("cdk", cdk.to_owned()));
        }
        params
    }
}

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("malformed metadata response from {url} (HTTP {status}): {detail}")]
    Malformed { url: String, status: u16, detail: String },
}

pub struct MetadataClient {
    transport: Arc<dyn Transport>,
}

impl MetadataClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Queries one endpoint. Application-level refusals come back as `Ok`.
    pub async fn latest(&self, endpoint: &str, query: &MetadataQuery) -> Result<MetadataEnvelope, MetadataError> {
        let url = query.url(endpoint);
        let res = self.transport.get_text(&url, &query.params()).await?;

        serde_json::from_str::<MetadataEnvelope>(&res.body).map_err(|e| MetadataError::Malformed {
            url,
            status: res.status,
            detail: e.to_string(),
        })
    }
}

//! Release metadata shared by the resolver, locator and orchestrator.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Release track a version was published on.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    #[default]
    Stable,
    Beta,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Stable => f.write_str("stable"),
            Channel::Beta => f.write_str("beta"),
        }
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stable" => Ok(Channel::Stable),
            "beta" => Ok(Channel::Beta),
            other => Err(format!("unknown channel '{}'", other)),
        }
    }
}

/// Package flavour. Only known for sure once the artifact is extracted.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UpdateType {
    Incremental,
    Full,
}

impl UpdateType {
    /// Lenient parse of the metadata `update_type` field.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "incremental" => Some(UpdateType::Incremental),
            "full" => Some(UpdateType::Full),
            _ => None,
        }
    }
}

impl fmt::Display for UpdateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateType::Incremental => f.write_str("incremental"),
            UpdateType::Full => f.write_str("full"),
        }
    }
}

/// Which resolver path produced the download URL.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DownloadSource {
    /// Licensed metadata endpoint.
    #[default]
    Primary,
    /// Public source-hosting release channel.
    Secondary,
}

/// Metadata of the candidate version from one check.
///
/// A record can say "no update", "update with a link" or "update exists but the
/// endpoint declined to issue a link" (`error_code` set). [`ReleaseInfo::status`]
/// gives the tagged view of that union.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ReleaseInfo {
    pub version_name: String,
    pub release_note: String,
    pub channel: Channel,
    pub has_update: bool,
    pub download_url: Option<String>,
    pub file_size: Option<u64>,
    pub filename: Option<String>,
    pub update_type: Option<UpdateType>,
    pub sha256: Option<String>,
    pub download_source: DownloadSource,
    pub error_code: Option<i64>,
    pub error_message: Option<String>,
}

/// Tagged reading of a [`ReleaseInfo`].
#[derive(Debug, Clone, PartialEq)]
pub enum ReleaseStatus<'a> {
    UpToDate,
    Downloadable { url: &'a str },
    NotEntitled { code: i64, message: &'a str },
    Unlinked,
}

impl ReleaseInfo {
    pub fn status(&self) -> ReleaseStatus<'_> {
        if !self.has_update {
            return ReleaseStatus::UpToDate;
        }
        if let Some(url) = self.download_url.as_deref().filter(|u| !u.is_empty()) {
            return ReleaseStatus::Downloadable { url };
        }
        match self.error_code {
            Some(code) => ReleaseStatus::NotEntitled {
                code,
                message: self.error_message.as_deref().unwrap_or_default(),
            },
            None => ReleaseStatus::Unlinked,
        }
    }

    /// Filename to save the artifact under, falling back to the URL's last segment.
    pub fn artifact_name(&self) -> String {
        if let Some(name) = self.filename.as_deref().filter(|n| !n.is_empty()) {
            return name.to_string();
        }
        self.download_url
            .as_deref()
            .and_then(|url| url.split(['?', '#']).next())
            .and_then(|path| path.rsplit('/').next())
            .filter(|segment| segment.contains('.'))
            .map(|segment| segment.to_string())
            .unwrap_or_else(|| format!("update-{}.zip", self.version_name.trim_start_matches('v')))
    }
}

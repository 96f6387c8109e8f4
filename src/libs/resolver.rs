//! Version resolver: asks the metadata endpoints for the latest release and
//! decides whether it is newer than the running version.
//!
//! Endpoints are tried in their configured order. The first well-formed answer
//! with a success code wins. Transport failures and application refusals are
//! logged and the next endpoint is tried. Only when every endpoint failed at
//! the transport level does the check return `None` ("could not check");
//! a refusal that still discloses a version yields a [`ReleaseInfo`] carrying
//! both the comparison result and the refusal code.

use crate::api::metadata::{MetadataClient, MetadataEnvelope, MetadataQuery};
use crate::libs::http::Transport;
use crate::libs::platform;
use crate::libs::release::{Channel, DownloadSource, ReleaseInfo, UpdateType};
use crate::libs::version;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Inputs of one check.
#[derive(Debug, Clone)]
pub struct CheckRequest {
    pub resource_id: String,
    pub current_version: String,
    pub credential: Option<String>,
    pub channel: Channel,
    pub user_agent: String,
}

pub struct VersionResolver {
    client: MetadataClient,
    endpoints: Vec<String>,
}

impl VersionResolver {
    pub fn new(transport: Arc<dyn Transport>, endpoints: Vec<String>) -> Self {
        Self {
            client: MetadataClient::new(transport),
            endpoints,
        }
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    pub async fn check_for_update(&self, request: &CheckRequest) -> Option<ReleaseInfo> {
        let query = MetadataQuery {
            resource_id: request.resource_id.clone(),
            current_version: request.current_version.clone(),
            cdk: request.credential.clone(),
            channel: request.channel,
            user_agent: request.user_agent.clone(),
            os: platform::os_name().to_owned(),
            arch: platform::arch_name().to_owned(),
        };

        let mut refusal: Option<MetadataEnvelope> = None;
        for endpoint in &self.endpoints {
            debug!(endpoint = %endpoint, "querying release metadata");
            match self.client.latest(endpoint, &query).await {
                Ok(envelope) if envelope.is_success() => {
                    info!(endpoint = %endpoint, version = envelope.version_name(), "release metadata received");
                    return Some(build_release(envelope, request));
                }
                Ok(envelope) => {
                    warn!(endpoint = %endpoint, code = envelope.code, msg = %envelope.msg, "metadata endpoint refused");
                    // keep the first refusal that discloses a version
                    let better = match &refusal {
                        None => true,
                        Some(kept) => kept.version_name().is_none() && envelope.version_name().is_some(),
                    };
                    if better {
                        refusal = Some(envelope);
                    }
                }
                Err(e) => warn!(endpoint = %endpoint, error = %e, "metadata endpoint unreachable"),
            }
        }

        refusal.map(|envelope| build_release(envelope, request))
    }
}

fn build_release(envelope: MetadataEnvelope, request: &CheckRequest) -> ReleaseInfo {
    let success = envelope.is_success();
    let remote_version = envelope.version_name().map(str::to_owned);
    let has_update = remote_version
        .as_deref()
        .map(|remote| version::is_newer(remote, &request.current_version))
        .unwrap_or(false);
    let data = envelope.data.unwrap_or_default();

    ReleaseInfo {
        version_name: remote_version.unwrap_or_else(|| request.current_version.clone()),
        release_note: data.release_note.unwrap_or_default(),
        channel: data
            .channel
            .as_deref()
            .and_then(|c| c.parse().ok())
            .unwrap_or(request.channel),
        has_update,
        download_url: data.url.filter(|u| success && !u.trim().is_empty()),
        file_size: data.filesize.filter(|size| *size > 0),
        filename: None,
        update_type: data.update_type.as_deref().and_then(UpdateType::parse),
        sha256: data.sha256.filter(|h| !h.trim().is_empty()),
        download_source: DownloadSource::Primary,
        error_code: (!success).then_some(envelope.code),
        error_message: (!success).then_some(envelope.msg),
    }
}

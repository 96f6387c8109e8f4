//! Artifact locator: finds a downloadable artifact on the public release
//! channel when the licensed endpoint disclosed a newer version but no link.
//!
//! The lookup fails closed: an unparsable repository URL, a missing release
//! or a release without a matching asset all yield `None`. Only when the
//! release list itself cannot be fetched does the locator guess direct
//! download URLs from the `{project}-{os}-{arch}-{tag}{ext}` template and
//! probe them one by one.

use crate::api::github::{GitHub, GitHubAsset, GitHubRelease, Repository};
use crate::libs::http::Transport;
use crate::libs::platform;
use crate::libs::release::ReleaseInfo;
use crate::libs::version;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A concrete artifact on the public channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedArtifact {
    pub url: String,
    pub size: Option<u64>,
    pub filename: String,
}

/// Target platform and naming hints for asset matching.
#[derive(Debug, Clone)]
pub struct AssetQuery {
    pub os: String,
    pub arch: String,
    /// Product short identifier preferred among several matches.
    pub short_name: Option<String>,
}

impl AssetQuery {
    pub fn host(short_name: Option<String>) -> Self {
        Self {
            os: platform::os_name().to_owned(),
            arch: platform::arch_name().to_owned(),
            short_name,
        }
    }
}

pub struct ArtifactLocator {
    github: GitHub,
    assets: AssetQuery,
}

impl ArtifactLocator {
    pub fn new(transport: Arc<dyn Transport>, assets: AssetQuery) -> Self {
        Self {
            github: GitHub::new(transport),
            assets,
        }
    }

    pub fn with_github(github: GitHub, assets: AssetQuery) -> Self {
        Self { github, assets }
    }

    pub async fn resolve_download(
        &self,
        release: &ReleaseInfo,
        repository_url: Option<&str>,
        project_name: Option<&str>,
    ) -> Option<LocatedArtifact> {
        let repo = repository_url.and_then(Repository::parse)?;
        let target = &release.version_name;

        match self.github.releases(&repo).await {
            Ok(releases) => {
                let Some(found) = find_release(&releases, target) else {
                    info!(tag = %target, "no public release matches the target version");
                    return None;
                };
                let asset = select_asset(&found.assets, &self.assets)?;
                debug!(asset = %asset.name, "matched release asset");
                Some(LocatedArtifact {
                    url: asset.browser_download_url.clone(),
                    size: (asset.size > 0).then_some(asset.size),
                    filename: asset.name.clone(),
                })
            }
            Err(e) => {
                warn!(error = %e, "release list unavailable");
                let project = project_name.filter(|p| !p.is_empty())?;
                self.probe_candidates(&repo, project, target).await
            }
        }
    }

    async fn probe_candidates(&self, repo: &Repository, project: &str, version: &str) -> Option<LocatedArtifact> {
        for (tag, filename) in candidate_names(project, &self.assets.os, &self.assets.arch, version) {
            let url = repo.download_url(&tag, &filename);
            match self.github.probe(&url).await {
                Ok(size) => {
                    info!(url = %url, "direct download candidate responded");
                    return Some(LocatedArtifact { url, size, filename });
                }
                Err(e) => debug!(url = %url, error = %e, "candidate not available"),
            }
        }
        None
    }
}

/// Case-insensitive tag match after dropping a leading `v` on both sides.
pub fn find_release<'a>(releases: &'a [GitHubRelease], version_name: &str) -> Option<&'a GitHubRelease> {
    let wanted = version::normalize(version_name).to_lowercase();
    releases
        .iter()
        .find(|release| version::normalize(&release.tag_name).to_lowercase() == wanted)
}

/// Picks the asset for the host platform.
///
/// An asset qualifies when its name has an OS alias and an architecture alias
/// as whole tokens (`darwin` is not `win`, `x86_64` is not `x86`). Among several, the one containing the short name wins, otherwise the
/// largest; equal sizes keep the first encountered.
pub fn select_asset<'a>(assets: &'a [GitHubAsset], query: &AssetQuery) -> Option<&'a GitHubAsset> {
    let os_aliases = platform::os_aliases(&query.os);
    let arch_aliases = platform::arch_aliases(&query.arch);

    let matches: Vec<&GitHubAsset> = assets
        .iter()
        .filter(|asset| {
            let tokens = platform::name_tokens(&asset.name);
            platform::has_alias_token(&tokens, os_aliases) && platform::has_alias_token(&tokens, arch_aliases)
        })
        .collect();

    if let Some(short) = query.short_name.as_deref().map(str::to_lowercase).filter(|s| !s.is_empty()) {
        if let Some(named) = matches.iter().find(|asset| asset.name.to_lowercase().contains(&short)) {
            return Some(*named);
        }
    }

    matches
        .into_iter()
        .fold(None, |best: Option<&GitHubAsset>, asset| match best {
            Some(current) if current.size >= asset.size => Some(current),
            _ => Some(asset),
        })
}

/// `(tag, filename)` pairs for the direct-download template, in probing order.
pub fn candidate_names(project: &str, os: &str, arch: &str, version: &str) -> Vec<(String, String)> {
    let bare = version::normalize(version);
    let mut tags = vec![version.trim().to_owned()];
    for alt in [format!("v{}", bare), bare.to_owned()] {
        if !tags.contains(&alt) {
            tags.push(alt);
        }
    }

    let mut names = Vec::new();
    for tag in &tags {
        for ext in platform::artifact_extensions(os) {
            names.push((tag.clone(), format!("{}-{}-{}-{}{}", project, os, arch, tag, ext)));
        }
    }
    names
}

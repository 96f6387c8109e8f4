//! Update orchestrator.
//!
//! Drives check → download → install for one application instance and owns
//! the in-memory state of the current attempt. It is the only caller of the
//! state store and enforces "one install at a time".
//!
//! ## Check
//!
//! [`Orchestrator::check_and_prepare`] never calls the public release channel
//! when the licensed endpoint reported an error code: the refusal is surfaced
//! as [`CheckOutcome::NotEntitled`]. Only a newer version without a link and
//! without an error goes through the artifact locator.
//!
//! ## Download
//!
//! The configured proxy applies to artifacts located on the public channel
//! only. The persisted [`PendingUpdate`] always records the path the download
//! manager actually wrote, which can differ from the requested one.
//!
//! ## Install
//!
//! Archives are installed in place and followed by an optional relaunch.
//! Platform installers (`.exe`, `.msi`, `.dmg`, `.pkg`) are handed off to a
//! detached process; the completion record then asks the next startup to
//! verify the version actually changed.

use crate::libs::download::{DownloadManager, DownloadOutcome, DownloadRequest, DownloadTask, SessionProgress};
use crate::libs::error::{UpdateError, UpdateResult};
use crate::libs::fs_ops::{FileOps, StdFileOps};
use crate::libs::http::Transport;
use crate::libs::installer::{InstallOutcome, Installer};
use crate::libs::locator::{ArtifactLocator, AssetQuery};
use crate::libs::platform;
use crate::libs::process::ProcessControl;
use crate::libs::release::{Channel, DownloadSource, ReleaseInfo, ReleaseStatus, UpdateType};
use crate::libs::resolver::{CheckRequest, VersionResolver};
use crate::libs::state::{PendingUpdate, UpdateComplete, UpdateStateStore};
use crate::libs::version;
use chrono::Utc;
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Everything the orchestrator needs to know about the running application.
#[derive(Debug, Clone)]
pub struct UpdateSettings {
    pub resource_id: String,
    pub current_version: String,
    pub channel: Channel,
    pub credential: Option<String>,
    pub user_agent: String,
    pub endpoints: Vec<String>,
    pub repository_url: Option<String>,
    pub project_name: Option<String>,
    pub short_name: Option<String>,
    pub proxy: Option<String>,
    pub install_dir: PathBuf,
    pub download_dir: PathBuf,
    pub retention_dir: PathBuf,
    pub state_dir: PathBuf,
    pub relaunch: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Downloading(u64),
    Installing,
}

/// Result of a check.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckOutcome {
    /// Development build; no endpoint was contacted.
    Suppressed,
    UpToDate(ReleaseInfo),
    /// Newer version with a download link.
    Available(ReleaseInfo),
    /// Newer version, but the endpoint declined to issue a link.
    NotEntitled(ReleaseInfo),
    /// Newer version, and no artifact could be located anywhere.
    Unlinked(ReleaseInfo),
}

impl CheckOutcome {
    pub fn release(&self) -> Option<&ReleaseInfo> {
        match self {
            CheckOutcome::Suppressed => None,
            CheckOutcome::UpToDate(r)
            | CheckOutcome::Available(r)
            | CheckOutcome::NotEntitled(r)
            | CheckOutcome::Unlinked(r) => Some(r),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallReport {
    Installed { mode: UpdateType, relaunched: bool },
    InstallerLaunched { pid: u32 },
    /// Install directory untouched; the new version was placed at `path`.
    FallbackRecovered { path: PathBuf, cause: String },
}

/// What the previous run left for this one.
#[derive(Debug, Clone, PartialEq)]
pub enum StartupNotice {
    Completed(UpdateComplete),
    /// An external installer ran but the version did not change.
    InstallerUnconfirmed(UpdateComplete),
    PendingInstall(PendingUpdate),
}

/// A running download that persists its [`PendingUpdate`] when it finishes.
pub struct UpdateDownload {
    task: DownloadTask,
    release: ReleaseInfo,
    state: UpdateStateStore,
}

impl UpdateDownload {
    pub fn session_id(&self) -> u64 {
        self.task.session_id()
    }

    pub fn take_progress(&mut self) -> Option<SessionProgress> {
        self.task.take_progress()
    }

    pub async fn wait(self) -> UpdateResult<PendingUpdate> {
        let outcome: DownloadOutcome = self.task.wait().await?;
        let pending = PendingUpdate {
            version_name: self.release.version_name.clone(),
            release_note: self.release.release_note.clone(),
            channel: self.release.channel,
            downloaded_artifact_path: outcome.actual_path,
            file_size: Some(outcome.bytes),
            update_type: self.release.update_type,
            download_source: self.release.download_source,
            timestamp: Utc::now(),
        };
        self.state.save_pending(&pending)?;
        info!(version = %pending.version_name, path = %pending.downloaded_artifact_path.display(), "update ready to install");
        Ok(pending)
    }
}

struct InstallLease<'a>(&'a Mutex<bool>);

impl Drop for InstallLease<'_> {
    fn drop(&mut self) {
        *self.0.lock() = false;
    }
}

pub struct Orchestrator {
    settings: UpdateSettings,
    resolver: VersionResolver,
    locator: ArtifactLocator,
    downloads: DownloadManager,
    installer: Arc<Installer>,
    state: UpdateStateStore,
    process: Arc<dyn ProcessControl>,
    installing: Mutex<bool>,
    release: Mutex<Option<ReleaseInfo>>,
}

impl Orchestrator {
    pub fn new(settings: UpdateSettings, transport: Arc<dyn Transport>, process: Arc<dyn ProcessControl>) -> Self {
        Self::with_file_ops(settings, transport, process, Arc::new(StdFileOps))
    }

    pub fn with_file_ops(
        settings: UpdateSettings,
        transport: Arc<dyn Transport>,
        process: Arc<dyn ProcessControl>,
        ops: Arc<dyn FileOps>,
    ) -> Self {
        let resolver = VersionResolver::new(transport.clone(), settings.endpoints.clone());
        let locator = ArtifactLocator::new(transport.clone(), AssetQuery::host(settings.short_name.clone()));
        let downloads = DownloadManager::new(transport, settings.retention_dir.clone()).with_file_ops(ops.clone());
        let installer = Arc::new(Installer::new(ops, settings.retention_dir.clone()));
        let state = UpdateStateStore::new(settings.state_dir.clone());
        Self {
            settings,
            resolver,
            locator,
            downloads,
            installer,
            state,
            process,
            installing: Mutex::new(false),
            release: Mutex::new(None),
        }
    }

    /// Replaces the locator, e.g. to match assets for another platform.
    pub fn with_locator(mut self, locator: ArtifactLocator) -> Self {
        self.locator = locator;
        self
    }

    pub fn settings(&self) -> &UpdateSettings {
        &self.settings
    }

    pub fn state(&self) -> &UpdateStateStore {
        &self.state
    }

    pub fn downloads(&self) -> &DownloadManager {
        &self.downloads
    }

    pub fn phase(&self) -> Phase {
        if *self.installing.lock() {
            return Phase::Installing;
        }
        match self.downloads.lease() {
            crate::libs::download::Lease::Active(id) => Phase::Downloading(id),
            crate::libs::download::Lease::Idle => Phase::Idle,
        }
    }

    /// Release found by the last check.
    pub fn last_release(&self) -> Option<ReleaseInfo> {
        self.release.lock().clone()
    }

    pub async fn check_and_prepare(&self) -> UpdateResult<CheckOutcome> {
        if version::is_debug_version(&self.settings.current_version) {
            info!(version = %self.settings.current_version, "development build, update check suppressed");
            return Ok(CheckOutcome::Suppressed);
        }

        let request = CheckRequest {
            resource_id: self.settings.resource_id.clone(),
            current_version: self.settings.current_version.clone(),
            credential: self.settings.credential.clone().filter(|c| !c.is_empty()),
            channel: self.settings.channel,
            user_agent: self.settings.user_agent.clone(),
        };
        let release = self
            .resolver
            .check_for_update(&request)
            .await
            .ok_or_else(|| UpdateError::CheckFailed {
                detail: format!("none of {} metadata endpoint(s) answered", self.resolver.endpoints().len()),
            })?;

        if let Err(e) = self.state.record_check(Utc::now()) {
            warn!(error = %e, "could not record check time");
        }

        let outcome = match release.status() {
            ReleaseStatus::UpToDate => CheckOutcome::UpToDate(release),
            ReleaseStatus::Downloadable { .. } => CheckOutcome::Available(release),
            ReleaseStatus::NotEntitled { code, message } => {
                info!(code, message = %message, "update available but not entitled");
                CheckOutcome::NotEntitled(release)
            }
            ReleaseStatus::Unlinked => self.locate(release).await,
        };

        *self.release.lock() = outcome.release().cloned();
        Ok(outcome)
    }

    async fn locate(&self, release: ReleaseInfo) -> CheckOutcome {
        let located = self
            .locator
            .resolve_download(
                &release,
                self.settings.repository_url.as_deref(),
                self.settings.project_name.as_deref(),
            )
            .await;

        match located {
            Some(artifact) => {
                info!(url = %artifact.url, "artifact located on the public release channel");
                CheckOutcome::Available(ReleaseInfo {
                    download_url: Some(artifact.url),
                    file_size: artifact.size.or(release.file_size),
                    filename: Some(artifact.filename),
                    download_source: DownloadSource::Secondary,
                    ..release
                })
            }
            None => CheckOutcome::Unlinked(release),
        }
    }

    pub fn start_download(&self, release: &ReleaseInfo) -> UpdateResult<UpdateDownload> {
        let url = match release.status() {
            ReleaseStatus::Downloadable { url } => url.to_owned(),
            ReleaseStatus::NotEntitled { code, message } => {
                return Err(UpdateError::NoEntitlement {
                    code,
                    message: message.to_owned(),
                })
            }
            ReleaseStatus::UpToDate | ReleaseStatus::Unlinked => {
                return Err(UpdateError::download(format!(
                    "no download link for version {}",
                    release.version_name
                )))
            }
        };

        let secondary = release.download_source == DownloadSource::Secondary;
        let request = DownloadRequest {
            url,
            save_path: self.settings.download_dir.join(release.artifact_name()),
            total_size_hint: release.file_size,
            proxy: if secondary {
                self.settings.proxy.clone().filter(|p| !p.is_empty())
            } else {
                None
            },
            // the digest describes the licensed artifact only
            expected_sha256: if secondary { None } else { release.sha256.clone() },
        };

        let task = self.downloads.start(request)?;
        Ok(UpdateDownload {
            task,
            release: release.clone(),
            state: self.state.clone(),
        })
    }

    pub fn cancel_download(&self) -> bool {
        self.downloads.cancel()
    }

    pub async fn install_now(&self, pending: &PendingUpdate) -> UpdateResult<InstallReport> {
        let _lease = {
            let mut installing = self.installing.lock();
            if *installing {
                return Err(UpdateError::InstallBusy);
            }
            *installing = true;
            InstallLease(&self.installing)
        };

        self.state.clear_pending()?;
        let artifact = pending.downloaded_artifact_path.clone();
        let file_name = artifact
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if platform::is_installer_executable(&file_name) {
            let pid = self.process.spawn_installer(&artifact).map_err(|e| UpdateError::ApplyFatal {
                detail: format!("could not start installer {}: {}", artifact.display(), e),
            })?;
            self.state.save_complete(&self.completion(pending, true))?;
            return Ok(InstallReport::InstallerLaunched { pid });
        }

        let installer = self.installer.clone();
        let target = self.settings.install_dir.clone();
        let version_name = pending.version_name.clone();
        let outcome = tokio::task::spawn_blocking(move || installer.install(&artifact, &target, &version_name))
            .await
            .map_err(|e| UpdateError::ApplyFatal {
                detail: format!("install task aborted: {}", e),
            })??;

        match outcome {
            InstallOutcome::Success { mode } => {
                self.state.save_complete(&self.completion(pending, false))?;
                let relaunched = self.settings.relaunch
                    && match self.process.relaunch() {
                        Ok(_) => true,
                        Err(e) => {
                            warn!(error = %e, "relaunch failed");
                            false
                        }
                    };
                Ok(InstallReport::Installed { mode, relaunched })
            }
            InstallOutcome::FallbackRecovered { path, cause, .. } => {
                warn!(path = %path.display(), cause = %cause, "update installed side by side");
                Ok(InstallReport::FallbackRecovered { path, cause })
            }
        }
    }

    fn completion(&self, pending: &PendingUpdate, requires_version_verification: bool) -> UpdateComplete {
        UpdateComplete {
            previous_version: self.settings.current_version.clone(),
            new_version: pending.version_name.clone(),
            release_note: pending.release_note.clone(),
            channel: pending.channel,
            timestamp: Utc::now(),
            requires_version_verification,
        }
    }

    /// Consumes the completion record, or else reports a pending download.
    pub fn startup(&self) -> Option<StartupNotice> {
        if let Some(complete) = self.state.consume_complete() {
            let changed =
                version::compare_versions(&self.settings.current_version, &complete.new_version) != Ordering::Less;
            if complete.requires_version_verification && !changed {
                warn!(expected = %complete.new_version, running = %self.settings.current_version, "installer did not update the application");
                return Some(StartupNotice::InstallerUnconfirmed(complete));
            }
            return Some(StartupNotice::Completed(complete));
        }
        self.state.load_pending().map(StartupNotice::PendingInstall)
    }
}

//! Error taxonomy for the update pipeline.
//!
//! Every failure the pipeline can surface is one variant of [`UpdateError`].
//! Each variant knows which [`UpdateStage`] it belongs to and carries a
//! human-readable detail, so a presentation layer can render "what step
//! failed" without string matching.
//!
//! ## Recovery classes
//!
//! - **Transient** (`CheckFailed`, `DownloadFailed`, `Integrity`): offer a retry
//!   at the same step.
//! - **Declined** (`NoEntitlement`): surface the endpoint's code and message,
//!   never retried automatically.
//! - **User initiated** (`DownloadCancelled`): not an error from the user's
//!   perspective and never logged at error level.
//! - **Installation** (`ExtractFailed`, `ApplyFatal`): the install directory is
//!   untouched for the former; the latter means even the side-by-side fallback
//!   failed and the operator has to intervene.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Pipeline step a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStage {
    Check,
    Locate,
    Download,
    Extract,
    Apply,
    Cleanup,
    State,
    Config,
}

impl fmt::Display for UpdateStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UpdateStage::Check => "check",
            UpdateStage::Locate => "locate",
            UpdateStage::Download => "download",
            UpdateStage::Extract => "extract",
            UpdateStage::Apply => "apply",
            UpdateStage::Cleanup => "cleanup",
            UpdateStage::State => "state",
            UpdateStage::Config => "config",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("update check failed: {detail}")]
    CheckFailed { detail: String },

    #[error("update exists but no download was authorized (code {code}): {message}")]
    NoEntitlement { code: i64, message: String },

    #[error("download failed: {detail}")]
    DownloadFailed { detail: String },

    #[error("download cancelled")]
    DownloadCancelled,

    #[error("another download is already running (session {session_id})")]
    DownloadBusy { session_id: u64 },

    #[error("artifact checksum mismatch: expected {expected}, got {actual}")]
    Integrity { expected: String, actual: String },

    #[error("failed to extract {}: {detail}", artifact.display())]
    ExtractFailed { artifact: PathBuf, detail: String },

    #[error("update could not be applied and fallback failed: {detail}")]
    ApplyFatal { detail: String },

    #[error("an installation is already in progress")]
    InstallBusy,

    #[error("update state error: {detail}")]
    State { detail: String },

    #[error("configuration error: {detail}")]
    Config { detail: String },
}

impl UpdateError {
    pub fn stage(&self) -> UpdateStage {
        match self {
            UpdateError::CheckFailed { .. } | UpdateError::NoEntitlement { .. } => UpdateStage::Check,
            UpdateError::DownloadFailed { .. }
            | UpdateError::DownloadCancelled
            | UpdateError::DownloadBusy { .. }
            | UpdateError::Integrity { .. } => UpdateStage::Download,
            UpdateError::ExtractFailed { .. } => UpdateStage::Extract,
            UpdateError::ApplyFatal { .. } | UpdateError::InstallBusy => UpdateStage::Apply,
            UpdateError::State { .. } => UpdateStage::State,
            UpdateError::Config { .. } => UpdateStage::Config,
        }
    }

    /// Detail text without the stage prefix.
    pub fn detail(&self) -> String {
        match self {
            UpdateError::CheckFailed { detail }
            | UpdateError::DownloadFailed { detail }
            | UpdateError::ExtractFailed { detail, .. }
            | UpdateError::ApplyFatal { detail }
            | UpdateError::State { detail }
            | UpdateError::Config { detail } => detail.clone(),
            UpdateError::NoEntitlement { code, message } => format!("{} ({})", message, code),
            other => other.to_string(),
        }
    }

    /// Network and transient failures that can be retried at the same step.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            UpdateError::CheckFailed { .. } | UpdateError::DownloadFailed { .. } | UpdateError::Integrity { .. }
        )
    }

    pub fn download(detail: impl fmt::Display) -> Self {
        UpdateError::DownloadFailed { detail: detail.to_string() }
    }

    pub fn state(detail: impl fmt::Display) -> Self {
        UpdateError::State { detail: detail.to_string() }
    }
}

pub type UpdateResult<T> = Result<T, UpdateError>;

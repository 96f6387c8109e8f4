//! Persisted update records.
//!
//! Two independent JSON records live in the state directory:
//!
//! - `pending_update.json`: a downloaded artifact waiting to be installed.
//!   Discarded on read when the artifact is gone.
//! - `update_complete.json`: written when an install finishes or is handed off
//!   to an external installer. Read once, then deleted.
//!
//! A missing or unparsable file reads as "no record". Writes go through a
//! temporary file and a rename so a crash never leaves a half-written record.

use crate::libs::error::{UpdateError, UpdateResult};
use crate::libs::release::{Channel, DownloadSource, UpdateType};
use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const PENDING_FILE: &str = "pending_update.json";
pub const COMPLETE_FILE: &str = "update_complete.json";
pub const LAST_CHECK_FILE: &str = "last_check";

/// Minimum spacing between two automatic checks.
pub fn check_interval() -> Duration {
    Duration::days(1)
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PendingUpdate {
    pub version_name: String,
    pub release_note: String,
    pub channel: Channel,
    pub downloaded_artifact_path: PathBuf,
    pub file_size: Option<u64>,
    pub update_type: Option<UpdateType>,
    pub download_source: DownloadSource,
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct UpdateComplete {
    pub previous_version: String,
    pub new_version: String,
    pub release_note: String,
    pub channel: Channel,
    pub timestamp: DateTime<Utc>,
    /// Set when an external installer took over and success is unconfirmed.
    pub requires_version_verification: bool,
}

#[derive(Debug, Clone)]
pub struct UpdateStateStore {
    dir: PathBuf,
}

impl UpdateStateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn save_pending(&self, pending: &PendingUpdate) -> UpdateResult<()> {
        self.write_json(PENDING_FILE, pending)
    }

    /// Pending record, or `None` when there is none or its artifact vanished.
    pub fn load_pending(&self) -> Option<PendingUpdate> {
        let pending: PendingUpdate = self.read_json(PENDING_FILE)?;
        if pending.downloaded_artifact_path.is_file() {
            return Some(pending);
        }
        warn!(
            path = %pending.downloaded_artifact_path.display(),
            "pending update artifact is missing, discarding record"
        );
        if let Err(e) = self.clear_pending() {
            warn!(error = %e, "could not discard stale pending record");
        }
        None
    }

    pub fn clear_pending(&self) -> UpdateResult<()> {
        self.remove(PENDING_FILE)
    }

    pub fn save_complete(&self, complete: &UpdateComplete) -> UpdateResult<()> {
        self.write_json(COMPLETE_FILE, complete)
    }

    /// Returns the completion record and deletes it. A record that cannot be
    /// deleted is not returned, so it is never reported twice.
    pub fn consume_complete(&self) -> Option<UpdateComplete> {
        let complete: UpdateComplete = self.read_json(COMPLETE_FILE)?;
        match self.remove(COMPLETE_FILE) {
            Ok(()) => Some(complete),
            Err(e) => {
                warn!(error = %e, "could not delete completion record");
                None
            }
        }
    }

    pub fn record_check(&self, at: DateTime<Utc>) -> UpdateResult<()> {
        self.write_atomic(LAST_CHECK_FILE, at.to_rfc3339().as_bytes())
    }

    pub fn last_check(&self) -> Option<DateTime<Utc>> {
        let content = fs::read_to_string(self.dir.join(LAST_CHECK_FILE)).ok()?;
        DateTime::parse_from_rfc3339(content.trim())
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }

    /// `true` when no check was recorded within [`check_interval`].
    pub fn is_check_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_check() {
            Some(last) => now.signed_duration_since(last) > check_interval(),
            None => true,
        }
    }

    fn read_json<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        let path = self.dir.join(name);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "no record");
                return None;
            }
        };
        match serde_json::from_str(&content) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring corrupt record");
                None
            }
        }
    }

    fn write_json<T: Serialize>(&self, name: &str, value: &T) -> UpdateResult<()> {
        let json = serde_json::to_vec_pretty(value).map_err(UpdateError::state)?;
        self.write_atomic(name, &json)
    }

    fn write_atomic(&self, name: &str, bytes: &[u8]) -> UpdateResult<()> {
        fs::create_dir_all(&self.dir).map_err(UpdateError::state)?;
        let path = self.dir.join(name);
        let tmp = self.dir.join(format!("{}.tmp", name));
        fs::write(&tmp, bytes).map_err(UpdateError::state)?;
        fs::rename(&tmp, &path).map_err(UpdateError::state)?;
        Ok(())
    }

    fn remove(&self, name: &str) -> UpdateResult<()> {
        match fs::remove_file(self.dir.join(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(UpdateError::state(e)),
        }
    }
}

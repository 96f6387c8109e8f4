//! Download session manager.
//!
//! Owns at most one transfer at a time. A transfer streams the response body
//! into `<path>.downloading`, publishes throttled progress on a shared event
//! bus and renames the temp file into place when the stream ends.
//!
//! ## Session lease
//!
//! The manager holds an explicit lease (`Idle` or `Active(session_id)`):
//!
//! - [`DownloadManager::start`] takes the lease or fails with `DownloadBusy`.
//! - [`DownloadManager::cancel`] raises the session's cancel flag and frees the
//!   lease immediately, so a new session can start while the old transfer is
//!   still unwinding.
//! - A transfer that ends on its own frees the lease only if its cancel flag is
//!   down; a raised flag means `cancel` already did it.
//!
//! ## Progress
//!
//! Every session publishes to the same bus. Consumers track one session
//! through [`SessionProgress`], which drops events from any other session so a
//! straggler from a cancelled transfer never shows up in a newer one.

use crate::libs::error::{UpdateError, UpdateResult};
use crate::libs::fs_ops::{self, FileOps, StdFileOps};
use crate::libs::http::{StreamResponse, Transport};
use futures_util::StreamExt;
use parking_lot::Mutex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Minimum spacing between two progress events of one session.
pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(100);
const WRITE_BUFFER: usize = 256 * 1024;
const TEMP_SUFFIX: &str = ".downloading";
const EVENT_BUS_CAPACITY: usize = 256;

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct DownloadProgress {
    pub session_id: u64,
    pub downloaded_bytes: u64,
    /// Zero when the size is unknown.
    pub total_bytes: u64,
    pub bytes_per_second: u64,
    pub percent: f64,
}

/// How a session ended.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionEnd {
    Completed,
    Cancelled,
    Failed,
}

/// Everything published on the event bus.
#[derive(Clone, Debug, PartialEq)]
pub enum DownloadEvent {
    Progress(DownloadProgress),
    Finished { session_id: u64, end: SessionEnd },
}

impl DownloadEvent {
    pub fn session_id(&self) -> u64 {
        match self {
            DownloadEvent::Progress(p) => p.session_id,
            DownloadEvent::Finished { session_id, .. } => *session_id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub url: String,
    pub save_path: PathBuf,
    pub total_size_hint: Option<u64>,
    pub proxy: Option<String>,
    /// Lowercase hex digest the artifact must match.
    pub expected_sha256: Option<String>,
}

impl DownloadRequest {
    pub fn new(url: impl Into<String>, save_path: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            save_path: save_path.into(),
            total_size_hint: None,
            proxy: None,
            expected_sha256: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutcome {
    pub session_id: u64,
    /// Where the artifact really landed; may differ from the requested path.
    pub actual_path: PathBuf,
    pub detected_filename: Option<String>,
    pub bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lease {
    Idle,
    Active(u64),
}

/// Cancellation flag that can also be awaited.
#[derive(Default)]
struct CancelFlag {
    raised: AtomicBool,
    notify: Notify,
}

impl CancelFlag {
    fn raise(&self) {
        self.raised.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }

    async fn raised(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_raised() {
                return;
            }
            notified.await;
        }
    }
}

struct ActiveSession {
    session_id: u64,
    cancel: Arc<CancelFlag>,
}

type SharedLease = Arc<Mutex<Option<ActiveSession>>>;

pub struct DownloadManager {
    transport: Arc<dyn Transport>,
    ops: Arc<dyn FileOps>,
    retention_dir: PathBuf,
    next_session: AtomicU64,
    active: SharedLease,
    events: broadcast::Sender<DownloadEvent>,
}

impl DownloadManager {
    /// `retention_dir` receives any older file found at the final save path.
    pub fn new(transport: Arc<dyn Transport>, retention_dir: impl Into<PathBuf>) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self {
            transport,
            ops: Arc::new(StdFileOps),
            retention_dir: retention_dir.into(),
            next_session: AtomicU64::new(0),
            active: Arc::new(Mutex::new(None)),
            events,
        }
    }

    pub fn with_file_ops(mut self, ops: Arc<dyn FileOps>) -> Self {
        self.ops = ops;
        self
    }

    pub fn lease(&self) -> Lease {
        match self.active.lock().as_ref() {
            Some(session) => Lease::Active(session.session_id),
            None => Lease::Idle,
        }
    }

    pub fn is_active(&self) -> bool {
        self.lease() != Lease::Idle
    }

    /// Raw event bus, every session included.
    pub fn events(&self) -> broadcast::Receiver<DownloadEvent> {
        self.events.subscribe()
    }

    pub fn subscribe(&self, session_id: u64) -> SessionProgress {
        SessionProgress::new(self.events.subscribe(), session_id)
    }

    /// Starts a transfer on the current tokio runtime.
    pub fn start(&self, request: DownloadRequest) -> UpdateResult<DownloadTask> {
        let mut active = self.active.lock();
        if let Some(current) = active.as_ref() {
            warn!(session_id = current.session_id, "download rejected, another session is running");
            return Err(UpdateError::DownloadBusy {
                session_id: current.session_id,
            });
        }

        let session_id = self.next_session.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = Arc::new(CancelFlag::default());
        *active = Some(ActiveSession {
            session_id,
            cancel: cancel.clone(),
        });
        drop(active);

        info!(session_id, url = %request.url, path = %request.save_path.display(), "download started");
        let progress = self.subscribe(session_id);
        let transfer = Transfer {
            session_id,
            cancel,
            request,
            transport: self.transport.clone(),
            ops: self.ops.clone(),
            retention_dir: self.retention_dir.clone(),
            events: self.events.clone(),
            active: self.active.clone(),
        };
        let handle = tokio::spawn(transfer.run());

        Ok(DownloadTask {
            session_id,
            progress: Some(progress),
            handle,
        })
    }

    /// Cancels the running session. Returns `false` when nothing was running.
    pub fn cancel(&self) -> bool {
        match self.active.lock().take() {
            Some(session) => {
                session.cancel.raise();
                info!(session_id = session.session_id, "download cancellation requested");
                true
            }
            None => false,
        }
    }
}

/// Handle on a running transfer.
pub struct DownloadTask {
    session_id: u64,
    progress: Option<SessionProgress>,
    handle: JoinHandle<UpdateResult<DownloadOutcome>>,
}

impl DownloadTask {
    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// Progress stream of this session, subscribed before the transfer began.
    pub fn take_progress(&mut self) -> Option<SessionProgress> {
        self.progress.take()
    }

    pub async fn wait(self) -> UpdateResult<DownloadOutcome> {
        drop(self.progress);
        match self.handle.await {
            Ok(result) => result,
            Err(e) => Err(UpdateError::download(format!("download task aborted: {}", e))),
        }
    }
}

/// Progress of one session, filtered from the shared bus.
pub struct SessionProgress {
    session_id: u64,
    rx: broadcast::Receiver<DownloadEvent>,
    finished: bool,
}

impl SessionProgress {
    pub fn new(rx: broadcast::Receiver<DownloadEvent>, session_id: u64) -> Self {
        Self {
            session_id,
            rx,
            finished: false,
        }
    }

    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    pub fn accepts(&self, event: &DownloadEvent) -> bool {
        event.session_id() == self.session_id
    }

    /// Next progress event of the tracked session; `None` once it finished.
    pub async fn next(&mut self) -> Option<DownloadProgress> {
        while !self.finished {
            match self.rx.recv().await {
                Ok(event) if !self.accepts(&event) => {
                    debug!(stale = event.session_id(), tracked = self.session_id, "ignoring stale progress event");
                }
                Ok(DownloadEvent::Progress(progress)) => return Some(progress),
                Ok(DownloadEvent::Finished { .. }) => self.finished = true,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "progress consumer lagged");
                }
                Err(broadcast::error::RecvError::Closed) => self.finished = true,
            }
        }
        None
    }
}

/// Removes the temp file on every exit path unless disarmed.
struct TempFileGuard {
    path: PathBuf,
    armed: bool,
}

impl TempFileGuard {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if self.armed && self.path.exists() {
            match std::fs::remove_file(&self.path) {
                Ok(()) => debug!(path = %self.path.display(), "partial download removed"),
                Err(e) => warn!(path = %self.path.display(), error = %e, "failed to remove partial download"),
            }
        }
    }
}

struct Transfer {
    session_id: u64,
    cancel: Arc<CancelFlag>,
    request: DownloadRequest,
    transport: Arc<dyn Transport>,
    ops: Arc<dyn FileOps>,
    retention_dir: PathBuf,
    events: broadcast::Sender<DownloadEvent>,
    active: SharedLease,
}

impl Transfer {
    async fn run(self) -> UpdateResult<DownloadOutcome> {
        let result = self.transfer().await;

        // a raised flag means cancel() already released the lease
        if !self.cancel.is_raised() {
            let mut active = self.active.lock();
            if active.as_ref().map(|s| s.session_id) == Some(self.session_id) {
                *active = None;
            }
        }

        let end = match &result {
            Ok(outcome) => {
                info!(session_id = self.session_id, bytes = outcome.bytes, path = %outcome.actual_path.display(), "download completed");
                SessionEnd::Completed
            }
            Err(UpdateError::DownloadCancelled) => {
                info!(session_id = self.session_id, "download cancelled");
                SessionEnd::Cancelled
            }
            Err(e) => {
                warn!(session_id = self.session_id, error = %e, "download failed");
                SessionEnd::Failed
            }
        };
        let _ = self.events.send(DownloadEvent::Finished {
            session_id: self.session_id,
            end,
        });
        result
    }

    fn check_cancelled(&self) -> UpdateResult<()> {
        if self.cancel.is_raised() {
            Err(UpdateError::DownloadCancelled)
        } else {
            Ok(())
        }
    }

    fn emit(&self, downloaded: u64, total: u64, bytes_per_second: u64, percent: f64) {
        let _ = self.events.send(DownloadEvent::Progress(DownloadProgress {
            session_id: self.session_id,
            downloaded_bytes: downloaded,
            total_bytes: total,
            bytes_per_second,
            percent,
        }));
    }

    async fn transfer(&self) -> UpdateResult<DownloadOutcome> {
        let save_path = &self.request.save_path;
        let dir = save_path.parent().map(Path::to_path_buf).unwrap_or_default();
        if !dir.as_os_str().is_empty() {
            self.ops.create_dir_all(&dir).map_err(UpdateError::download)?;
        }

        let response = tokio::select! {
            biased;
            _ = self.cancel.raised() => return Err(UpdateError::DownloadCancelled),
            res = self.transport.open_stream(&self.request.url, self.request.proxy.as_deref()) => {
                res.map_err(UpdateError::download)?
            }
        };
        self.check_cancelled()?;

        let detected_filename = detect_filename(&response);
        if let Some(name) = &detected_filename {
            debug!(name = %name, "server reported artifact name");
        }
        let actual_path = match &detected_filename {
            Some(name) => dir.join(name),
            None => save_path.clone(),
        };
        let temp_path = temp_path_for(&actual_path);
        let total = self.request.total_size_hint.or(response.content_length).unwrap_or(0);

        let mut guard = TempFileGuard::new(temp_path.clone());
        let mut file = tokio::fs::File::create(&temp_path).await.map_err(UpdateError::download)?;
        let mut chunks = response.chunks;
        let mut hasher = Sha256::new();
        let mut buffer: Vec<u8> = Vec::with_capacity(WRITE_BUFFER);
        let mut downloaded: u64 = 0;
        let mut last_emit = Instant::now();
        let mut last_downloaded: u64 = 0;

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.raised() => return Err(UpdateError::DownloadCancelled),
                chunk = chunks.next() => chunk,
            };
            let Some(chunk) = next else { break };
            let chunk = chunk.map_err(UpdateError::download)?;

            hasher.update(&chunk);
            buffer.extend_from_slice(&chunk);
            downloaded += chunk.len() as u64;

            if buffer.len() >= WRITE_BUFFER {
                file.write_all(&buffer).await.map_err(UpdateError::download)?;
                buffer.clear();
            }

            let elapsed = last_emit.elapsed();
            if elapsed >= PROGRESS_INTERVAL {
                let speed = ((downloaded - last_downloaded) as f64 / elapsed.as_secs_f64()) as u64;
                let percent = if total > 0 {
                    downloaded as f64 / total as f64 * 100.0
                } else {
                    0.0
                };
                self.emit(downloaded, total, speed, percent);
                last_emit = Instant::now();
                last_downloaded = downloaded;
            }
        }
        self.check_cancelled()?;

        if !buffer.is_empty() {
            file.write_all(&buffer).await.map_err(UpdateError::download)?;
        }
        file.sync_all().await.map_err(UpdateError::download)?;
        drop(file);

        if let Some(expected) = self.request.expected_sha256.as_deref() {
            let actual = hex::encode(hasher.finalize());
            if !actual.eq_ignore_ascii_case(expected.trim()) {
                return Err(UpdateError::Integrity {
                    expected: expected.trim().to_lowercase(),
                    actual,
                });
            }
        }

        self.check_cancelled()?;
        self.emit(downloaded, if total > 0 { total } else { downloaded }, 0, 100.0);

        if actual_path.exists() {
            if let Err(e) = fs_ops::retain(self.ops.as_ref(), &self.retention_dir, &actual_path) {
                warn!(path = %actual_path.display(), error = %e, "could not retain previous artifact");
            }
        }
        // last point where a cancel still discards the download
        self.check_cancelled()?;
        self.ops.rename(&temp_path, &actual_path).map_err(UpdateError::download)?;
        guard.disarm();

        Ok(DownloadOutcome {
            session_id: self.session_id,
            actual_path,
            detected_filename,
            bytes: downloaded,
        })
    }
}

pub fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(TEMP_SUFFIX);
    PathBuf::from(name)
}

/// Artifact name announced by the server: `Content-Disposition` first, then
/// the last segment of the final (post-redirect) URL.
pub fn detect_filename(response: &StreamResponse) -> Option<String> {
    if let Some(name) = response
        .content_disposition
        .as_deref()
        .and_then(parse_content_disposition)
        .and_then(|name| sanitize_filename(&name))
    {
        return Some(name);
    }

    let path = response.final_url.split(['?', '#']).next()?;
    let segment = path.rsplit('/').next().filter(|s| !s.is_empty())?;
    let decoded = percent_encoding::percent_decode_str(segment).decode_utf8().ok()?;
    sanitize_filename(&decoded)
}

/// Strips directories and rejects names without an extension or starting with `..`.
pub fn sanitize_filename(name: &str) -> Option<String> {
    let name = name.rsplit(['/', '\\']).next().unwrap_or(name).trim();
    if name.is_empty() || name.starts_with("..") || name == "." || !name.contains('.') {
        return None;
    }
    Some(name.to_owned())
}

/// Filename from a `Content-Disposition` header, case-insensitive.
/// `filename*=` (RFC 5987) takes precedence over `filename=`.
pub fn parse_content_disposition(header: &str) -> Option<String> {
    let mut plain = None;
    for param in header.split(';').map(str::trim) {
        let Some((key, value)) = param.split_once('=') else {
            continue;
        };
        match key.trim().to_ascii_lowercase().as_str() {
            "filename*" => {
                let encoded = value.trim().trim_matches('"');
                let encoded = encoded.split_once("''").map(|(_, rest)| rest).unwrap_or(encoded);
                if let Ok(decoded) = percent_encoding::percent_decode_str(encoded).decode_utf8() {
                    let decoded = decoded.trim_matches('"').to_owned();
                    if !decoded.is_empty() {
                        return Some(decoded);
                    }
                }
            }
            "filename" if plain.is_none() => {
                let value = value.trim().trim_matches('"');
                if !value.is_empty() {
                    plain = Some(value.to_owned());
                }
            }
            _ => {}
        }
    }
    plain
}

#![allow(dead_code)]

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use upkit::libs::fs_ops::FileOps;
use upkit::libs::http::{ProbeResponse, StreamResponse, TextResponse, Transport, TransportError};
use upkit::libs::process::ProcessControl;

/// Body served by [`FakeTransport::open_stream`].
#[derive(Clone, Default)]
pub struct ServedStream {
    pub body: Vec<u8>,
    pub chunk_size: usize,
    pub delay: Duration,
    /// Never ends after the last chunk.
    pub stall: bool,
    pub final_url: Option<String>,
    pub content_disposition: Option<String>,
    pub content_length: Option<u64>,
}

impl ServedStream {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            chunk_size: 1024,
            ..Default::default()
        }
    }
}

/// In-process network. Unknown URLs fail with a transport error.
#[derive(Default)]
pub struct FakeTransport {
    texts: Mutex<HashMap<String, TextResponse>>,
    probes: Mutex<HashMap<String, Option<u64>>>,
    streams: Mutex<HashMap<String, ServedStream>>,
    pub text_requests: Mutex<Vec<(String, Vec<(String, String)>)>>,
    pub probe_requests: Mutex<Vec<String>>,
    pub stream_requests: Mutex<Vec<(String, Option<String>)>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(self, url: &str, status: u16, body: &str) -> Self {
        self.texts.lock().unwrap().insert(
            url.to_string(),
            TextResponse {
                status,
                body: body.to_string(),
            },
        );
        self
    }

    pub fn probe(self, url: &str, size: Option<u64>) -> Self {
        self.probes.lock().unwrap().insert(url.to_string(), size);
        self
    }

    pub fn stream(self, url: &str, served: ServedStream) -> Self {
        self.streams.lock().unwrap().insert(url.to_string(), served);
        self
    }

    pub fn requested_urls(&self) -> Vec<String> {
        self.text_requests.lock().unwrap().iter().map(|(u, _)| u.clone()).collect()
    }
}

fn unreachable(url: &str) -> TransportError {
    TransportError::Network {
        url: url.to_string(),
        detail: "connection refused".to_string(),
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn get_text(&self, url: &str, query: &[(&str, String)]) -> Result<TextResponse, TransportError> {
        self.text_requests.lock().unwrap().push((
            url.to_string(),
            query.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
        ));
        self.texts.lock().unwrap().get(url).cloned().ok_or_else(|| unreachable(url))
    }

    async fn probe(&self, url: &str) -> Result<ProbeResponse, TransportError> {
        self.probe_requests.lock().unwrap().push(url.to_string());
        match self.probes.lock().unwrap().get(url) {
            Some(size) => Ok(ProbeResponse {
                final_url: url.to_string(),
                content_length: *size,
            }),
            None => Err(TransportError::Status {
                url: url.to_string(),
                status: 404,
            }),
        }
    }

    async fn open_stream(&self, url: &str, proxy: Option<&str>) -> Result<StreamResponse, TransportError> {
        self.stream_requests
            .lock()
            .unwrap()
            .push((url.to_string(), proxy.map(str::to_string)));
        let served = self.streams.lock().unwrap().get(url).cloned().ok_or_else(|| unreachable(url))?;

        let chunks: Vec<Result<Vec<u8>, String>> = served
            .body
            .chunks(served.chunk_size.max(1))
            .map(|c| Ok(c.to_vec()))
            .collect();
        let delay = served.delay;
        let body = futures_util::stream::iter(chunks).then(move |chunk| async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            chunk
        });
        let chunks = if served.stall {
            body.chain(futures_util::stream::pending()).boxed()
        } else {
            body.boxed()
        };

        Ok(StreamResponse {
            final_url: served.final_url.clone().unwrap_or_else(|| url.to_string()),
            content_disposition: served.content_disposition.clone(),
            content_length: served.content_length.or(Some(served.body.len() as u64)),
            chunks,
        })
    }
}

/// Records spawn and relaunch requests instead of starting processes.
#[derive(Default)]
pub struct FakeProcess {
    pub installers: Mutex<Vec<PathBuf>>,
    pub relaunches: AtomicUsize,
}

impl ProcessControl for FakeProcess {
    fn spawn_installer(&self, installer: &Path) -> io::Result<u32> {
        self.installers.lock().unwrap().push(installer.to_path_buf());
        Ok(4242)
    }

    fn relaunch(&self) -> io::Result<u32> {
        self.relaunches.fetch_add(1, Ordering::SeqCst);
        Ok(4243)
    }
}

/// Fails the `fail_at`-th copy into any path under `guarded`.
pub struct FaultyOps {
    pub guarded: PathBuf,
    pub fail_at: usize,
    copies: AtomicUsize,
}

impl FaultyOps {
    pub fn new(guarded: impl Into<PathBuf>, fail_at: usize) -> Self {
        Self {
            guarded: guarded.into(),
            fail_at,
            copies: AtomicUsize::new(0),
        }
    }
}

impl FileOps for FaultyOps {
    fn copy_file(&self, src: &Path, dst: &Path) -> io::Result<()> {
        if dst.starts_with(&self.guarded) {
            let n = self.copies.fetch_add(1, Ordering::SeqCst) + 1;
            if n == self.fail_at {
                // leave a truncated file behind like a real interrupted copy
                fs::write(dst, b"partial")?;
                return Err(io::Error::other("disk full"));
            }
        }
        fs::copy(src, dst).map(|_| ())
    }
}

/// Writes a `.tar.gz` with the given `(path, content)` entries.
pub fn write_tar_gz(path: &Path, entries: &[(&str, &[u8])]) {
    let file = fs::File::create(path).unwrap();
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    for (name, content) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, *content).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap();
}

/// Every file under `root` with its content, keyed by relative path.
pub fn snapshot(root: &Path) -> Vec<(PathBuf, Vec<u8>)> {
    upkit::libs::fs_ops::walk_files(root)
        .unwrap()
        .into_iter()
        .map(|rel| {
            let content = fs::read(root.join(&rel)).unwrap();
            (rel, content)
        })
        .collect()
}

/// Writes `(path, content)` pairs under `root`.
pub fn populate(root: &Path, files: &[(&str, &str)]) {
    for (rel, content) in files {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }
}

pub fn metadata_body(code: i64, msg: &str, version: Option<&str>, url: Option<&str>) -> String {
    let mut data = serde_json::Map::new();
    if let Some(version) = version {
        data.insert("version_name".into(), version.into());
        data.insert("release_note".into(), "Bug fixes".into());
        data.insert("channel".into(), "stable".into());
    }
    if let Some(url) = url {
        data.insert("url".into(), url.into());
    }
    let mut body = serde_json::json!({ "code": code, "msg": msg });
    if !data.is_empty() {
        body["data"] = serde_json::Value::Object(data);
    }
    body.to_string()
}

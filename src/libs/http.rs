//! HTTP transport used by every network-facing component.
//!
//! The pipeline never talks to `reqwest` directly: the resolver, locator and
//! download manager go through the [`Transport`] trait so tests can replace
//! the network with in-process fakes.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_LENGTH};
use reqwest::{Client, Proxy};
use std::time::Duration;
use thiserror::Error;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Response body chunks in arrival order.
pub type ByteStream = BoxStream<'static, Result<Vec<u8>, String>>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request to {url} failed: {detail}")]
    Network { url: String, detail: String },
    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("invalid proxy '{proxy}': {detail}")]
    Proxy { proxy: String, detail: String },
}

/// Body of a small request, returned regardless of the HTTP status.
#[derive(Debug, Clone)]
pub struct TextResponse {
    pub status: u16,
    pub body: String,
}

impl TextResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Metadata-only answer to a probe.
#[derive(Debug, Clone)]
pub struct ProbeResponse {
    pub final_url: String,
    pub content_length: Option<u64>,
}

/// An open streaming download.
pub struct StreamResponse {
    /// URL after redirects.
    pub final_url: String,
    pub content_disposition: Option<String>,
    pub content_length: Option<u64>,
    pub chunks: ByteStream,
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn get_text(&self, url: &str, query: &[(&str, String)]) -> Result<TextResponse, TransportError>;

    /// Metadata-only request. Fails unless the server answers with a success status.
    async fn probe(&self, url: &str) -> Result<ProbeResponse, TransportError>;

    /// Starts a streaming GET, optionally through a forward proxy.
    async fn open_stream(&self, url: &str, proxy: Option<&str>) -> Result<StreamResponse, TransportError>;
}

/// `reqwest` backed transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    user_agent: String,
}

impl HttpTransport {
    pub fn new(user_agent: &str) -> Result<Self, TransportError> {
        let client = Self::builder(user_agent).build().map_err(|e| TransportError::Network {
            url: String::new(),
            detail: e.to_string(),
        })?;
        Ok(Self {
            client,
            user_agent: user_agent.to_owned(),
        })
    }

    fn builder(user_agent: &str) -> reqwest::ClientBuilder {
        Client::builder().user_agent(user_agent).connect_timeout(CONNECT_TIMEOUT)
    }

    fn client_for(&self, proxy: Option<&str>) -> Result<Client, TransportError> {
        match proxy.filter(|p| !p.trim().is_empty()) {
            None => Ok(self.client.clone()),
            Some(proxy) => {
                tracing::info!(proxy, "routing download through proxy");
                let reqwest_proxy = Proxy::all(proxy).map_err(|e| TransportError::Proxy {
                    proxy: proxy.to_owned(),
                    detail: e.to_string(),
                })?;
                Self::builder(&self.user_agent)
                    .proxy(reqwest_proxy)
                    .build()
                    .map_err(|e| TransportError::Proxy {
                        proxy: proxy.to_owned(),
                        detail: e.to_string(),
                    })
            }
        }
    }
}

fn network(url: &str, err: reqwest::Error) -> TransportError {
    TransportError::Network {
        url: url.to_owned(),
        detail: err.to_string(),
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get_text(&self, url: &str, query: &[(&str, String)]) -> Result<TextResponse, TransportError> {
        let res = self
            .client
            .get(url)
            .query(query)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| network(url, e))?;
        let status = res.status().as_u16();
        let body = res.text().await.map_err(|e| network(url, e))?;
        Ok(TextResponse { status, body })
    }

    async fn probe(&self, url: &str) -> Result<ProbeResponse, TransportError> {
        let res = self
            .client
            .head(url)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| network(url, e))?;
        if !res.status().is_success() {
            return Err(TransportError::Status {
                url: url.to_owned(),
                status: res.status().as_u16(),
            });
        }
        let content_length = res
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        Ok(ProbeResponse {
            final_url: res.url().to_string(),
            content_length,
        })
    }

    async fn open_stream(&self, url: &str, proxy: Option<&str>) -> Result<StreamResponse, TransportError> {
        let client = self.client_for(proxy)?;
        let res = client.get(url).send().await.map_err(|e| network(url, e))?;
        if !res.status().is_success() {
            return Err(TransportError::Status {
                url: url.to_owned(),
                status: res.status().as_u16(),
            });
        }

        let content_disposition = res
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let final_url = res.url().to_string();
        let content_length = res.content_length();
        let chunks = res
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(|e| e.to_string()))
            .boxed();

        Ok(StreamResponse {
            final_url,
            content_disposition,
            content_length,
            chunks,
        })
    }
}

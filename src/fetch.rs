use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::overlay::OverlayError;

#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

pub type FetchFuture<'a> =
    Pin<Box<dyn Future<Output = Result<FetchedImage, OverlayError>> + Send + 'a>>;

/// Source of base image bytes. The server holds one behind an `Arc` so tests can swap it out.
pub trait ImageFetcher: Send + Sync {
    fn fetch<'a>(&'a self, url: &'a str) -> FetchFuture<'a>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
    max_bytes: usize,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, max_bytes: usize) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("thai-text-overlay/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, max_bytes })
    }

    async fn fetch_bytes(&self, url: &str) -> Result<FetchedImage, OverlayError> {
        let parsed = parse_http_url(url)?;
        let mut response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|err| OverlayError::Fetch(describe_reqwest_error(&err)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(OverlayError::Fetch(format!("{} returned {}", url, status)));
        }
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());
        if let Some(length) = response.content_length() {
            if length > self.max_bytes as u64 {
                return Err(too_large(self.max_bytes));
            }
        }
        let mut bytes = Vec::with_capacity(self.max_bytes.min(64 * 1024));
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|err| OverlayError::Fetch(describe_reqwest_error(&err)))?
        {
            if bytes.len().saturating_add(chunk.len()) > self.max_bytes {
                return Err(too_large(self.max_bytes));
            }
            bytes.extend_from_slice(&chunk);
        }
        debug!(url = %url, size = bytes.len(), "fetched image");
        Ok(FetchedImage {
            bytes,
            content_type,
        })
    }
}

impl ImageFetcher for HttpFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> FetchFuture<'a> {
        Box::pin(self.fetch_bytes(url))
    }
}

pub(crate) fn parse_http_url(url: &str) -> Result<Url, OverlayError> {
    let parsed = Url::parse(url)
        .map_err(|err| OverlayError::Fetch(format!("invalid url '{}': {}", url, err)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(OverlayError::Fetch(format!("unsupported url scheme '{}'", other))),
    }
}

fn too_large(max_bytes: usize) -> OverlayError {
    OverlayError::Fetch(format!("image exceeds {} bytes", max_bytes))
}

fn describe_reqwest_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        "request timed out".to_string()
    } else {
        err.to_string()
    }
}

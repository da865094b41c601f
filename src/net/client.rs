//! Async HTTP client shared by every component.
//!
//! Thin wrapper over reqwest that pins the semantics the extraction core
//! depends on: a 30 second per-request deadline, keep-alive pooling bounded
//! to 4 idle connections per host with a 30 second idle age, transparent
//! gzip/deflate decoding, a per-host caching DNS resolver, and a
//! cancellation slot on every operation. File downloads are Range-chunked.

use crate::net::dns::CachingResolver;
use crate::utils::error::{Error, Result};
use crate::utils::Settings;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const POOL_MAX_IDLE_PER_HOST: usize = 4;
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Response surface consumed by the extractor
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
    pub headers: HashMap<String, String>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Progress callback: (downloaded bytes, total bytes or 0 when unknown)
pub type ProgressFn<'a> = &'a (dyn Fn(u64, u64) + Send + Sync);

pub struct HttpClient {
    client: reqwest::Client,
    chunk_size: u64,
    retry_attempts: usize,
    retry_delay: Duration,
}

impl HttpClient {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .gzip(true)
            .deflate(true)
            .dns_resolver(Arc::new(CachingResolver::new()))
            .build()?;

        Ok(Self {
            client,
            chunk_size: settings.chunk_size,
            retry_attempts: settings.retry_attempts,
            retry_delay: settings.retry_delay,
        })
    }

    pub async fn get(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        cancel: &CancellationToken,
    ) -> Result<HttpResponse> {
        let request = self.client.get(url).headers(build_headers(headers));
        self.execute(request, cancel).await
    }

    pub async fn post(
        &self,
        url: &str,
        body: String,
        headers: &[(&str, &str)],
        cancel: &CancellationToken,
    ) -> Result<HttpResponse> {
        let request = self
            .client
            .post(url)
            .headers(build_headers(headers))
            .body(body);
        self.execute(request, cancel).await
    }

    async fn execute(
        &self,
        request: reqwest::RequestBuilder,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse> {
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            res = request.send() => res?,
        };

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| Some((k.to_string(), v.to_str().ok()?.to_string())))
            .collect();

        let body = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            res = response.text() => res?,
        };

        Ok(HttpResponse {
            status,
            body,
            headers,
        })
    }

    /// Download `url` to `path` using Range requests of `chunk_size` bytes.
    /// Servers that ignore Range fall back to a single streamed body.
    /// Returns the number of bytes written.
    pub async fn download_file(
        &self,
        url: &str,
        path: &Path,
        progress: Option<ProgressFn<'_>>,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let mut file = File::create(path)
            .await
            .map_err(|_| Error::FileOpen(path.to_path_buf()))?;

        // Probe with the first chunk; a 206 tells us the total size.
        let first = self
            .fetch_chunk(url, 0, self.chunk_size - 1, cancel)
            .await?;
        let total = first.total;
        let mut downloaded = first.bytes.len() as u64;

        file.write_all(&first.bytes)
            .await
            .map_err(|_| Error::FileWrite(path.to_path_buf()))?;
        if let Some(cb) = progress {
            cb(downloaded, total);
        }

        if first.ranged {
            while downloaded < total {
                let end = (downloaded + self.chunk_size - 1).min(total - 1);
                let chunk = self.fetch_chunk(url, downloaded, end, cancel).await?;
                file.write_all(&chunk.bytes)
                    .await
                    .map_err(|_| Error::FileWrite(path.to_path_buf()))?;
                downloaded += chunk.bytes.len() as u64;
                if let Some(cb) = progress {
                    cb(downloaded, total);
                }
                if chunk.bytes.is_empty() {
                    break; // server stopped short of the advertised size
                }
            }
        }

        file.flush()
            .await
            .map_err(|_| Error::FileWrite(path.to_path_buf()))?;
        debug!("Downloaded {} bytes to {}", downloaded, path.display());
        Ok(downloaded)
    }

    async fn fetch_chunk(
        &self,
        url: &str,
        start: u64,
        end: u64,
        cancel: &CancellationToken,
    ) -> Result<Chunk> {
        let mut attempts = 0;
        loop {
            match self.fetch_chunk_attempt(url, start, end, cancel).await {
                Ok(chunk) => return Ok(chunk),
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) if attempts < self.retry_attempts => {
                    warn!(
                        "Chunk {}-{} failed (attempt {}): {}",
                        start,
                        end,
                        attempts + 1,
                        e
                    );
                    sleep(self.retry_delay).await;
                    attempts += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_chunk_attempt(
        &self,
        url: &str,
        start: u64,
        end: u64,
        cancel: &CancellationToken,
    ) -> Result<Chunk> {
        let request = self
            .client
            .get(url)
            .header("Range", format!("bytes={}-{}", start, end));

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            res = request.send() => res?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus(status.as_u16()));
        }

        // `bytes start-end/total` when the server honoured the range
        let (ranged, total) = match response
            .headers()
            .get("Content-Range")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range_total)
        {
            Some(total) => (true, total),
            None => (
                false,
                response.content_length().unwrap_or(0),
            ),
        };

        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        loop {
            let item = tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                item = stream.next() => item,
            };
            match item {
                Some(chunk) => bytes.extend_from_slice(&chunk?),
                None => break,
            }
        }

        Ok(Chunk {
            bytes,
            total,
            ranged,
        })
    }
}

struct Chunk {
    bytes: Vec<u8>,
    total: u64,
    ranged: bool,
}

fn parse_content_range_total(value: &str) -> Option<u64> {
    value.rsplit('/').next()?.trim().parse().ok()
}

fn build_headers(pairs: &[(&str, &str)]) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in pairs {
        let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
            continue;
        };
        let Ok(value) = HeaderValue::from_str(value) else {
            continue;
        };
        map.insert(name, value);
    }
    map
}

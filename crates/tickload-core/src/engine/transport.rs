//! HTTP transport for the download worker
//!
//! Workers only need two operations: learn the size of a resource and open
//! its body from a byte offset. Both sit behind [`Transport`] so the engine
//! can be exercised without a network.

use crate::error::TickloadError;
use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, CONTENT_LENGTH, CONTENT_RANGE, RANGE};
use reqwest::StatusCode;
use std::io::Read;
use std::time::Duration;
use tickload_types::EngineConfig;
use tracing::debug;

/// Body of a ranged request
pub struct RangeBody {
    /// Offset of the first byte `reader` yields. Zero when the server ignored
    /// the range and sent the whole resource.
    pub start: u64,
    pub reader: Box<dyn Read + Send>,
}

impl std::fmt::Debug for RangeBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RangeBody").field("start", &self.start).finish()
    }
}

/// Blocking transfer operations used by worker threads
pub trait Transport: Send + Sync {
    /// Total size of the resource in bytes
    fn probe(&self, url: &str) -> Result<u64, TickloadError>;

    /// Request the resource from `offset` to its end
    fn open_range(&self, url: &str, offset: u64) -> Result<RangeBody, TickloadError>;
}

/// [`Transport`] backed by a blocking reqwest client.
///
/// The blocking client owns its own runtime, so it must be created and used
/// outside of any tokio runtime context.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(config: &EngineConfig) -> Result<Self, TickloadError> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            // Transfers may legitimately run for hours
            .timeout(None::<Duration>)
            .build()?;

        Ok(Self { client })
    }

    /// Size from a one-byte ranged GET, for servers that do not answer HEAD
    /// with a usable length
    fn probe_with_get(&self, url: &str) -> Result<u64, TickloadError> {
        let response = self.client.get(url).header(RANGE, "bytes=0-0").send()?;
        let status = response.status();

        if status == StatusCode::PARTIAL_CONTENT {
            if let Some(total) = content_range(response.headers()).and_then(|r| r.total) {
                return Ok(total);
            }
        } else if status.is_success() {
            if let Some(length) = header_u64(response.headers(), CONTENT_LENGTH) {
                return Ok(length);
            }
        } else {
            return Err(server_error(&response));
        }

        Err(TickloadError::MissingContentLength(url.to_string()))
    }
}

impl Transport for HttpTransport {
    fn probe(&self, url: &str) -> Result<u64, TickloadError> {
        let response = self.client.head(url).send()?;

        let head_length = if response.status().is_success() {
            header_u64(response.headers(), CONTENT_LENGTH)
        } else {
            debug!("HEAD {} returned {}, probing with GET", url, response.status());
            None
        };

        match head_length {
            Some(length) if length > 0 => Ok(length),
            // A zero length from HEAD is often a placeholder; confirm it
            Some(_) => Ok(self.probe_with_get(url).unwrap_or(0)),
            None => self.probe_with_get(url),
        }
    }

    fn open_range(&self, url: &str, offset: u64) -> Result<RangeBody, TickloadError> {
        let response = self
            .client
            .get(url)
            .header(RANGE, format!("bytes={}-", offset))
            .send()?;

        let start = match response.status() {
            StatusCode::PARTIAL_CONTENT => match content_range(response.headers()) {
                Some(range) => {
                    debug!("{} serving bytes {}-{}", url, range.start, range.end);
                    range.start
                }
                None => offset,
            },
            status if status.is_success() => {
                if offset > 0 {
                    debug!("{} ignored the range request, restarting body at 0", url);
                }
                0
            }
            _ => return Err(server_error(&response)),
        };

        Ok(RangeBody {
            start,
            reader: Box::new(response),
        })
    }
}

fn server_error(response: &Response) -> TickloadError {
    let status = response.status();
    TickloadError::ServerError {
        status: status.as_u16(),
        message: status.canonical_reason().unwrap_or("unknown").to_string(),
    }
}

fn header_u64(headers: &HeaderMap, name: reqwest::header::HeaderName) -> Option<u64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse().ok())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ContentRange {
    start: u64,
    end: u64,
    total: Option<u64>,
}

fn content_range(headers: &HeaderMap) -> Option<ContentRange> {
    headers
        .get(CONTENT_RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_content_range)
}

/// Parse `bytes <start>-<end>/<total|*>`
fn parse_content_range(value: &str) -> Option<ContentRange> {
    let rest = value.trim().strip_prefix("bytes")?.trim_start();
    let (range, total) = rest.split_once('/')?;
    let (start, end) = range.split_once('-')?;
    let total = match total.trim() {
        "*" => None,
        t => Some(t.parse().ok()?),
    };

    Some(ContentRange {
        start: start.trim().parse().ok()?,
        end: end.trim().parse().ok()?,
        total,
    })
}

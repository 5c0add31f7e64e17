use futures::StreamExt;
use reqwest::header::{IF_MODIFIED_SINCE, LAST_MODIFIED};
use std::time::Duration;
use thiserror::Error;

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Errors that can occur during one feed refresh cycle.
///
/// Every variant is scoped to a single feed's cycle: reporting one never
/// affects sibling feeds. Only store-connection failure (handled at
/// startup, not here) is fatal to the process.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// Request exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// HTTP response with a status this service does not handle
    #[error("Unhandled HTTP status {0}")]
    UnhandledStatus(u16),
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Feed XML could not be parsed as RSS or Atom
    #[error("Parse error: {0}")]
    Parse(String),
    /// Store operation failed while applying a cycle's writes
    #[error("Storage error: {0}")]
    Storage(String),
    /// Duplicate unique-key anomaly detected by a count check.
    /// Never expected under correct operation.
    #[error("Data integrity fault: {0}")]
    Integrity(String),
    /// The feed URL could not be parsed or is not fetchable http(s)
    #[error("Invalid feed URL: {0}")]
    InvalidUrl(String),
}

/// A prepared fetch: target URL, timeout, and the optional conditional
/// precondition carried over from the feed's stored validator. Building
/// one performs no I/O.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub url: String,
    pub timeout: Duration,
    /// Sent as If-Modified-Since when present.
    pub conditional: Option<String>,
}

/// Outcome of executing a prepared fetch.
#[derive(Debug)]
pub enum FetchOutcome {
    /// Fresh content, plus the validator to persist with the meta save.
    Fetched {
        body: Vec<u8>,
        validator: Option<String>,
    },
    /// The server confirmed the stored validator is still current.
    /// No parse, no reconciliation, no writes.
    NotModified,
}

/// Build the request descriptor for a feed, attaching the stored cache
/// validator (if any) as a conditional-fetch precondition.
pub fn prepare_request(
    url: &str,
    validator: Option<&str>,
    timeout: Duration,
) -> RequestDescriptor {
    RequestDescriptor {
        url: url.to_string(),
        timeout,
        conditional: validator.map(str::to_string),
    }
}

/// Execute a prepared fetch.
///
/// Dispatches on the response status:
/// - 2xx → body (size-capped) plus the response's Last-Modified validator
/// - 304 → [`FetchOutcome::NotModified`]
/// - anything else → [`FetchError::UnhandledStatus`]
///
/// There is no in-cycle retry; the next scheduled cycle is the retry.
pub async fn fetch(
    client: &reqwest::Client,
    request: &RequestDescriptor,
) -> Result<FetchOutcome, FetchError> {
    let mut builder = client.get(&request.url);
    if let Some(token) = &request.conditional {
        builder = builder.header(IF_MODIFIED_SINCE, token);
    }

    let response = tokio::time::timeout(request.timeout, builder.send())
        .await
        .map_err(|_| FetchError::Timeout)?
        .map_err(FetchError::Network)?;

    if response.status() == reqwest::StatusCode::NOT_MODIFIED {
        return Ok(FetchOutcome::NotModified);
    }

    if !response.status().is_success() {
        return Err(FetchError::UnhandledStatus(response.status().as_u16()));
    }

    // Header-name lookup is case-insensitive: reqwest normalizes names.
    let validator = response
        .headers()
        .get(LAST_MODIFIED)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let body = read_limited_bytes(response, MAX_FEED_SIZE).await?;

    Ok(FetchOutcome::Fetched { body, validator })
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}

//! Feed retrieval over HTTP(S).
//!
//! The fetcher never buffers a response body: it hands the byte stream to
//! the parser so memory stays bounded for large feeds. Timeouts are fixed
//! (connect 15s, read 10s) and enforced at the client; nothing above the
//! fetcher adds its own timeout.

use std::time::Duration;

use futures::TryStreamExt;
use thiserror::Error;
use tokio::io::AsyncBufRead;
use tokio_util::io::StreamReader;
use url::Url;

/// Maximum time to establish a connection
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
/// Maximum idle time between response bytes
pub const READ_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Error Types
// ============================================================================

/// Errors surfaced by a fetch attempt.
///
/// All of these are retryable from the caller's point of view: the next
/// scheduled or user-triggered ingestion simply tries again. Nothing here
/// is fatal to the process.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The feed URL could not be parsed at all
    #[error("Invalid feed URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        source: url::ParseError,
    },

    /// Connect or read deadline exceeded
    #[error("Request timed out")]
    Timeout,

    /// Network-level error (DNS, connection, TLS, transport)
    #[error("Request failed: {0}")]
    Network(reqwest::Error),

    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
}

impl FetchError {
    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Network(err)
        }
    }
}

// ============================================================================
// Fetcher
// ============================================================================

/// HTTP retrieval of feed documents.
///
/// Holds a configured `reqwest::Client`; cloning shares the connection pool.
#[derive(Clone)]
pub struct FeedFetcher {
    client: reqwest::Client,
}

impl Default for FeedFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedFetcher {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .read_timeout(READ_TIMEOUT)
            .build()
            // Building only fails on TLS backend misconfiguration, which is
            // a broken install rather than a runtime condition
            .unwrap_or_default();
        Self { client }
    }

    /// Reuse an externally configured client (shared with the image cache)
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// GET the feed and return its body as a buffered byte stream.
    ///
    /// The response is validated for a 2xx status before any body bytes are
    /// consumed; the stream is handed off unread so the parser drives it.
    pub async fn fetch(&self, url: &str) -> Result<impl AsyncBufRead + Unpin, FetchError> {
        let parsed = Url::parse(url).map_err(|source| FetchError::InvalidUrl {
            url: url.to_string(),
            source,
        })?;

        tracing::debug!(url = %parsed, "fetching feed");
        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(FetchError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let stream = response
            .bytes_stream()
            .map_err(std::io::Error::other);
        Ok(StreamReader::new(stream))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::parser;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const VALID_RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <item><guid>1</guid><title>Test</title></item>
</channel></rss>"#;

    #[tokio::test]
    async fn test_fetch_streams_into_parser() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(VALID_RSS)
                    .insert_header("Content-Type", "application/xml"),
            )
            .mount(&mock_server)
            .await;

        let fetcher = FeedFetcher::new();
        let stream = fetcher
            .fetch(&format!("{}/rss.xml", mock_server.uri()))
            .await
            .unwrap();
        let articles = parser::parse(stream).await.unwrap();

        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].id, "1");
    }

    #[tokio::test]
    async fn test_fetch_non_2xx_is_http_status_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let fetcher = FeedFetcher::new();
        let err = fetcher
            .fetch(&format!("{}/rss.xml", mock_server.uri()))
            .await
            .err()
            .unwrap();

        match err {
            FetchError::HttpStatus(404) => {}
            e => panic!("Expected HttpStatus(404), got {:?}", e),
        }
    }

    #[tokio::test]
    async fn test_fetch_malformed_url() {
        let fetcher = FeedFetcher::new();
        let err = fetcher.fetch("not a url at all").await.err().unwrap();
        assert!(matches!(err, FetchError::InvalidUrl { .. }));
    }

    #[tokio::test]
    async fn test_fetch_connection_refused_is_network_error() {
        // Port 1 is essentially never listening
        let fetcher = FeedFetcher::new();
        let err = fetcher.fetch("http://127.0.0.1:1/rss.xml").await.err().unwrap();
        assert!(matches!(
            err,
            FetchError::Network(_) | FetchError::Timeout
        ));
    }
}

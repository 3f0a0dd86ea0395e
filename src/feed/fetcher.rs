use std::time::Duration;

use futures::StreamExt;
use thiserror::Error;

use super::parser::{parse_feed, ParseResult};
use super::source::FetchedFeed;
use crate::util::{validate_url, UrlPolicy};

pub(crate) const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB
pub(crate) const MAX_PAGE_SIZE: usize = 5 * 1024 * 1024; // 5MB

/// Why a feed or page could not be retrieved.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Malformed URL, or a host refused by the [`UrlPolicy`]
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// Non-2xx status, after retries for 5xx
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Request timed out")]
    Timeout,
    /// Body is neither RSS, Atom nor JSON Feed
    #[error("Parse error: {0}")]
    Parse(String),
    /// Still 429 after every retry
    #[error("Rate limited after {0} retries")]
    RateLimited(u32),
    #[error("Response too large")]
    ResponseTooLarge,
    /// Fewer body bytes than announced by Content-Length
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

/// Timeout and retry behaviour of outgoing requests.
#[derive(Debug, Clone, Copy)]
pub struct FetchSettings {
    /// Per-request timeout, covering connect and body download
    pub timeout: Duration,
    /// Retries on 429, 5xx and truncated bodies
    pub max_retries: u32,
    /// First backoff delay; doubles on every retry
    pub backoff_base: Duration,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 3,
            backoff_base: Duration::from_secs(2),
        }
    }
}

/// Validates `url` under `policy`, mapping failures to [`FetchError::InvalidUrl`].
pub(crate) fn checked_url(url: &str, policy: UrlPolicy) -> Result<url::Url, FetchError> {
    validate_url(url, policy).map_err(|e| FetchError::InvalidUrl(format!("{url}: {e}")))
}

/// Fetches and parses the feed at `feed_url`.
///
/// - Rate limiting (HTTP 429) and server errors (5xx) back off exponentially
///   up to `settings.max_retries` times
/// - 4xx responses fail immediately with [`FetchError::HttpStatus`]
/// - Bodies over 10MB fail with [`FetchError::ResponseTooLarge`]
/// - Truncated bodies are retried like server errors
pub async fn fetch_feed(
    client: &reqwest::Client,
    feed_url: &str,
    policy: UrlPolicy,
    settings: &FetchSettings,
) -> Result<FetchedFeed, FetchError> {
    let url = checked_url(feed_url, policy)?;
    let mut attempt = 0;

    let bytes = loop {
        let response = send_with_retry(client, url.as_str(), settings).await?;
        match read_limited_bytes(response, MAX_FEED_SIZE).await {
            Ok(bytes) => break bytes,
            Err(FetchError::IncompleteResponse { expected, received })
                if attempt < settings.max_retries =>
            {
                let delay = backoff(settings, attempt);
                tracing::debug!(
                    feed = %feed_url,
                    expected = expected,
                    received = received,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying incomplete download"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    };

    let ParseResult { feed, skipped } =
        parse_feed(&bytes).map_err(|e| FetchError::Parse(e.to_string()))?;

    if skipped > 0 {
        tracing::warn!(
            feed = %feed_url,
            skipped = skipped,
            "Entries without links skipped"
        );
    }

    Ok(feed)
}

/// Sends a GET, retrying 429 and 5xx responses with exponential backoff.
///
/// Returns the first successful response; 4xx responses fail immediately.
pub(crate) async fn send_with_retry(
    client: &reqwest::Client,
    url: &str,
    settings: &FetchSettings,
) -> Result<reqwest::Response, FetchError> {
    let mut attempt = 0;

    loop {
        let response = send_once(client, url, settings).await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let rate_limited = status == reqwest::StatusCode::TOO_MANY_REQUESTS;
        if !rate_limited && !status.is_server_error() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }
        if attempt >= settings.max_retries {
            return Err(if rate_limited {
                FetchError::RateLimited(settings.max_retries)
            } else {
                FetchError::HttpStatus(status.as_u16())
            });
        }

        let delay = backoff(settings, attempt);
        tracing::warn!(
            url = %url,
            status = %status,
            attempt = attempt + 1,
            delay_ms = delay.as_millis() as u64,
            "Retrying after HTTP error"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

/// Sends a single GET bounded by the configured timeout.
pub(crate) async fn send_once(
    client: &reqwest::Client,
    url: &str,
    settings: &FetchSettings,
) -> Result<reqwest::Response, FetchError> {
    tokio::time::timeout(settings.timeout, client.get(url).send())
        .await
        .map_err(|_| FetchError::Timeout)?
        .map_err(FetchError::Network)
}

fn backoff(settings: &FetchSettings, attempt: u32) -> Duration {
    settings.backoff_base.saturating_mul(2u32.saturating_pow(attempt))
}

/// Reads a response body, refusing more than `limit` bytes.
pub(crate) async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    if let Some(len) = expected_length {
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

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{any, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const VALID_RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <title>Test</title>
    <item><title>Entry</title><link>https://example.com/1</link></item>
</channel></rss>"#;

    fn fast_settings() -> FetchSettings {
        FetchSettings {
            timeout: Duration::from_secs(5),
            max_retries: 3,
            backoff_base: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(VALID_RSS)
                    .insert_header("Content-Type", "application/xml"),
            )
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let url = format!("{}/feed", mock_server.uri());
        let feed = fetch_feed(&client, &url, UrlPolicy::PERMISSIVE, &fast_settings())
            .await
            .unwrap();

        assert_eq!(feed.title, "Test");
        assert_eq!(feed.entries.len(), 1);
        assert_eq!(feed.entries[0].url, "https://example.com/1");
    }

    #[tokio::test]
    async fn test_fetch_refuses_local_host_under_strict_policy() {
        let client = reqwest::Client::new();
        let result = fetch_feed(
            &client,
            "http://127.0.0.1:9/feed",
            UrlPolicy::STRICT,
            &fast_settings(),
        )
        .await;
        assert!(matches!(result, Err(FetchError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_fetch_404_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let url = format!("{}/feed", mock_server.uri());
        let result = fetch_feed(&client, &url, UrlPolicy::PERMISSIVE, &fast_settings()).await;

        match result {
            Err(FetchError::HttpStatus(404)) => {}
            other => panic!("Expected HttpStatus(404), got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_500_error_retries_then_fails() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(4) // Initial request + 3 retries
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let url = format!("{}/feed", mock_server.uri());
        let result = fetch_feed(&client, &url, UrlPolicy::PERMISSIVE, &fast_settings()).await;

        match result {
            Err(FetchError::HttpStatus(500)) => {}
            other => panic!("Expected HttpStatus(500), got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_429_gives_up_as_rate_limited() {
        let mock_server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(429))
            .expect(4)
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let url = format!("{}/feed", mock_server.uri());
        let result = fetch_feed(&client, &url, UrlPolicy::PERMISSIVE, &fast_settings()).await;

        assert!(matches!(result, Err(FetchError::RateLimited(3))));
    }

    #[tokio::test]
    async fn test_fetch_503_retry_then_success() {
        let mock_server = MockServer::start().await;

        Mock::given(any())
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&mock_server)
            .await;

        Mock::given(any())
            .respond_with(ResponseTemplate::new(200).set_body_string(VALID_RSS))
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let url = format!("{}/feed", mock_server.uri());
        let feed = fetch_feed(&client, &url, UrlPolicy::PERMISSIVE, &fast_settings())
            .await
            .unwrap();
        assert_eq!(feed.entries.len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_feed_parse_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<not valid xml"))
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let url = format!("{}/feed", mock_server.uri());
        let result = fetch_feed(&client, &url, UrlPolicy::PERMISSIVE, &fast_settings()).await;

        assert!(matches!(result, Err(FetchError::Parse(_))));
    }

    #[tokio::test]
    async fn test_empty_feed_success() {
        let empty_rss = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>Empty</title></channel></rss>"#;

        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(empty_rss))
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let url = format!("{}/feed", mock_server.uri());
        let feed = fetch_feed(&client, &url, UrlPolicy::PERMISSIVE, &fast_settings())
            .await
            .unwrap();
        assert_eq!(feed.title, "Empty");
        assert!(feed.entries.is_empty());
    }

    #[test]
    fn test_backoff_doubles() {
        let settings = FetchSettings {
            backoff_base: Duration::from_millis(100),
            ..FetchSettings::default()
        };
        assert_eq!(backoff(&settings, 0), Duration::from_millis(100));
        assert_eq!(backoff(&settings, 1), Duration::from_millis(200));
        assert_eq!(backoff(&settings, 3), Duration::from_millis(800));
    }
}

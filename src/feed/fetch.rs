use futures::StreamExt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Default per-request timeout for feed and discovery fetches.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);
/// Default response body limit (10MB).
pub const DEFAULT_MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

/// Errors that can occur while fetching a URL.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// Request exceeded the caller-supplied timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    /// Response body exceeded the configured size limit
    #[error("Response too large (limit {0} bytes)")]
    ResponseTooLarge(usize),
    /// The URL could not be parsed
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Per-request fetch options.
///
/// Redirects are never followed: a 3xx comes back as the response itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    /// Upper bound for the whole request, body included.
    pub timeout: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}

/// A fully-read HTTP response.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    /// Lowercased `Content-Type` header, empty when absent.
    pub content_type: String,
    pub body: Vec<u8>,
    /// URL the response was served from.
    pub final_url: String,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }
}

/// HTTP fetch capability consumed by discovery and the parse cache.
///
/// Implementations own connection management; callers only see whole responses.
pub trait Fetcher: Send + Sync + 'static {
    fn fetch(
        &self,
        url: &str,
        options: FetchOptions,
    ) -> impl Future<Output = Result<FetchResponse, FetchError>> + Send;
}

/// [`Fetcher`] backed by `reqwest`, with redirects disabled.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    max_body_size: usize,
}

impl HttpFetcher {
    /// Builds a fetcher whose responses are capped at `max_body_size` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Network`] if the TLS backend cannot be initialised.
    pub fn new(max_body_size: usize) -> Result<Self, FetchError> {
        let user_agent = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            client,
            max_body_size,
        })
    }

    async fn fetch_inner(&self, url: &str) -> Result<FetchResponse, FetchError> {
        let url = url::Url::parse(url)?;
        let response = self.client.get(url).send().await?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_lowercase();

        let body = read_limited_bytes(response, self.max_body_size).await?;

        Ok(FetchResponse {
            status,
            content_type,
            body,
            final_url,
        })
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, options: FetchOptions) -> Result<FetchResponse, FetchError> {
        tokio::time::timeout(options.timeout, self.fetch_inner(url))
            .await
            .map_err(|_| FetchError::Timeout(options.timeout))?
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge(limit));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_fetch_reads_status_type_and_body() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<rss/>")
                    .insert_header("Content-Type", "Application/RSS+XML; charset=utf-8"),
            )
            .mount(&mock_server)
            .await;

        let fetcher = HttpFetcher::new(DEFAULT_MAX_BODY_SIZE).unwrap();
        let url = format!("{}/feed", mock_server.uri());
        let response = fetcher.fetch(&url, FetchOptions::default()).await.unwrap();

        assert_eq!(response.status, 200);
        assert!(response.is_success());
        assert_eq!(response.content_type, "application/rss+xml; charset=utf-8");
        assert_eq!(response.body, b"<rss/>");
        assert_eq!(response.final_url, url);
    }

    #[tokio::test]
    async fn test_redirect_not_followed() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/old"))
            .respond_with(
                ResponseTemplate::new(301)
                    .insert_header("Location", format!("{}/new", mock_server.uri()).as_str()),
            )
            .mount(&mock_server)
            .await;

        let fetcher = HttpFetcher::new(DEFAULT_MAX_BODY_SIZE).unwrap();
        let response = fetcher
            .fetch(&format!("{}/old", mock_server.uri()), FetchOptions::default())
            .await
            .unwrap();

        assert_eq!(response.status, 301);
        assert!(response.is_redirect());
    }

    #[tokio::test]
    async fn test_oversized_body_rejected() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(64)))
            .mount(&mock_server)
            .await;

        let fetcher = HttpFetcher::new(16).unwrap();
        let result = fetcher
            .fetch(&mock_server.uri(), FetchOptions::default())
            .await;

        assert!(matches!(result, Err(FetchError::ResponseTooLarge(16))));
    }

    #[tokio::test]
    async fn test_slow_response_times_out() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&mock_server)
            .await;

        let fetcher = HttpFetcher::new(DEFAULT_MAX_BODY_SIZE).unwrap();
        let options = FetchOptions {
            timeout: Duration::from_millis(50),
        };
        let result = fetcher.fetch(&mock_server.uri(), options).await;

        assert!(matches!(result, Err(FetchError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_unparseable_url_rejected() {
        let fetcher = HttpFetcher::new(DEFAULT_MAX_BODY_SIZE).unwrap();
        let result = fetcher.fetch("not a url", FetchOptions::default()).await;
        assert!(matches!(result, Err(FetchError::InvalidUrl(_))));
    }
}

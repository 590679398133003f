//! Media endpoint HTTP client
//!
//! Wraps `reqwest::Client` with base URL construction, an optional bearer
//! token and automatic handling of `429 Too Many Requests`.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use photosync_remote::client::MediaClient;
//!
//! let client = MediaClient::new("https://media.example.com/upload")
//!     .with_access_token("token");
//! assert_eq!(client.base_url(), "https://media.example.com/upload");
//! ```

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use tracing::{debug, info, warn};

use crate::RemoteError;

/// Default retry-after duration when the header is missing
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(30);

/// Upper bound on a server-requested wait
const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Maximum number of retries for 429 responses
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Largest response body kept in error messages
const MAX_ERROR_BODY: usize = 512;

/// HTTP client for the media endpoint
#[derive(Debug, Clone)]
pub struct MediaClient {
    /// The underlying HTTP client
    client: Client,
    /// Base URL, without trailing slash
    base_url: String,
    /// Optional bearer token
    access_token: Option<String>,
    /// Retries allowed for 429 responses
    max_retries: u32,
}

impl MediaClient {
    /// Creates a new client for the given base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    /// Creates a client around an existing `reqwest::Client`
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: None,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Sets the bearer token sent with every request
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Sets how many times a 429 response is retried
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Returns the base URL for requests
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Creates a request builder for `path`, relative to the base URL
    ///
    /// Adds the Authorization header when a token is configured.
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let builder = self.client.request(method, &url);
        match self.access_token {
            Some(ref token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Sends a request built by `build`, retrying on 429
    ///
    /// `build` is called once per attempt since request bodies are consumed
    /// by sending. Non-429 responses are returned as-is; callers classify
    /// them with [`check_status`].
    pub async fn execute_with_retry<F>(&self, build: F) -> Result<Response, RemoteError>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            let response = build().send().await?;

            if response.status() != StatusCode::TOO_MANY_REQUESTS {
                if attempt > 0 {
                    info!(attempt, "Request succeeded after retry");
                }
                return Ok(response);
            }

            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(|v| parse_retry_after(v, DEFAULT_RETRY_AFTER))
                .unwrap_or(DEFAULT_RETRY_AFTER);

            if attempt >= self.max_retries {
                warn!(attempts = attempt + 1, "429 retry limit exhausted");
                return Err(RemoteError::TooManyRequests { retry_after });
            }

            info!(
                attempt,
                retry_after_ms = retry_after.as_millis() as u64,
                "Received 429, backing off"
            );
            tokio::time::sleep(retry_after).await;
            attempt += 1;
        }
    }
}

/// Maps an error status to a [`RemoteError`], passing success through
pub async fn check_status(response: Response) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    debug!(status = status.as_u16(), "Request failed");

    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RemoteError::Unauthorized(body),
        s if s.is_server_error() => RemoteError::ServerError(format!("{}: {}", s.as_u16(), body)),
        s => RemoteError::Rejected {
            status: s.as_u16(),
            body,
        },
    })
}

/// Parses the Retry-After header value
///
/// The header can be either:
/// - An integer number of seconds (e.g., "30")
/// - An HTTP-date (e.g., "Fri, 31 Dec 2027 23:59:59 GMT"), converted to seconds from now
///
/// Falls back to the default duration if parsing fails. Waits are capped
/// at one hour.
pub fn parse_retry_after(value: &str, default: Duration) -> Duration {
    if let Ok(seconds) = value.trim().parse::<u64>() {
        return Duration::from_secs(seconds).min(MAX_RETRY_AFTER);
    }

    if let Ok(date) = chrono::DateTime::parse_from_rfc2822(value.trim()) {
        let wait = date.with_timezone(&chrono::Utc) - chrono::Utc::now();
        if let Ok(wait) = wait.to_std() {
            return wait.min(MAX_RETRY_AFTER);
        }
        return Duration::ZERO;
    }

    warn!(value, "Could not parse Retry-After header, using default");
    default
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_parse_retry_after_seconds() {
        let d = parse_retry_after("30", DEFAULT_RETRY_AFTER);
        assert_eq!(d, Duration::from_secs(30));
        let d = parse_retry_after(" 7 ", DEFAULT_RETRY_AFTER);
        assert_eq!(d, Duration::from_secs(7));
        let d = parse_retry_after("999999", DEFAULT_RETRY_AFTER);
        assert_eq!(d, MAX_RETRY_AFTER);
    }

    #[test]
    fn test_parse_retry_after_past_date_is_zero() {
        let d = parse_retry_after("Mon, 01 Jan 2001 00:00:00 GMT", DEFAULT_RETRY_AFTER);
        assert_eq!(d, Duration::ZERO);
    }

    #[test]
    fn test_parse_retry_after_garbage_uses_default() {
        let d = parse_retry_after("soon", Duration::from_secs(9));
        assert_eq!(d, Duration::from_secs(9));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = MediaClient::new("http://localhost:9/upload/");
        assert_eq!(client.base_url(), "http://localhost:9/upload");
    }

    #[tokio::test]
    async fn test_request_adds_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ping"))
            .and(header("Authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let client = MediaClient::new(server.uri()).with_access_token("secret");
        let response = client.request(Method::GET, "/ping").send().await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_execute_with_retry_gives_up_after_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/busy"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
            .expect(3)
            .mount(&server)
            .await;

        let client = MediaClient::new(server.uri()).with_max_retries(2);
        let err = client
            .execute_with_retry(|| client.request(Method::GET, "busy"))
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::TooManyRequests { .. }));
    }

    #[tokio::test]
    async fn test_check_status_classifies_errors() {
        let server = MockServer::start().await;
        for (route, status) in [("/auth", 401), ("/boom", 503), ("/bad", 413)] {
            Mock::given(method("GET"))
                .and(path(route))
                .respond_with(ResponseTemplate::new(status).set_body_string("nope"))
                .mount(&server)
                .await;
        }
        let client = MediaClient::new(server.uri());

        let send = |p: &'static str| client.request(Method::GET, p).send();
        let err = check_status(send("auth").await.unwrap()).await.unwrap_err();
        assert!(matches!(err, RemoteError::Unauthorized(_)));
        let err = check_status(send("boom").await.unwrap()).await.unwrap_err();
        assert!(matches!(err, RemoteError::ServerError(_)));
        let err = check_status(send("bad").await.unwrap()).await.unwrap_err();
        assert!(matches!(err, RemoteError::Rejected { status: 413, .. }));
    }
}

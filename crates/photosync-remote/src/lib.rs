//! PhotoSync Remote - HTTP uploader
//!
//! Implements the `Uploader` port from `photosync-core` against a plain
//! HTTP media endpoint: the staged payload is `PUT` to
//! `{endpoint}/{staged file name}` and the response names the final
//! remote locator.
//!
//! ## Modules
//!
//! - [`client`] - HTTP client with auth header and 429 handling
//! - [`upload`] - `Uploader` implementation

pub mod client;
pub mod upload;

pub use client::MediaClient;
pub use upload::HttpUploader;

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when talking to the media endpoint
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Credentials are missing, invalid or expired (401/403)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Rate limit exceeded and the retry budget is spent
    #[error("Too many requests, retry after {retry_after:?}")]
    TooManyRequests {
        /// Duration the server asked us to wait
        retry_after: Duration,
    },

    /// A server-side error occurred (5xx)
    #[error("Server error: {0}")]
    ServerError(String),

    /// The server refused the payload (other 4xx)
    #[error("Upload rejected with status {status}: {body}")]
    Rejected {
        /// HTTP status code
        status: u16,
        /// Response body, truncated
        body: String,
    },

    /// A network-level error occurred
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// The response did not name a locator
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

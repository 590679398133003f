//! Uploader port implementation over HTTP
//!
//! Each staged payload is sent as a single `PUT {endpoint}/{file name}`
//! request with the raw bytes as body. The remote locator is taken from the
//! response:
//! 1. a JSON body with a `url` (or `location`) string field, else
//! 2. the `Location` header, else
//! 3. the request URL itself when the server answers `201 Created`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{header, Method, Response, StatusCode};
use serde::Deserialize;
use tracing::debug;

use photosync_core::domain::{MediaKind, RemoteLocator};
use photosync_core::ports::{StagedPayload, Uploader};

use crate::client::{check_status, MediaClient};
use crate::RemoteError;

/// Header carrying the record id alongside the payload
pub const RECORD_ID_HEADER: &str = "X-Record-Id";

/// Body of a successful upload response
#[derive(Debug, Deserialize)]
struct UploadResponse {
    url: Option<String>,
    location: Option<String>,
}

/// `Uploader` that PUTs staged payloads to an HTTP endpoint
#[derive(Debug, Clone)]
pub struct HttpUploader {
    client: MediaClient,
}

impl HttpUploader {
    pub fn new(client: MediaClient) -> Self {
        Self { client }
    }

    /// Builds an uploader from the configured endpoint and optional token
    pub fn from_endpoint(endpoint: &str, access_token: Option<&str>) -> Self {
        let mut client = MediaClient::new(endpoint);
        if let Some(token) = access_token {
            client = client.with_access_token(token);
        }
        Self::new(client)
    }

    pub fn client(&self) -> &MediaClient {
        &self.client
    }
}

fn content_type(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Image => "image/jpeg",
        MediaKind::Video => "video/mp4",
        MediaKind::Audio => "audio/mp4",
        MediaKind::Unknown => "application/octet-stream",
    }
}

/// Extracts the remote locator from a successful response
async fn locator_from_response(response: Response) -> Result<RemoteLocator, RemoteError> {
    let status = response.status();
    let request_url = response.url().to_string();
    let location_header = response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let body = response.bytes().await?;
    let from_body = serde_json::from_slice::<UploadResponse>(&body)
        .ok()
        .and_then(|r| r.url.or(r.location));

    let locator = from_body.or(location_header).or_else(|| {
        (status == StatusCode::CREATED).then_some(request_url)
    });

    match locator {
        Some(l) => RemoteLocator::new(l)
            .map_err(|e| RemoteError::InvalidResponse(e.to_string())),
        None => Err(RemoteError::InvalidResponse(format!(
            "status {} carried no locator",
            status.as_u16()
        ))),
    }
}

#[async_trait]
impl Uploader for HttpUploader {
    #[tracing::instrument(skip(self, payload), fields(record_id = %payload.record_id()))]
    async fn upload(&self, payload: &StagedPayload) -> Result<RemoteLocator> {
        let bytes = tokio::fs::read(payload.path())
            .await
            .with_context(|| format!("Failed to read staged payload {}", payload.path().display()))?;
        let file_name = payload.file_name();
        let kind = payload.media_kind();

        debug!(file_name, size = bytes.len(), "Uploading payload");

        let response = self
            .client
            .execute_with_retry(|| {
                self.client
                    .request(Method::PUT, file_name)
                    .header(header::CONTENT_TYPE, content_type(kind))
                    .header(RECORD_ID_HEADER, payload.record_id().as_str())
                    .body(bytes.clone())
            })
            .await
            .context("Upload request failed")?;

        let response = check_status(response)
            .await
            .context("Upload was not accepted")?;
        let locator = locator_from_response(response)
            .await
            .context("Upload response was not understood")?;

        debug!(locator = %locator, "Upload complete");
        Ok(locator)
    }
}

//! Dropbox API v2 client
//!
//! Provides a typed HTTP client for the two Dropbox endpoint styles:
//!
//! - **RPC** (`api.dropboxapi.com`): JSON argument in the body, JSON result
//!   in the body.
//! - **Content** (`content.dropboxapi.com`): JSON argument in the
//!   `Dropbox-API-Arg` header, raw bytes in the body. Downloads report their
//!   metadata in the `Dropbox-API-Result` response header.
//!
//! Every call resolves to `Ok(Some(value))`, `Ok(None)` when the server sent
//! an empty payload, or a [`CallError`]. Interpreting those outcomes is left
//! to the caller.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use harmony_dropbox::client::DropboxClient;
//! use serde_json::Value;
//!
//! # async fn example() -> Result<(), harmony_dropbox::CallError> {
//! let client = DropboxClient::new("access-token-here");
//! let account: Option<Value> = client.rpc("users/get_current_account", &()).await?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::time::Duration;

use futures_util::{stream, StreamExt};
use harmony_core::config::{DEFAULT_API_BASE_URL, DEFAULT_CONTENT_BASE_URL};
use harmony_core::domain::Progress;
use reqwest::{Body, Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::CallError;

/// Header carrying the JSON argument of a content endpoint
const API_ARG_HEADER: &str = "Dropbox-API-Arg";

/// Header carrying the JSON result of a download
const API_RESULT_HEADER: &str = "Dropbox-API-Result";

/// Size of the chunks an upload body is streamed in
const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// Body of an HTTP 409 response
#[derive(Debug, Deserialize)]
struct RouteErrorBody {
    #[serde(default)]
    error_summary: String,
    #[serde(default)]
    error: serde_json::Value,
}

/// A downloaded payload together with the metadata Dropbox reported for it
#[derive(Debug)]
pub struct Download<T> {
    pub metadata: T,
    pub bytes: Vec<u8>,
}

/// HTTP client for Dropbox API calls
///
/// Wraps `reqwest::Client` with the bearer token and the RPC and content
/// base URLs.
pub struct DropboxClient {
    /// The underlying HTTP client
    client: Client,
    /// Base URL for RPC endpoints
    api_base_url: String,
    /// Base URL for upload/download endpoints
    content_base_url: String,
    /// OAuth2 access token
    access_token: String,
}

impl DropboxClient {
    /// Creates a client against the production Dropbox hosts
    pub fn new(access_token: impl Into<String>) -> Self {
        Self::with_base_urls(access_token, DEFAULT_API_BASE_URL, DEFAULT_CONTENT_BASE_URL)
    }

    /// Creates a client with custom base URLs (useful for testing)
    ///
    /// # Arguments
    /// * `access_token` - A valid OAuth2 access token
    /// * `api_base_url` - Base URL for RPC endpoints
    /// * `content_base_url` - Base URL for content endpoints
    pub fn with_base_urls(
        access_token: impl Into<String>,
        api_base_url: impl Into<String>,
        content_base_url: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            api_base_url: trim_base(api_base_url.into()),
            content_base_url: trim_base(content_base_url.into()),
            access_token: access_token.into(),
        }
    }

    /// Updates the access token
    pub fn set_access_token(&mut self, token: impl Into<String>) {
        self.access_token = token.into();
        debug!("Updated DropboxClient access token");
    }

    /// Returns a reference to the current access token
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn api_base_url(&self) -> &str {
        &self.api_base_url
    }

    pub fn content_base_url(&self) -> &str {
        &self.content_base_url
    }

    /// Creates an authenticated POST request for `route` under `base`
    fn request(&self, base: &str, route: &str) -> RequestBuilder {
        let url = format!("{}/2/{}", base, route);
        self.client.post(&url).bearer_auth(&self.access_token)
    }

    /// Calls an RPC endpoint with a JSON argument
    ///
    /// Endpoints without arguments are called with `&()`, which Dropbox
    /// expects as a literal `null` body.
    ///
    /// # Arguments
    /// * `route` - Endpoint route, e.g. `"files/list_folder"`
    /// * `arg` - Serializable argument
    pub async fn rpc<A, T>(&self, route: &str, arg: &A) -> Result<Option<T>, CallError>
    where
        A: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.send_rpc(route, arg).await?;
        let text = response.text().await?;
        decode_body(&text)
    }

    /// Calls an RPC endpoint whose result is not needed
    pub async fn rpc_unit<A>(&self, route: &str, arg: &A) -> Result<(), CallError>
    where
        A: Serialize + ?Sized,
    {
        self.send_rpc(route, arg).await?;
        Ok(())
    }

    async fn send_rpc<A>(&self, route: &str, arg: &A) -> Result<Response, CallError>
    where
        A: Serialize + ?Sized,
    {
        debug!(route, "Dropbox RPC call");
        let body = serde_json::to_vec(arg)?;

        let response = self
            .request(&self.api_base_url, route)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        check_status(route, response).await
    }

    /// Uploads `data` to a content endpoint
    ///
    /// The body is streamed in chunks; each chunk handed to the transport
    /// advances `progress` by its length.
    ///
    /// # Arguments
    /// * `route` - Endpoint route, e.g. `"files/upload"`
    /// * `arg` - Argument sent in the `Dropbox-API-Arg` header
    /// * `data` - Bytes to upload
    /// * `progress` - Optional byte-level progress to advance
    pub async fn upload<A, T>(
        &self,
        route: &str,
        arg: &A,
        data: Vec<u8>,
        progress: Option<&Progress>,
    ) -> Result<Option<T>, CallError>
    where
        A: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let total = data.len();
        debug!(route, bytes = total, "Dropbox upload");

        let chunks: Vec<Vec<u8>> = data.chunks(UPLOAD_CHUNK_SIZE).map(<[u8]>::to_vec).collect();
        let tracker = progress.cloned();
        if let Some(progress) = &tracker {
            progress.set_total(total as u64);
        }
        let body = stream::iter(chunks).map(move |chunk| {
            if let Some(progress) = &tracker {
                progress.add_completed(chunk.len() as u64);
            }
            Ok::<_, std::io::Error>(chunk)
        });

        let response = self
            .request(&self.content_base_url, route)
            .header(API_ARG_HEADER, api_arg_header(arg)?)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(Body::wrap_stream(body))
            .send()
            .await?;

        let response = check_status(route, response).await?;
        let text = response.text().await?;
        decode_body(&text)
    }

    /// Downloads from a content endpoint into memory
    ///
    /// Returns `Ok(None)` when the server omitted the `Dropbox-API-Result`
    /// header. When the response announces a length, `progress` switches to
    /// counting bytes.
    pub async fn download<A, T>(
        &self,
        route: &str,
        arg: &A,
        progress: Option<&Progress>,
    ) -> Result<Option<Download<T>>, CallError>
    where
        A: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let (metadata, response) = self.open_download(route, arg).await?;
        let Some(metadata) = metadata else {
            return Ok(None);
        };

        let mut tracker = BodyProgress::new(progress, response.content_length());
        let mut bytes = Vec::new();
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            tracker.advance(chunk.len());
            bytes.extend_from_slice(&chunk);
        }
        tracker.finish();

        debug!(route, bytes = bytes.len(), "Dropbox download finished");
        Ok(Some(Download { metadata, bytes }))
    }

    /// Downloads from a content endpoint, writing the body to `destination`
    /// chunk by chunk as it arrives
    ///
    /// Nothing is written when the `Dropbox-API-Result` header is missing.
    /// A failure part-way leaves a partial file behind for the caller to
    /// remove.
    pub async fn download_to_file<A, T>(
        &self,
        route: &str,
        arg: &A,
        destination: &Path,
        progress: Option<&Progress>,
    ) -> Result<Option<T>, CallError>
    where
        A: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let (metadata, response) = self.open_download(route, arg).await?;
        let Some(metadata) = metadata else {
            return Ok(None);
        };

        let mut tracker = BodyProgress::new(progress, response.content_length());
        let mut file = File::create(destination).await?;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            tracker.advance(chunk.len());
        }
        file.flush().await?;
        tracker.finish();

        debug!(
            route,
            bytes = tracker.received,
            destination = %destination.display(),
            "Dropbox download finished"
        );
        Ok(Some(metadata))
    }

    /// Sends a download request and decodes its result header
    async fn open_download<A, T>(
        &self,
        route: &str,
        arg: &A,
    ) -> Result<(Option<T>, Response), CallError>
    where
        A: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug!(route, "Dropbox download");

        let response = self
            .request(&self.content_base_url, route)
            .header(API_ARG_HEADER, api_arg_header(arg)?)
            .send()
            .await?;
        let response = check_status(route, response).await?;

        let metadata = match response.headers().get(API_RESULT_HEADER) {
            Some(value) => match value.to_str() {
                Ok(text) => decode_body::<T>(text)?,
                Err(_) => {
                    warn!(route, "Non-ASCII {} header", API_RESULT_HEADER);
                    None
                }
            },
            None => None,
        };
        Ok((metadata, response))
    }
}

/// Byte progress of a response body whose length may not be announced
struct BodyProgress<'a> {
    progress: Option<&'a Progress>,
    announced: bool,
    received: u64,
}

impl<'a> BodyProgress<'a> {
    fn new(progress: Option<&'a Progress>, content_length: Option<u64>) -> Self {
        if let (Some(progress), Some(length)) = (progress, content_length) {
            progress.set_total(length);
        }
        Self {
            progress,
            announced: content_length.is_some(),
            received: 0,
        }
    }

    fn advance(&mut self, len: usize) {
        self.received += len as u64;
        if let (true, Some(progress)) = (self.announced, self.progress) {
            progress.add_completed(len as u64);
        }
    }

    /// Without an announced length the total is only known once the body ends
    fn finish(&self) {
        if let (false, Some(progress)) = (self.announced, self.progress) {
            progress.set_total(self.received);
            progress.complete();
        }
    }
}

fn trim_base(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

/// Decodes a JSON payload, treating an empty body or `null` as no payload
fn decode_body<T: DeserializeOwned>(text: &str) -> Result<Option<T>, CallError> {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(trimmed)?))
}

/// Maps a non-success response onto a [`CallError`]
async fn check_status(route: &str, response: Response) -> Result<Response, CallError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after);
    let body = response.text().await.unwrap_or_default();

    warn!(route, status = status.as_u16(), "Dropbox call failed");

    let error = match status {
        StatusCode::CONFLICT => match serde_json::from_str::<RouteErrorBody>(&body) {
            Ok(route_error) => CallError::Route {
                summary: route_error.error_summary,
                error: route_error.error,
            },
            Err(e) => CallError::Decode(e),
        },
        StatusCode::UNAUTHORIZED => CallError::Unauthorized(body),
        StatusCode::FORBIDDEN => CallError::Forbidden(body),
        StatusCode::TOO_MANY_REQUESTS => CallError::RateLimited { retry_after },
        StatusCode::BAD_REQUEST => CallError::BadInput(body),
        _ => CallError::Http {
            status: status.as_u16(),
            body,
        },
    };
    Err(error)
}

/// Parses a `Retry-After` header given in whole seconds
fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Serializes a content-endpoint argument for the `Dropbox-API-Arg` header
///
/// HTTP headers must be ASCII, so every character outside it (and DEL) is
/// written as a JSON `\uXXXX` escape.
pub(crate) fn api_arg_header<A: Serialize + ?Sized>(arg: &A) -> Result<String, CallError> {
    let json = serde_json::to_string(arg)?;
    let mut escaped = String::with_capacity(json.len());
    for c in json.chars() {
        if c.is_ascii() && c != '\u{7f}' {
            escaped.push(c);
        } else {
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                escaped.push_str(&format!("\\u{:04x}", unit));
            }
        }
    }
    Ok(escaped)
}

//! Harmony Dropbox - Dropbox API v2 sync service
//!
//! Implements [`harmony_core::ports::ISyncService`] on top of Dropbox:
//! - Typed HTTP client for RPC and content endpoints
//! - Cursor-based change enumeration with resumable change tokens
//! - Property-template (metadata schema) negotiation and caching
//! - Record and file upload/download/delete with revision pinning
//! - Translation of every Dropbox outcome into `ServiceError`
//!
//! ## Modules
//!
//! - [`client`] - Dropbox API HTTP client
//! - [`changes`] - Incremental listing and change tokens
//! - [`schema`] - Property template negotiation
//! - [`service`] - The `ISyncService` implementation and session lifecycle
//! - [`credentials`] - Persisted account identifier and access token

pub mod changes;
pub mod client;
pub mod credentials;
pub mod paths;
pub mod schema;
pub mod service;

mod files;
mod records;
mod translate;
mod versions;
mod wire;

use std::time::Duration;

use thiserror::Error;

pub use client::DropboxClient;
pub use credentials::{CredentialStore, KeyringCredentialStore, MemoryCredentialStore};
pub use service::{DropboxService, Session};

/// Errors returned by a single Dropbox API call
#[derive(Debug, Error)]
pub enum CallError {
    /// Endpoint-specific error (HTTP 409), e.g. `path/not_found/..`
    #[error("Route error: {summary}")]
    Route {
        /// Slash-separated tag summary reported by Dropbox
        summary: String,
        /// Structured error body
        error: serde_json::Value,
    },

    /// The access token is missing, invalid or expired (HTTP 401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The app lacks permission for the call (HTTP 403)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Rate limit exceeded (HTTP 429)
    #[error("Too many requests, retry after {retry_after:?}")]
    RateLimited {
        /// Delay requested by the server, if any
        retry_after: Option<Duration>,
    },

    /// The request was malformed (HTTP 400)
    #[error("Bad input: {0}")]
    BadInput(String),

    /// Any other non-success status
    #[error("HTTP {status}: {body}")]
    Http {
        /// Status code
        status: u16,
        /// Response body text
        body: String,
    },

    /// A network-level error occurred
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The response could not be decoded
    #[error("Invalid response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Writing a downloaded body to local storage failed
    #[error("Local I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CallError {
    /// Tag path of a route error, e.g. `["path", "not_found"]`
    ///
    /// Uses the error summary when present, otherwise follows the nested
    /// `.tag` fields of the structured error. Empty for non-route errors.
    pub fn route_tags(&self) -> Vec<&str> {
        let Self::Route { summary, error } = self else {
            return Vec::new();
        };

        let from_summary: Vec<&str> = summary
            .split('/')
            .map(str::trim)
            .filter(|s| !s.is_empty() && *s != "..")
            .collect();
        if !from_summary.is_empty() {
            return from_summary;
        }

        let mut tags = Vec::new();
        let mut current = error;
        while let Some(tag) = current.get(".tag").and_then(serde_json::Value::as_str) {
            tags.push(tag);
            match current.get(tag) {
                Some(next) if next.is_object() => current = next,
                _ => break,
            }
        }
        tags
    }

    /// True for `path/not_found` and `path_lookup/not_found` route errors
    pub fn is_not_found(&self) -> bool {
        let tags = self.route_tags();
        matches!(
            tags.as_slice(),
            ["path" | "path_lookup", "not_found", ..]
        )
    }

    /// True when a write was rejected because the target changed
    pub fn is_conflict(&self) -> bool {
        let tags = self.route_tags();
        matches!(tags.as_slice(), ["path", "conflict", ..])
    }
}

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Upstream traffic feed access and alert normalization.
//!
//! An [`IncidentFeed`] produces the raw decoded payload;
//! [`normalize::normalize`] turns that payload into canonical
//! [`Incident`](traffic_incidents_incident_models::Incident)s.

pub mod feed;
pub mod normalize;
pub mod parsing;
pub mod retry;

use async_trait::async_trait;

pub use feed::HttpFeed;
pub use normalize::normalize;

/// Errors that can occur while fetching the upstream feed.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// The server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Status {
        /// Response status code.
        status: u16,
        /// Final request URL.
        url: String,
    },

    /// Retries ran out without a more specific error.
    #[error("Fetch failed: {message}")]
    Exhausted {
        /// Description of what went wrong.
        message: String,
    },
}

/// A source of raw upstream alert payloads.
///
/// The poll loop calls [`fetch`](Self::fetch) once per cycle and hands
/// the decoded body to the normalizer.
#[async_trait]
pub trait IncidentFeed: Send + Sync {
    /// Returns a human-readable description of the feed for logs
    /// (e.g. its URL).
    fn describe(&self) -> &str;

    /// Fetches and decodes one payload.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] on transport failure, non-2xx status, or
    /// an undecodable body.
    async fn fetch(&self) -> Result<serde_json::Value, SourceError>;
}

//! Turning a user's query into something that can be streamed.

mod http;

use crate::audio::{ByteStream, DeclaredFormat};
use async_trait::async_trait;
use reqwest::Error as ReqwestError;
use std::error::Error;
use std::fmt;

pub use http::HttpTrackResolver;

/// What a query resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackMetadata {
    pub canonical_url: String,
    pub title: String,
}

/// Error types for track resolution
#[derive(Debug)]
pub enum ResolveError {
    /// The query matched nothing.
    NotFound(String),
    /// The source exists but cannot be streamed (HTTP error, not audio, ...).
    Unavailable(String),
    Network(ReqwestError),
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ResolveError::Unavailable(msg) => write!(f, "Stream unavailable: {}", msg),
            ResolveError::Network(e) => write!(f, "Network error: {}", e),
        }
    }
}

impl Error for ResolveError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ResolveError::Network(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ReqwestError> for ResolveError {
    fn from(err: ReqwestError) -> Self {
        ResolveError::Network(err)
    }
}

/// Locates tracks and opens their raw byte streams.
#[async_trait]
pub trait TrackResolver: Send + Sync {
    /// Fails with `ResolveError::NotFound` when nothing matches.
    async fn resolve(&self, query: &str) -> Result<TrackMetadata, ResolveError>;

    /// Opens the still-encoded audio behind `canonical_url`.
    async fn open_stream(&self, canonical_url: &str) -> Result<(ByteStream, DeclaredFormat), ResolveError>;
}

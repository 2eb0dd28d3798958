use crate::audio::{AudioError, SinkError};
use crate::resolver::ResolveError;
use crate::session::TenantId;
use std::error::Error;
use std::fmt;

/// Error types surfaced by sessions and the playback service.
#[derive(Debug)]
pub enum PlaybackError {
    /// The query has no match.
    ResolutionError(String),
    /// The source is unreachable or carries no audio.
    StreamUnavailable(String),
    /// The stream could not be decoded.
    UnsupportedFormat(String),
    /// The output connection broke. Fatal to the session.
    SinkWriteError(SinkError),
    SessionNotFound(TenantId),
    /// Joining failed; no session was created.
    SinkConnectError(SinkError),
}

impl PlaybackError {
    /// Failures that only cost the current track; the worker moves on.
    pub fn is_track_local(&self) -> bool {
        matches!(
            self,
            PlaybackError::ResolutionError(_) | PlaybackError::StreamUnavailable(_) | PlaybackError::UnsupportedFormat(_)
        )
    }
}

impl fmt::Display for PlaybackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackError::ResolutionError(msg) => write!(f, "Resolution error: {}", msg),
            PlaybackError::StreamUnavailable(msg) => write!(f, "Stream unavailable: {}", msg),
            PlaybackError::UnsupportedFormat(msg) => write!(f, "Unsupported format: {}", msg),
            PlaybackError::SinkWriteError(e) => write!(f, "Sink write error: {}", e),
            PlaybackError::SessionNotFound(tenant) => write!(f, "No session for tenant {}", tenant),
            PlaybackError::SinkConnectError(e) => write!(f, "Sink connect error: {}", e),
        }
    }
}

impl Error for PlaybackError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PlaybackError::SinkWriteError(e) | PlaybackError::SinkConnectError(e) => Some(e),
            _ => None,
        }
    }
}

// --- From Implementations for PlaybackError ---

impl From<ResolveError> for PlaybackError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::NotFound(msg) => PlaybackError::ResolutionError(msg),
            ResolveError::Unavailable(msg) => PlaybackError::StreamUnavailable(msg),
            ResolveError::Network(e) => PlaybackError::StreamUnavailable(e.to_string()),
        }
    }
}

impl From<AudioError> for PlaybackError {
    fn from(err: AudioError) -> Self {
        match err {
            AudioError::StreamError(_) | AudioError::IoError(_) => PlaybackError::StreamUnavailable(err.to_string()),
            other => PlaybackError::UnsupportedFormat(other.to_string()),
        }
    }
}

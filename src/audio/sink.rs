//! Where frames go: a tenant's live output connection.

use crate::audio::frame::{FrameFormat, PcmFrame};
use crate::session::TenantId;
use async_trait::async_trait;
use std::error::Error;
use std::io;

/// Failures reported by an output sink or the connector that opens one.
#[derive(Debug)]
pub enum SinkError {
    Connect(String),
    Write(String),
    /// The sink was already closed.
    Closed,
    Io(io::Error),
}

impl std::fmt::Display for SinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkError::Connect(e) => write!(f, "Sink connect error: {}", e),
            SinkError::Write(e) => write!(f, "Sink write error: {}", e),
            SinkError::Closed => write!(f, "Sink is closed"),
            SinkError::Io(e) => write!(f, "Sink I/O error: {}", e),
        }
    }
}

impl Error for SinkError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SinkError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for SinkError {
    fn from(e: io::Error) -> Self {
        SinkError::Io(e)
    }
}

/// Accepts PCM frames for one tenant. Any compressed encoding the transport
/// needs happens behind this trait.
///
/// Only the session's worker ever calls into a sink, and `close` is called
/// exactly once, after the worker has stopped writing.
#[async_trait]
pub trait OutputSink: Send {
    /// Writes one frame. May wait when the transport applies backpressure.
    async fn write_frame(&mut self, frame: &PcmFrame) -> Result<(), SinkError>;

    async fn flush(&mut self) -> Result<(), SinkError>;

    async fn close(&mut self) -> Result<(), SinkError>;

    /// The frame shape this sink expects.
    fn frame_format(&self) -> FrameFormat {
        FrameFormat::STANDARD
    }
}

/// Opens an output sink for a tenant (joins the voice channel, opens the
/// file, ...).
#[async_trait]
pub trait VoiceConnector: Send + Sync {
    async fn connect(&self, tenant: TenantId) -> Result<Box<dyn OutputSink>, SinkError>;
}

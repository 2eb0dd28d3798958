use std::error::Error;
use std::io;
use symphonia::core::errors::Error as SymphoniaError;

/// Error types raised while turning a byte stream into PCM frames.
#[derive(Debug)]
pub enum AudioError {
    StreamError(String),
    DecodingError(String),
    SymphoniaError(SymphoniaError),
    IoError(io::Error),
    UnsupportedFormat(String),
    MissingCodecParams(&'static str),
    TaskJoinError(String),
    InitializationError(String),
    ResamplingError(String),
    InvalidFrameFormat(String),
}

impl std::fmt::Display for AudioError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioError::StreamError(e) => write!(f, "Streaming error: {}", e),
            AudioError::DecodingError(e) => write!(f, "Decoding error: {}", e),
            AudioError::SymphoniaError(e) => write!(f, "Symphonia error: {}", e),
            AudioError::IoError(e) => write!(f, "I/O error: {}", e),
            AudioError::UnsupportedFormat(s) => write!(f, "Unsupported format: {}", s),
            AudioError::MissingCodecParams(s) => write!(f, "Missing codec parameters: {}", s),
            AudioError::TaskJoinError(e) => write!(f, "Async task join error: {}", e),
            AudioError::InitializationError(e) => write!(f, "Initialization error: {}", e),
            AudioError::ResamplingError(e) => write!(f, "Resampling error: {}", e),
            AudioError::InvalidFrameFormat(e) => write!(f, "Invalid frame format: {}", e),
        }
    }
}

impl Error for AudioError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AudioError::SymphoniaError(e) => Some(e),
            AudioError::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl AudioError {
    /// True when the failure means the input could never be decoded, as
    /// opposed to a stream that broke part way through.
    pub fn is_unsupported_format(&self) -> bool {
        matches!(
            self,
            AudioError::UnsupportedFormat(_)
                | AudioError::MissingCodecParams(_)
                | AudioError::SymphoniaError(SymphoniaError::Unsupported(_))
        )
    }
}

// --- From Implementations for AudioError ---

impl From<SymphoniaError> for AudioError {
    fn from(e: SymphoniaError) -> Self {
        AudioError::SymphoniaError(e)
    }
}

impl From<io::Error> for AudioError {
    fn from(e: io::Error) -> Self {
        AudioError::IoError(e)
    }
}

impl From<tokio::task::JoinError> for AudioError {
    fn from(e: tokio::task::JoinError) -> Self {
        AudioError::TaskJoinError(e.to_string())
    }
}

impl From<rubato::ResampleError> for AudioError {
    fn from(e: rubato::ResampleError) -> Self {
        AudioError::ResamplingError(e.to_string())
    }
}

impl From<rubato::ResamplerConstructionError> for AudioError {
    fn from(e: rubato::ResamplerConstructionError) -> Self {
        AudioError::InitializationError(format!("Failed to create resampler: {}", e))
    }
}

//! Audio pipeline: byte streams in, fixed-size PCM frames out to a sink.

mod decoder;
mod error;
mod file_sink;
mod frame;
mod processor;
mod sample_converter;
mod sink;
mod stream_wrapper;
mod transcoder;

pub use error::AudioError;
pub use file_sink::{FileSink, FileSinkConnector};
pub use frame::{FrameAssembler, FrameFormat, PcmFrame, BYTES_PER_SAMPLE};
pub use sink::{OutputSink, SinkError, VoiceConnector};
pub use stream_wrapper::ByteStream;
pub use transcoder::{DeclaredFormat, FrameSequence, SymphoniaTranscoder, Transcoder, TranscoderSettings};

//! Byte stream in, fixed-format PCM frames out.

use crate::audio::{
    decoder::{DecodeStep, SymphoniaDecoder},
    error::AudioError,
    frame::{FrameFormat, PcmFrame},
    processor::AudioProcessor,
    stream_wrapper::{ByteStream, ChannelMediaSource, PumpHandle},
};
use async_trait::async_trait;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::probe::Hint;
use tokio::sync::mpsc;
use tokio::task::{self, JoinHandle};
use tracing::{debug, error, info, instrument, trace};

const LOG_TARGET: &str = "r_jukebox::audio::transcoder";

/// What the remote source claims to be carrying. Used only as a probing hint;
/// the decoder still sniffs the actual bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeclaredFormat {
    pub mime_type: Option<String>,
    pub extension: Option<String>,
    pub byte_len: Option<u64>,
}

impl DeclaredFormat {
    pub fn from_mime(mime_type: impl Into<String>) -> Self {
        Self {
            mime_type: Some(mime_type.into()),
            ..Default::default()
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = Some(extension.into());
        self
    }

    pub fn with_byte_len(mut self, byte_len: Option<u64>) -> Self {
        self.byte_len = byte_len;
        self
    }

    fn hint(&self) -> Hint {
        let mut hint = Hint::new();
        if let Some(ext) = &self.extension {
            hint.with_extension(ext);
        }
        if let Some(mime) = &self.mime_type {
            hint.mime_type(mime);
        }
        hint
    }
}

/// A lazy, finite, non-restartable run of frames for one track.
///
/// Dropping the sequence abandons whatever has not been decoded yet.
#[async_trait]
pub trait FrameSequence: Send {
    /// Next frame, or `Ok(None)` once the track is exhausted.
    async fn next_frame(&mut self) -> Result<Option<PcmFrame>, AudioError>;
}

/// Opens byte streams as frame sequences in the sink's format.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Fails with `AudioError::UnsupportedFormat` when nothing decodable is found.
    async fn open(
        &self,
        stream: ByteStream,
        declared: DeclaredFormat,
    ) -> Result<Box<dyn FrameSequence>, AudioError>;

    fn frame_format(&self) -> FrameFormat;
}

/// Tuning knobs for the Symphonia pipeline.
#[derive(Debug, Clone, Copy)]
pub struct TranscoderSettings {
    /// Decoded frames buffered ahead of the consumer.
    pub frame_lookahead: usize,
    /// Raw byte chunks buffered ahead of the decoder.
    pub byte_chunk_capacity: usize,
    pub resampler_chunk_frames: usize,
}

impl Default for TranscoderSettings {
    fn default() -> Self {
        Self {
            frame_lookahead: 50,
            byte_chunk_capacity: 32,
            resampler_chunk_frames: 1024,
        }
    }
}

/// Symphonia + Rubato transcoder.
///
/// Probing and decoding run on blocking threads; frames are handed back
/// through a bounded channel, which caps read-ahead at `frame_lookahead`.
pub struct SymphoniaTranscoder {
    format: FrameFormat,
    settings: TranscoderSettings,
}

impl SymphoniaTranscoder {
    pub fn new(format: FrameFormat, settings: TranscoderSettings) -> Self {
        Self { format, settings }
    }
}

#[async_trait]
impl Transcoder for SymphoniaTranscoder {
    #[instrument(skip(self, stream), fields(mime = ?declared.mime_type, ext = ?declared.extension))]
    async fn open(
        &self,
        stream: ByteStream,
        declared: DeclaredFormat,
    ) -> Result<Box<dyn FrameSequence>, AudioError> {
        let (source, pump) = ChannelMediaSource::spawn(stream, self.settings.byte_chunk_capacity, declared.byte_len);
        let mss = MediaSourceStream::new(Box::new(source), Default::default());
        let hint = declared.hint();

        let probe_result = task::spawn_blocking(move || SymphoniaDecoder::new(mss, hint)).await;
        let decoder = probe_result??;
        let processor = AudioProcessor::new(decoder.sample_rate(), self.format, self.settings.resampler_chunk_frames)?;
        info!(target: LOG_TARGET, "Transcoder opened: source {} Hz, resampling={}", decoder.sample_rate(), processor.is_resampling());

        let (frame_tx, frame_rx) = mpsc::channel(self.settings.frame_lookahead.max(1));
        let decode_task = task::spawn_blocking(move || run_decode_loop(decoder, processor, frame_tx));

        Ok(Box::new(DecodedFrames {
            frames: frame_rx,
            _pump: pump,
            decode_task: Some(decode_task),
        }))
    }

    fn frame_format(&self) -> FrameFormat {
        self.format
    }
}

/// Decodes until the track ends, the consumer goes away, or an error occurs.
fn run_decode_loop(
    mut decoder: SymphoniaDecoder,
    mut processor: AudioProcessor,
    frame_tx: mpsc::Sender<Result<PcmFrame, AudioError>>,
) {
    let mut sent = 0usize;
    loop {
        let frames = match decoder.next_buffer() {
            Ok(DecodeStep::Decoded(planes)) => processor.process(planes),
            Ok(DecodeStep::EndOfStream) => {
                let tail = processor.finish();
                if let Ok(frames) = &tail {
                    debug!(target: LOG_TARGET, "Decoder reached end of stream; {} frames total.", sent + frames.len());
                }
                match tail {
                    Ok(frames) => {
                        for frame in frames {
                            if frame_tx.blocking_send(Ok(frame)).is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        let _ = frame_tx.blocking_send(Err(e));
                    }
                }
                return;
            }
            Err(e) => Err(e),
        };

        match frames {
            Ok(frames) => {
                for frame in frames {
                    if frame_tx.blocking_send(Ok(frame)).is_err() {
                        trace!(target: LOG_TARGET, "Frame consumer dropped after {} frames; abandoning decode.", sent);
                        return;
                    }
                    sent += 1;
                }
            }
            Err(e) => {
                error!(target: LOG_TARGET, "Decode failed after {} frames: {}", sent, e);
                let _ = frame_tx.blocking_send(Err(e));
                return;
            }
        }
    }
}

struct DecodedFrames {
    frames: mpsc::Receiver<Result<PcmFrame, AudioError>>,
    /// Held so the pump stops with the sequence.
    _pump: PumpHandle,
    decode_task: Option<JoinHandle<()>>,
}

#[async_trait]
impl FrameSequence for DecodedFrames {
    async fn next_frame(&mut self) -> Result<Option<PcmFrame>, AudioError> {
        match self.frames.recv().await {
            Some(Ok(frame)) => Ok(Some(frame)),
            Some(Err(e)) => Err(e),
            None => {
                // Channel closed: either a clean end or a panicked decode thread.
                if let Some(handle) = self.decode_task.take() {
                    handle.await?;
                }
                Ok(None)
            }
        }
    }
}

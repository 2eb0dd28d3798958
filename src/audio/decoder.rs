use crate::audio::{error::AudioError, sample_converter};
use std::io;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, info, trace, warn};

const LOG_TARGET: &str = "r_jukebox::audio::decoder";

/// Consecutive corrupt packets tolerated before the stream is given up on.
const MAX_CONSECUTIVE_DECODE_ERRORS: usize = 16;

/// Outcome of pulling the next buffer out of the decoder.
pub enum DecodeStep {
    /// Planar f32 samples, one vector per source channel.
    Decoded(Vec<Vec<f32>>),
    EndOfStream,
}

/// Manages Symphonia format reading and decoding for one track.
///
/// Every call may block on network input, so it lives on a blocking thread.
pub struct SymphoniaDecoder {
    format_reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    channels: Option<usize>,
}

impl SymphoniaDecoder {
    /// Probes the container and opens a decoder for the first playable track.
    ///
    /// Anything that prevents decoding from starting maps to
    /// `AudioError::UnsupportedFormat`.
    pub fn new(mss: MediaSourceStream, hint: Hint) -> Result<Self, AudioError> {
        debug!(target: LOG_TARGET, "Setting up Symphonia format reader and decoder...");
        let meta_opts: MetadataOptions = Default::default();
        let fmt_opts: FormatOptions = Default::default();

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &fmt_opts, &meta_opts)
            .map_err(probe_error)?;
        let format_reader = probed.format;

        let track = format_reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| AudioError::UnsupportedFormat("No suitable audio track found".to_string()))?
            .clone();

        debug!(target: LOG_TARGET, "Found suitable audio track: ID={}, Codec={:?}", track.id, track.codec_params.codec);

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| AudioError::UnsupportedFormat(format!("No decoder for codec: {}", e)))?;

        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or(AudioError::MissingCodecParams("sample rate"))?;
        let channels = track.codec_params.channels.map(|c| c.count());

        info!(target: LOG_TARGET, "Symphonia decoder ready: {} Hz, {:?} channels", sample_rate, channels);

        Ok(Self {
            format_reader,
            decoder,
            track_id: track.id,
            sample_rate,
            channels,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Channel count advertised by the container, if it declared one.
    pub fn channels(&self) -> Option<usize> {
        self.channels
    }

    /// Decodes the next buffer of the selected track.
    pub fn next_buffer(&mut self) -> Result<DecodeStep, AudioError> {
        let mut decode_errors = 0;
        loop {
            let packet = match self.format_reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    debug!(target: LOG_TARGET, "End of stream reached.");
                    return Ok(DecodeStep::EndOfStream);
                }
                Err(SymphoniaError::ResetRequired) => {
                    warn!(target: LOG_TARGET, "Stream discontinuity (ResetRequired); ending track.");
                    return Ok(DecodeStep::EndOfStream);
                }
                Err(SymphoniaError::IoError(e)) => {
                    warn!(target: LOG_TARGET, "Source read failed mid-track: {}", e);
                    return Err(AudioError::StreamError(e.to_string()));
                }
                Err(e) => return Err(e.into()),
            };

            if packet.track_id() != self.track_id {
                trace!(target: LOG_TARGET, "Skipping packet for track {}", packet.track_id());
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    let rate = decoded.spec().rate;
                    if rate != self.sample_rate {
                        warn!(target: LOG_TARGET, "Sample rate changed mid-stream! Expected: {}, Got: {}", self.sample_rate, rate);
                        return Err(AudioError::DecodingError("Dynamic sample rate change".to_string()));
                    }
                    return Ok(DecodeStep::Decoded(sample_converter::convert_ref_to_planar_f32(decoded)));
                }
                Err(SymphoniaError::DecodeError(err)) => {
                    decode_errors += 1;
                    warn!(target: LOG_TARGET, "Symphonia decode error (skipping packet): {}", err);
                    if decode_errors >= MAX_CONSECUTIVE_DECODE_ERRORS {
                        return Err(AudioError::DecodingError(format!(
                            "{} consecutive corrupt packets, last: {}",
                            decode_errors, err
                        )));
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

fn probe_error(e: SymphoniaError) -> AudioError {
    match e {
        // Running out of input while probing means no known container was found.
        SymphoniaError::IoError(ref io_err) if io_err.kind() == io::ErrorKind::UnexpectedEof => {
            AudioError::UnsupportedFormat("No decodable audio found in stream".to_string())
        }
        SymphoniaError::IoError(io_err) => AudioError::StreamError(io_err.to_string()),
        other => AudioError::UnsupportedFormat(other.to_string()),
    }
}

//! Fixed-size PCM frames exchanged between the transcoder and an output sink.

use crate::audio::error::AudioError;
use bytes::{BufMut, Bytes, BytesMut};

/// Bytes per sample. Frames are always signed 16-bit little-endian.
pub const BYTES_PER_SAMPLE: usize = 2;

/// Shape of every frame a sink accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameFormat {
    sample_rate: u32,
    channels: u16,
    frame_duration_ms: u32,
}

impl FrameFormat {
    /// 48 kHz, 16-bit, stereo, 20 ms per frame (3840 bytes).
    pub const STANDARD: FrameFormat = FrameFormat {
        sample_rate: 48_000,
        channels: 2,
        frame_duration_ms: 20,
    };

    pub fn new(sample_rate: u32, channels: u16, frame_duration_ms: u32) -> Result<Self, AudioError> {
        if sample_rate == 0 || channels == 0 || frame_duration_ms == 0 {
            return Err(AudioError::InvalidFrameFormat(format!(
                "rate={} channels={} duration={}ms must all be non-zero",
                sample_rate, channels, frame_duration_ms
            )));
        }
        if (sample_rate as u64 * frame_duration_ms as u64) % 1000 != 0 {
            return Err(AudioError::InvalidFrameFormat(format!(
                "{}ms at {} Hz is not a whole number of samples",
                frame_duration_ms, sample_rate
            )));
        }
        Ok(Self {
            sample_rate,
            channels,
            frame_duration_ms,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn frame_duration_ms(&self) -> u32 {
        self.frame_duration_ms
    }

    /// Samples per channel in one frame.
    pub fn samples_per_frame(&self) -> usize {
        (self.sample_rate as u64 * self.frame_duration_ms as u64 / 1000) as usize
    }

    /// Interleaved samples across all channels in one frame.
    pub fn interleaved_samples_per_frame(&self) -> usize {
        self.samples_per_frame() * self.channels as usize
    }

    pub fn bytes_per_frame(&self) -> usize {
        self.interleaved_samples_per_frame() * BYTES_PER_SAMPLE
    }

    pub fn frame_duration(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.frame_duration_ms as u64)
    }
}

impl Default for FrameFormat {
    fn default() -> Self {
        Self::STANDARD
    }
}

/// One fixed-size block of interleaved S16LE samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcmFrame {
    data: Bytes,
}

impl PcmFrame {
    pub fn new(data: Bytes) -> Self {
        Self { data }
    }

    pub fn silence(format: &FrameFormat) -> Self {
        Self {
            data: Bytes::from(vec![0u8; format.bytes_per_frame()]),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_bytes(self) -> Bytes {
        self.data
    }
}

/// Packs a running stream of interleaved samples into whole frames.
///
/// Leftover samples never cross a track boundary: `finish` pads the tail of
/// the current track with silence and empties the assembler.
pub struct FrameAssembler {
    format: FrameFormat,
    pending: BytesMut,
}

impl FrameAssembler {
    pub fn new(format: FrameFormat) -> Self {
        Self {
            format,
            pending: BytesMut::with_capacity(format.bytes_per_frame() * 2),
        }
    }

    pub fn format(&self) -> &FrameFormat {
        &self.format
    }

    /// Appends samples and returns every frame that is now complete.
    pub fn push_samples(&mut self, samples: &[i16]) -> Vec<PcmFrame> {
        self.pending.reserve(samples.len() * BYTES_PER_SAMPLE);
        for sample in samples {
            self.pending.put_i16_le(*sample);
        }

        let frame_bytes = self.format.bytes_per_frame();
        let mut frames = Vec::with_capacity(self.pending.len() / frame_bytes);
        while self.pending.len() >= frame_bytes {
            frames.push(PcmFrame::new(self.pending.split_to(frame_bytes).freeze()));
        }
        frames
    }

    /// Bytes buffered towards the next frame.
    pub fn pending_bytes(&self) -> usize {
        self.pending.len()
    }

    /// Emits the final partial frame, zero-padded, if any samples remain.
    pub fn finish(&mut self) -> Option<PcmFrame> {
        if self.pending.is_empty() {
            return None;
        }
        let frame_bytes = self.format.bytes_per_frame();
        self.pending.resize(frame_bytes, 0);
        Some(PcmFrame::new(self.pending.split_to(frame_bytes).freeze()))
    }
}

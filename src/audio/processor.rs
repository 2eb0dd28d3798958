use crate::audio::{
    error::AudioError,
    frame::{FrameAssembler, FrameFormat, PcmFrame},
    sample_converter,
};
use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};
use tracing::{debug, info, trace};

const LOG_TARGET: &str = "r_jukebox::audio::processor";

/// Turns decoded planar audio into sink-shaped frames: channel remix,
/// optional resampling, S16 conversion and frame packing.
///
/// Runs on the blocking decode thread, so everything here is synchronous.
pub struct AudioProcessor {
    resampler: Option<SincFixedIn<f32>>,
    num_channels: usize,
    // Input frames waiting for a full resampler chunk.
    pending_input: Vec<Vec<f32>>,
    ratio: f64,
    input_frames_total: u64,
    output_frames_total: u64,
    delay_to_skip: usize,
    assembler: FrameAssembler,
}

impl AudioProcessor {
    pub fn new(
        source_rate: u32,
        format: FrameFormat,
        chunk_frames: usize,
    ) -> Result<Self, AudioError> {
        let num_channels = format.channels() as usize;
        let target_rate = format.sample_rate();
        let ratio = target_rate as f64 / source_rate as f64;

        let resampler = if source_rate != target_rate {
            info!(target: LOG_TARGET, "Sample rate mismatch (source: {}, sink: {}). Initializing resampler.", source_rate, target_rate);
            let params = SincInterpolationParameters {
                sinc_len: 256,
                f_cutoff: 0.95,
                interpolation: SincInterpolationType::Linear,
                oversampling_factor: 256,
                window: WindowFunction::BlackmanHarris2,
            };
            Some(SincFixedIn::<f32>::new(ratio, 2.0, params, chunk_frames.max(1), num_channels)?)
        } else {
            debug!(target: LOG_TARGET, "Sample rates match ({} Hz). Resampling disabled.", target_rate);
            None
        };
        let delay_to_skip = resampler.as_ref().map_or(0, |r| r.output_delay());

        Ok(Self {
            resampler,
            num_channels,
            pending_input: vec![Vec::new(); num_channels],
            ratio,
            input_frames_total: 0,
            output_frames_total: 0,
            delay_to_skip,
            assembler: FrameAssembler::new(format),
        })
    }

    pub fn is_resampling(&self) -> bool {
        self.resampler.is_some()
    }

    /// Feeds one decoded buffer and returns the frames it completed.
    pub fn process(&mut self, planes: Vec<Vec<f32>>) -> Result<Vec<PcmFrame>, AudioError> {
        let planes = sample_converter::remix_channels(planes, self.num_channels);
        if planes.is_empty() || planes[0].is_empty() {
            return Ok(Vec::new());
        }

        if self.resampler.is_none() {
            let s16_vec = sample_converter::interleave_to_s16(&planes);
            return Ok(self.assembler.push_samples(&s16_vec));
        }

        self.input_frames_total += planes[0].len() as u64;
        for (pending, plane) in self.pending_input.iter_mut().zip(planes) {
            pending.extend_from_slice(&plane);
        }

        let mut frames = Vec::new();
        while let Some(resampler) = self.resampler.as_mut() {
            let needed = resampler.input_frames_next();
            if self.pending_input[0].len() < needed {
                break;
            }
            let chunk: Vec<&[f32]> = self.pending_input.iter().map(|p| &p[..needed]).collect();
            let output = resampler.process(&chunk, None)?;
            trace!(target: LOG_TARGET, "Resampled {} input frames into {} output frames", needed, output.first().map_or(0, |v| v.len()));
            for pending in self.pending_input.iter_mut() {
                pending.drain(..needed);
            }
            frames.extend(self.emit_resampled(output));
        }
        Ok(frames)
    }

    /// Drains the resampler and pads the last partial frame.
    pub fn finish(&mut self) -> Result<Vec<PcmFrame>, AudioError> {
        let mut frames = Vec::new();

        if self.resampler.is_some() {
            let expected_total = (self.input_frames_total as f64 * self.ratio).round() as u64;

            if !self.pending_input[0].is_empty() {
                let leftover = std::mem::replace(&mut self.pending_input, vec![Vec::new(); self.num_channels]);
                let output = self.resampler_mut()?.process_partial(Some(leftover.as_slice()), None)?;
                frames.extend(self.emit_resampled_capped(output, expected_total));
            }

            // Push zeros through until the filter delay has been flushed out.
            let mut guard = 0;
            while self.output_frames_total < expected_total && guard < 8 {
                let output = self.resampler_mut()?.process_partial::<&[f32]>(None, None)?;
                if output.first().map_or(true, |v| v.is_empty()) {
                    break;
                }
                frames.extend(self.emit_resampled_capped(output, expected_total));
                guard += 1;
            }
            debug!(target: LOG_TARGET, "Resampler flushed: {} input frames -> {} output frames", self.input_frames_total, self.output_frames_total);
        }

        if let Some(tail) = self.assembler.finish() {
            frames.push(tail);
        }
        Ok(frames)
    }

    fn resampler_mut(&mut self) -> Result<&mut SincFixedIn<f32>, AudioError> {
        self.resampler
            .as_mut()
            .ok_or_else(|| AudioError::ResamplingError("resampler not configured".to_string()))
    }

    fn emit_resampled(&mut self, output: Vec<Vec<f32>>) -> Vec<PcmFrame> {
        self.emit_resampled_capped(output, u64::MAX)
    }

    fn emit_resampled_capped(&mut self, mut output: Vec<Vec<f32>>, cap: u64) -> Vec<PcmFrame> {
        let produced = output.first().map_or(0, |v| v.len());
        let skip = self.delay_to_skip.min(produced);
        self.delay_to_skip -= skip;

        let remaining_budget = cap.saturating_sub(self.output_frames_total) as usize;
        let keep = (produced - skip).min(remaining_budget);
        for plane in output.iter_mut() {
            plane.drain(..skip);
            plane.truncate(keep);
        }
        self.output_frames_total += keep as u64;

        let s16_vec = sample_converter::interleave_to_s16(&output);
        self.assembler.push_samples(&s16_vec)
    }
}

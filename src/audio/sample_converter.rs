use symphonia::core::audio::{AudioBufferRef, SampleBuffer};
use tracing::trace;

const LOG_TARGET: &str = "r_jukebox::audio::sample_converter";

/// Converts any decoded Symphonia buffer into one `Vec<f32>` per channel,
/// the layout Rubato consumes.
pub fn convert_ref_to_planar_f32(decoded: AudioBufferRef<'_>) -> Vec<Vec<f32>> {
    let spec = *decoded.spec();
    let num_channels = spec.channels.count();
    let num_frames = decoded.frames();
    if num_channels == 0 || num_frames == 0 {
        return Vec::new();
    }

    let mut interleaved = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
    interleaved.copy_interleaved_ref(decoded);
    trace!(target: LOG_TARGET, "Converted {} frames x {} channels to f32", num_frames, num_channels);

    deinterleave(interleaved.samples(), num_channels)
}

/// Splits interleaved samples into per-channel vectors.
pub fn deinterleave(interleaved: &[f32], num_channels: usize) -> Vec<Vec<f32>> {
    if num_channels == 0 {
        return Vec::new();
    }
    let num_frames = interleaved.len() / num_channels;
    let mut planes = vec![Vec::with_capacity(num_frames); num_channels];
    for frame in interleaved.chunks_exact(num_channels) {
        for (ch, sample) in frame.iter().enumerate() {
            planes[ch].push(*sample);
        }
    }
    planes
}

/// Maps `planes` onto `target` channels.
///
/// Mono is duplicated to every output channel, anything folding down to mono
/// is averaged, and other layouts reuse source channels round-robin.
pub fn remix_channels(planes: Vec<Vec<f32>>, target: usize) -> Vec<Vec<f32>> {
    let source = planes.len();
    if source == target || source == 0 || target == 0 {
        return planes;
    }

    if target == 1 {
        let num_frames = planes[0].len();
        let scale = 1.0 / source as f32;
        let mixed = (0..num_frames)
            .map(|i| planes.iter().map(|p| p.get(i).copied().unwrap_or(0.0)).sum::<f32>() * scale)
            .collect();
        return vec![mixed];
    }

    (0..target).map(|ch| planes[ch % source].clone()).collect()
}

/// Scales a float sample in [-1.0, 1.0] to S16.
#[inline]
pub fn f32_to_s16(sample: f32) -> i16 {
    (sample * 32767.0).clamp(-32768.0, 32767.0) as i16
}

/// Interleaves per-channel float vectors into S16 samples. Channels shorter
/// than the first are padded with silence.
pub fn interleave_to_s16(planes: &[Vec<f32>]) -> Vec<i16> {
    if planes.is_empty() || planes[0].is_empty() {
        return Vec::new();
    }
    let num_channels = planes.len();
    let num_frames = planes[0].len();
    let mut s16_vec = Vec::with_capacity(num_frames * num_channels);
    for frame in 0..num_frames {
        for plane in planes {
            s16_vec.push(plane.get(frame).map_or(0, |s| f32_to_s16(*s)));
        }
    }
    s16_vec
}

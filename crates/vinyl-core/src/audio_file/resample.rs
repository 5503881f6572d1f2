//! Sample rate conversion (rubato)

use rubato::{FftFixedIn, Resampler};

use super::{DecodeError, PcmBuffer};
use crate::types::StereoSample;

/// Input chunk size for the FFT resampler
const CHUNK_SIZE: usize = 1024;
/// Sub-chunks per chunk (higher = better quality, slower)
const SUB_CHUNKS: usize = 2;

/// Convert a buffer to `target_rate`
///
/// Returns a copy when the rates already match. The resampler's group delay
/// is trimmed so the output lines up with the input.
pub fn resample(pcm: &PcmBuffer, target_rate: u32) -> Result<PcmBuffer, DecodeError> {
    let source_rate = pcm.sample_rate();
    if source_rate == target_rate || pcm.is_empty() {
        return Ok(PcmBuffer::new(pcm.frames().to_vec(), target_rate));
    }

    let mut resampler = FftFixedIn::<f32>::new(
        source_rate as usize,
        target_rate as usize,
        CHUNK_SIZE,
        SUB_CHUNKS,
        2,
    )
    .map_err(|e| DecodeError::Resample(e.to_string()))?;

    let input = pcm.frames();
    let delay = resampler.output_delay();
    let expected =
        (input.len() as f64 * target_rate as f64 / source_rate as f64).round() as usize;

    let mut out_left: Vec<f32> = Vec::with_capacity(expected + delay + CHUNK_SIZE);
    let mut out_right: Vec<f32> = Vec::with_capacity(expected + delay + CHUNK_SIZE);

    // Keep feeding (zero-padded past the end) until the delayed tail is out
    let mut pos = 0;
    while out_left.len() < expected + delay {
        let needed = resampler.input_frames_next();
        let mut chunk = vec![vec![0.0f32; needed]; 2];
        for (i, frame) in input.iter().skip(pos).take(needed).enumerate() {
            chunk[0][i] = frame.left;
            chunk[1][i] = frame.right;
        }
        pos += needed;

        let output = resampler
            .process(&chunk, None)
            .map_err(|e| DecodeError::Resample(e.to_string()))?;
        out_left.extend_from_slice(&output[0]);
        out_right.extend_from_slice(&output[1]);
    }

    let frames: Vec<StereoSample> = out_left
        .iter()
        .zip(out_right.iter())
        .skip(delay)
        .take(expected)
        .map(|(&l, &r)| StereoSample::new(l, r))
        .collect();

    log::debug!(
        "resample: {}Hz -> {}Hz, {} -> {} frames",
        source_rate,
        target_rate,
        input.len(),
        frames.len()
    );

    Ok(PcmBuffer::new(frames, target_rate))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dc(frames: usize, rate: u32) -> PcmBuffer {
        PcmBuffer::new(vec![StereoSample::new(0.5, -0.25); frames], rate)
    }

    #[test]
    fn test_same_rate_is_copy() {
        let pcm = dc(100, 48000);
        let out = resample(&pcm, 48000).unwrap();
        assert_eq!(out, pcm);
    }

    #[test]
    fn test_upsample_length() {
        let pcm = dc(44100, 44100);
        let out = resample(&pcm, 48000).unwrap();
        assert_eq!(out.sample_rate(), 48000);
        assert_eq!(out.len(), 48000);
    }

    #[test]
    fn test_dc_level_preserved() {
        let pcm = dc(22050, 22050);
        let out = resample(&pcm, 48000).unwrap();
        // Away from the edges the DC level survives conversion
        let mid = out.frames()[out.len() / 2];
        assert!((mid.left - 0.5).abs() < 0.01, "left was {}", mid.left);
        assert!((mid.right + 0.25).abs() < 0.01, "right was {}", mid.right);
    }
}

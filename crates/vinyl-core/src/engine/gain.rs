//! Click-free gain changes
//!
//! Every user-facing level (deck volume and gain, crossfader, master, cue,
//! sampler) goes through a [`GainRamp`]. A new target is reached with a
//! linear ramp across one processing block instead of a step, so moving a
//! fader never produces a discontinuity in the output.

use crate::types::StereoSample;

/// Linear per-block gain ramp
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainRamp {
    current: f32,
    target: f32,
}

impl GainRamp {
    pub fn new(value: f32) -> Self {
        Self {
            current: value,
            target: value,
        }
    }

    /// Set the gain to reach by the end of the next block
    #[inline]
    pub fn set_target(&mut self, target: f32) {
        self.target = target;
    }

    /// Jump to a value with no ramp
    #[inline]
    pub fn jump_to(&mut self, value: f32) {
        self.current = value;
        self.target = value;
    }

    #[inline]
    pub fn target(&self) -> f32 {
        self.target
    }

    #[inline]
    pub fn current(&self) -> f32 {
        self.current
    }

    #[inline]
    pub fn is_settled(&self) -> bool {
        self.current == self.target
    }

    /// Per-frame gain step for a block of `len` frames
    #[inline]
    fn step(&self, len: usize) -> f32 {
        if len == 0 {
            0.0
        } else {
            (self.target - self.current) / len as f32
        }
    }

    /// Scale a block in place, ramping to the target
    pub fn apply(&mut self, block: &mut [StereoSample]) {
        if self.is_settled() {
            if self.current != 1.0 {
                for frame in block.iter_mut() {
                    *frame *= self.current;
                }
            }
            return;
        }

        let step = self.step(block.len());
        let mut gain = self.current;
        for frame in block.iter_mut() {
            gain += step;
            *frame *= gain;
        }
        self.current = self.target;
    }

    /// Add `src` scaled by the ramp into `dst`
    pub fn mix_into(&mut self, src: &[StereoSample], dst: &mut [StereoSample]) {
        let len = src.len().min(dst.len());
        let step = self.step(len);
        let mut gain = self.current;
        for (out, input) in dst.iter_mut().zip(src.iter()) {
            gain += step;
            *out += *input * gain;
        }
        self.current = self.target;
    }
}

impl Default for GainRamp {
    fn default() -> Self {
        Self::new(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settled_ramp_is_constant_gain() {
        let mut ramp = GainRamp::new(0.5);
        let mut block = [StereoSample::mono(1.0); 8];
        ramp.apply(&mut block);
        assert!(block.iter().all(|s| s.left == 0.5 && s.right == 0.5));
    }

    #[test]
    fn test_ramp_is_monotonic_and_lands_on_target() {
        let mut ramp = GainRamp::new(0.0);
        ramp.set_target(1.0);
        let mut block = [StereoSample::mono(1.0); 64];
        ramp.apply(&mut block);

        for pair in block.windows(2) {
            assert!(pair[1].left >= pair[0].left);
        }
        assert!((block[63].left - 1.0).abs() < 1e-5);
        // No step at the start of the block
        assert!(block[0].left < 0.05);
        assert!(ramp.is_settled());
        assert_eq!(ramp.current(), 1.0);
    }

    #[test]
    fn test_mix_into_accumulates() {
        let mut ramp = GainRamp::new(0.5);
        let src = [StereoSample::mono(1.0); 4];
        let mut dst = [StereoSample::mono(0.25); 4];
        ramp.mix_into(&src, &mut dst);
        assert!(dst.iter().all(|s| (s.left - 0.75).abs() < 1e-6));
    }
}

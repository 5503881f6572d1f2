//! Three-band deck equalizer
//!
//! Fixed topology, in series:
//! - Low shelf at 320 Hz
//! - Peaking band at 1 kHz, Q 1.0
//! - High shelf at 10 kHz
//!
//! Each band takes a gain in dB clamped to ±12. Changing a gain only
//! recomputes that band's coefficients; filter history is kept so the
//! output stays continuous while a knob moves.

use crate::types::{EqBand, StereoSample};

/// Lowest band gain in dB
pub const EQ_MIN_DB: f32 = -12.0;
/// Highest band gain in dB
pub const EQ_MAX_DB: f32 = 12.0;

const LOW_SHELF_FREQ: f32 = 320.0;
const MID_PEAK_FREQ: f32 = 1000.0;
const MID_PEAK_Q: f32 = 1.0;
const HIGH_SHELF_FREQ: f32 = 10000.0;

/// Shelf slope (1.0 = steepest without overshoot)
const SHELF_SLOPE: f32 = 1.0;

/// Gains closer to 0 dB than this use exact passthrough coefficients
const FLAT_THRESHOLD_DB: f32 = 0.01;

/// Biquad filter history, both channels (direct form I)
#[derive(Debug, Clone, Copy, Default)]
struct BiquadState {
    x1_l: f32, x2_l: f32, y1_l: f32, y2_l: f32,
    x1_r: f32, x2_r: f32, y1_r: f32, y2_r: f32,
}

impl BiquadState {
    #[inline]
    fn process(&mut self, input: StereoSample, c: &BiquadCoeffs) -> StereoSample {
        let out_l = c.b0 * input.left + c.b1 * self.x1_l + c.b2 * self.x2_l
                  - c.a1 * self.y1_l - c.a2 * self.y2_l;
        self.x2_l = self.x1_l;
        self.x1_l = input.left;
        self.y2_l = self.y1_l;
        self.y1_l = out_l;

        let out_r = c.b0 * input.right + c.b1 * self.x1_r + c.b2 * self.x2_r
                  - c.a1 * self.y1_r - c.a2 * self.y2_r;
        self.x2_r = self.x1_r;
        self.x1_r = input.right;
        self.y2_r = self.y1_r;
        self.y1_r = out_r;

        StereoSample::new(out_l, out_r)
    }

    fn is_silent(&self) -> bool {
        [self.x1_l, self.x2_l, self.y1_l, self.y2_l, self.x1_r, self.x2_r, self.y1_r, self.y2_r]
            .iter()
            .all(|v| *v == 0.0)
    }
}

/// Normalized biquad coefficients (a0 = 1), RBJ cookbook formulas
#[derive(Debug, Clone, Copy, PartialEq)]
struct BiquadCoeffs {
    b0: f32, b1: f32, b2: f32,
    a1: f32, a2: f32,
}

impl BiquadCoeffs {
    fn passthrough() -> Self {
        Self { b0: 1.0, b1: 0.0, b2: 0.0, a1: 0.0, a2: 0.0 }
    }

    fn low_shelf(freq: f32, gain_db: f32, sample_rate: f32) -> Self {
        let a = 10.0_f32.powf(gain_db / 40.0);
        let w0 = std::f32::consts::TAU * freq / sample_rate;
        let (sin_w0, cos_w0) = w0.sin_cos();
        let alpha = sin_w0 / 2.0 * ((a + 1.0 / a) * (1.0 / SHELF_SLOPE - 1.0) + 2.0).sqrt();
        let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;

        let a0 = (a + 1.0) + (a - 1.0) * cos_w0 + two_sqrt_a_alpha;
        Self {
            b0: (a * ((a + 1.0) - (a - 1.0) * cos_w0 + two_sqrt_a_alpha)) / a0,
            b1: (2.0 * a * ((a - 1.0) - (a + 1.0) * cos_w0)) / a0,
            b2: (a * ((a + 1.0) - (a - 1.0) * cos_w0 - two_sqrt_a_alpha)) / a0,
            a1: (-2.0 * ((a - 1.0) + (a + 1.0) * cos_w0)) / a0,
            a2: ((a + 1.0) + (a - 1.0) * cos_w0 - two_sqrt_a_alpha) / a0,
        }
    }

    fn peaking(freq: f32, gain_db: f32, q: f32, sample_rate: f32) -> Self {
        let a = 10.0_f32.powf(gain_db / 40.0);
        let w0 = std::f32::consts::TAU * freq / sample_rate;
        let (sin_w0, cos_w0) = w0.sin_cos();
        let alpha = sin_w0 / (2.0 * q);

        let a0 = 1.0 + alpha / a;
        Self {
            b0: (1.0 + alpha * a) / a0,
            b1: (-2.0 * cos_w0) / a0,
            b2: (1.0 - alpha * a) / a0,
            a1: (-2.0 * cos_w0) / a0,
            a2: (1.0 - alpha / a) / a0,
        }
    }

    fn high_shelf(freq: f32, gain_db: f32, sample_rate: f32) -> Self {
        let a = 10.0_f32.powf(gain_db / 40.0);
        let w0 = std::f32::consts::TAU * freq / sample_rate;
        let (sin_w0, cos_w0) = w0.sin_cos();
        let alpha = sin_w0 / 2.0 * ((a + 1.0 / a) * (1.0 / SHELF_SLOPE - 1.0) + 2.0).sqrt();
        let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;

        let a0 = (a + 1.0) - (a - 1.0) * cos_w0 + two_sqrt_a_alpha;
        Self {
            b0: (a * ((a + 1.0) + (a - 1.0) * cos_w0 + two_sqrt_a_alpha)) / a0,
            b1: (-2.0 * a * ((a - 1.0) + (a + 1.0) * cos_w0)) / a0,
            b2: (a * ((a + 1.0) + (a - 1.0) * cos_w0 - two_sqrt_a_alpha)) / a0,
            a1: (2.0 * ((a - 1.0) - (a + 1.0) * cos_w0)) / a0,
            a2: ((a + 1.0) - (a - 1.0) * cos_w0 - two_sqrt_a_alpha) / a0,
        }
    }
}

/// One section of the equalizer
#[derive(Debug, Clone)]
struct EqSection {
    band: EqBand,
    gain_db: f32,
    coeffs: BiquadCoeffs,
    state: BiquadState,
}

impl EqSection {
    fn new(band: EqBand) -> Self {
        Self {
            band,
            gain_db: 0.0,
            coeffs: BiquadCoeffs::passthrough(),
            state: BiquadState::default(),
        }
    }

    fn update_coeffs(&mut self, sample_rate: f32) {
        if self.gain_db.abs() < FLAT_THRESHOLD_DB {
            self.coeffs = BiquadCoeffs::passthrough();
            return;
        }
        // Keep every center below Nyquist at low device rates
        let nyquist_guard = sample_rate * 0.45;
        self.coeffs = match self.band {
            EqBand::Low => BiquadCoeffs::low_shelf(LOW_SHELF_FREQ.min(nyquist_guard), self.gain_db, sample_rate),
            EqBand::Mid => BiquadCoeffs::peaking(MID_PEAK_FREQ.min(nyquist_guard), self.gain_db, MID_PEAK_Q, sample_rate),
            EqBand::High => BiquadCoeffs::high_shelf(HIGH_SHELF_FREQ.min(nyquist_guard), self.gain_db, sample_rate),
        };
    }
}

/// Per-deck three-band equalizer
#[derive(Debug, Clone)]
pub struct Equalizer {
    sample_rate: f32,
    sections: [EqSection; 3],
}

impl Equalizer {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate as f32,
            sections: [
                EqSection::new(EqBand::Low),
                EqSection::new(EqBand::Mid),
                EqSection::new(EqBand::High),
            ],
        }
    }

    /// Set a band gain in dB (clamped to ±12)
    ///
    /// Returns the gain actually applied.
    pub fn set_band(&mut self, band: EqBand, gain_db: f32) -> f32 {
        let gain_db = if gain_db.is_finite() {
            gain_db.clamp(EQ_MIN_DB, EQ_MAX_DB)
        } else {
            0.0
        };
        let section = &mut self.sections[band.index()];
        if section.gain_db != gain_db {
            section.gain_db = gain_db;
            section.update_coeffs(self.sample_rate);
        }
        gain_db
    }

    /// Current gain of a band in dB
    pub fn band(&self, band: EqBand) -> f32 {
        self.sections[band.index()].gain_db
    }

    /// True when all three bands are at 0 dB
    pub fn is_flat(&self) -> bool {
        self.sections.iter().all(|s| s.coeffs == BiquadCoeffs::passthrough())
    }

    /// Filter a block in place
    pub fn process(&mut self, block: &mut [StereoSample]) {
        // A flat EQ with settled history is a no-op
        if self.is_flat() && self.sections.iter().all(|s| s.state.is_silent()) {
            return;
        }
        for frame in block.iter_mut() {
            let mut sample = *frame;
            for section in self.sections.iter_mut() {
                sample = section.state.process(sample, &section.coeffs);
            }
            *frame = sample;
        }
    }

    /// Clear filter history (used when the deck's source changes)
    pub fn reset(&mut self) {
        for section in self.sections.iter_mut() {
            section.state = BiquadState::default();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: u32 = 48000;

    fn sine_block(freq: f32, len: usize) -> Vec<StereoSample> {
        (0..len)
            .map(|i| {
                let v = (std::f32::consts::TAU * freq * i as f32 / SR as f32).sin();
                StereoSample::mono(v)
            })
            .collect()
    }

    /// Peak over the second half of the block (past the filter transient)
    fn settled_peak(block: &[StereoSample]) -> f32 {
        block[block.len() / 2..].iter().map(|s| s.peak()).fold(0.0, f32::max)
    }

    #[test]
    fn test_flat_eq_is_transparent() {
        let mut eq = Equalizer::new(SR);
        let input = sine_block(440.0, 512);
        let mut block = input.clone();
        eq.process(&mut block);
        assert_eq!(block, input);
    }

    #[test]
    fn test_set_band_clamps() {
        let mut eq = Equalizer::new(SR);
        assert_eq!(eq.set_band(EqBand::Low, 30.0), 12.0);
        assert_eq!(eq.set_band(EqBand::High, -40.0), -12.0);
        assert_eq!(eq.band(EqBand::Low), 12.0);
        assert_eq!(eq.band(EqBand::Mid), 0.0);
        assert_eq!(eq.band(EqBand::High), -12.0);
    }

    #[test]
    fn test_low_boost_raises_bass() {
        let mut eq = Equalizer::new(SR);
        eq.set_band(EqBand::Low, 12.0);
        let mut block = sine_block(60.0, 9600);
        eq.process(&mut block);
        // +12 dB is ~3.98x
        let peak = settled_peak(&block);
        assert!(peak > 3.0 && peak < 4.5, "peak was {}", peak);
    }

    #[test]
    fn test_mid_cut_attenuates_1khz() {
        let mut eq = Equalizer::new(SR);
        eq.set_band(EqBand::Mid, -12.0);
        let mut block = sine_block(1000.0, 4800);
        eq.process(&mut block);
        let peak = settled_peak(&block);
        assert!(peak < 0.35, "peak was {}", peak);
    }

    #[test]
    fn test_high_cut_leaves_bass_alone() {
        let mut eq = Equalizer::new(SR);
        eq.set_band(EqBand::High, -12.0);
        let mut block = sine_block(100.0, 9600);
        eq.process(&mut block);
        let peak = settled_peak(&block);
        assert!((peak - 1.0).abs() < 0.05, "peak was {}", peak);
    }

    #[test]
    fn test_gain_change_keeps_filter_history() {
        let mut eq = Equalizer::new(SR);
        eq.set_band(EqBand::Low, 6.0);
        let mut block = sine_block(200.0, 256);
        eq.process(&mut block);
        assert!(!eq.sections[0].state.is_silent());

        eq.set_band(EqBand::Low, 3.0);
        assert!(!eq.sections[0].state.is_silent());
    }
}

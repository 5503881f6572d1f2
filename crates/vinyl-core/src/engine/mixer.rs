//! Mixer bus - crossfader, master and cue outputs
//!
//! ```text
//!  deck A ──┬─► × gainA ─┐
//!           │            ├─► + sampler ─► × master ─► master out
//!  deck B ──┼─► × gainB ─┘
//!           │
//!           └─► (decks with cue listen) ─► × cue volume ─► cue out
//! ```
//!
//! The crossfader uses an equal-power law: at position `x` (0..100)
//! `gainA = cos(x/100 · π/2)` and `gainB = sin(x/100 · π/2)`, so
//! `gainA² + gainB² = 1` everywhere. The cue feed is taken before the
//! crossfader and master volume.

use std::f32::consts::FRAC_PI_2;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use crate::types::{DeckId, StereoBuffer, NUM_DECKS};

use super::gain::GainRamp;

/// Crossfader position at startup (center)
pub const DEFAULT_CROSSFADER: f32 = 50.0;
/// Master volume at startup (0-100)
pub const DEFAULT_MASTER_VOLUME: f32 = 80.0;
/// Cue volume at startup (0-100)
pub const DEFAULT_CUE_VOLUME: f32 = 70.0;

/// Equal-power crossfader gains `(deck A, deck B)` for a position in 0..100
pub fn crossfade_gains(position: f32) -> (f32, f32) {
    let theta = clamp_percent(position) / 100.0 * FRAC_PI_2;
    // cos(π/2) is not exactly 0 in f32
    (theta.cos().max(0.0), theta.sin().max(0.0))
}

#[inline]
fn clamp_percent(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

/// Lock-free bus state for UI access
pub struct BusAtomics {
    crossfader_bits: AtomicU32,
    master_volume_bits: AtomicU32,
    cue_volume_bits: AtomicU32,
    cue_listen: [AtomicBool; NUM_DECKS],
    master_peak_bits: AtomicU32,
    cue_peak_bits: AtomicU32,
}

impl BusAtomics {
    pub fn new() -> Self {
        Self {
            crossfader_bits: AtomicU32::new(DEFAULT_CROSSFADER.to_bits()),
            master_volume_bits: AtomicU32::new(DEFAULT_MASTER_VOLUME.to_bits()),
            cue_volume_bits: AtomicU32::new(DEFAULT_CUE_VOLUME.to_bits()),
            cue_listen: [AtomicBool::new(false), AtomicBool::new(false)],
            master_peak_bits: AtomicU32::new(0f32.to_bits()),
            cue_peak_bits: AtomicU32::new(0f32.to_bits()),
        }
    }

    #[inline]
    pub fn crossfader(&self) -> f32 {
        f32::from_bits(self.crossfader_bits.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn master_volume(&self) -> f32 {
        f32::from_bits(self.master_volume_bits.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn cue_volume(&self) -> f32 {
        f32::from_bits(self.cue_volume_bits.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn cue_listen(&self, deck: DeckId) -> bool {
        self.cue_listen[deck.index()].load(Ordering::Relaxed)
    }

    #[inline]
    pub fn master_peak(&self) -> f32 {
        f32::from_bits(self.master_peak_bits.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn cue_peak(&self) -> f32 {
        f32::from_bits(self.cue_peak_bits.load(Ordering::Relaxed))
    }
}

impl Default for BusAtomics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view of the bus
#[derive(Debug, Clone, PartialEq)]
pub struct BusSnapshot {
    pub crossfader: f32,
    pub gain_a: f32,
    pub gain_b: f32,
    pub master_volume: f32,
    pub cue_volume: f32,
    pub cue_listen: [bool; NUM_DECKS],
    pub master_peak: f32,
    pub cue_peak: f32,
}

impl BusSnapshot {
    pub fn capture(atomics: &BusAtomics) -> Self {
        let (gain_a, gain_b) = crossfade_gains(atomics.crossfader());
        Self {
            crossfader: atomics.crossfader(),
            gain_a,
            gain_b,
            master_volume: atomics.master_volume(),
            cue_volume: atomics.cue_volume(),
            cue_listen: DeckId::ALL.map(|d| atomics.cue_listen(d)),
            master_peak: atomics.master_peak(),
            cue_peak: atomics.cue_peak(),
        }
    }
}

/// The summing bus
pub struct MixerBus {
    crossfader: f32,
    master_volume: f32,
    cue_volume: f32,
    cue_listen: [bool; NUM_DECKS],
    deck_gains: [GainRamp; NUM_DECKS],
    master: GainRamp,
    cue: GainRamp,
    atomics: Arc<BusAtomics>,
}

impl MixerBus {
    pub fn new() -> Self {
        let (gain_a, gain_b) = crossfade_gains(DEFAULT_CROSSFADER);
        Self {
            crossfader: DEFAULT_CROSSFADER,
            master_volume: DEFAULT_MASTER_VOLUME,
            cue_volume: DEFAULT_CUE_VOLUME,
            cue_listen: [false; NUM_DECKS],
            deck_gains: [GainRamp::new(gain_a), GainRamp::new(gain_b)],
            master: GainRamp::new(DEFAULT_MASTER_VOLUME / 100.0),
            cue: GainRamp::new(DEFAULT_CUE_VOLUME / 100.0),
            atomics: Arc::new(BusAtomics::new()),
        }
    }

    pub fn atomics(&self) -> Arc<BusAtomics> {
        Arc::clone(&self.atomics)
    }

    #[inline]
    pub fn crossfader(&self) -> f32 {
        self.crossfader
    }

    /// Current equal-power gains `(A, B)`
    pub fn deck_gains(&self) -> (f32, f32) {
        crossfade_gains(self.crossfader)
    }

    #[inline]
    pub fn master_volume(&self) -> f32 {
        self.master_volume
    }

    #[inline]
    pub fn cue_volume(&self) -> f32 {
        self.cue_volume
    }

    #[inline]
    pub fn cue_listen(&self, deck: DeckId) -> bool {
        self.cue_listen[deck.index()]
    }

    /// Set the crossfader position (0 = deck A only, 100 = deck B only)
    pub fn set_crossfader(&mut self, position: f32) {
        self.crossfader = clamp_percent(position);
        let (gain_a, gain_b) = crossfade_gains(self.crossfader);
        self.deck_gains[0].set_target(gain_a);
        self.deck_gains[1].set_target(gain_b);
        self.atomics
            .crossfader_bits
            .store(self.crossfader.to_bits(), Ordering::Relaxed);
    }

    /// Set the master volume (0-100)
    pub fn set_master_volume(&mut self, volume: f32) {
        self.master_volume = clamp_percent(volume);
        self.master.set_target(self.master_volume / 100.0);
        self.atomics
            .master_volume_bits
            .store(self.master_volume.to_bits(), Ordering::Relaxed);
    }

    /// Set the cue (headphone) volume (0-100)
    pub fn set_cue_volume(&mut self, volume: f32) {
        self.cue_volume = clamp_percent(volume);
        self.cue.set_target(self.cue_volume / 100.0);
        self.atomics
            .cue_volume_bits
            .store(self.cue_volume.to_bits(), Ordering::Relaxed);
    }

    /// Route a deck to the cue output
    pub fn set_cue_listen(&mut self, deck: DeckId, enabled: bool) {
        self.cue_listen[deck.index()] = enabled;
        self.atomics.cue_listen[deck.index()].store(enabled, Ordering::Relaxed);
    }

    /// Sum one block
    ///
    /// `decks` are post-fader deck outputs, `sampler` the sampler output.
    /// `master` and `cue` are overwritten and must have the same length.
    pub fn process(
        &mut self,
        decks: &[StereoBuffer; NUM_DECKS],
        sampler: &StereoBuffer,
        master: &mut StereoBuffer,
        cue: &mut StereoBuffer,
    ) {
        master.fill_silence();
        for (deck, gain) in decks.iter().zip(self.deck_gains.iter_mut()) {
            gain.mix_into(deck.as_slice(), master.as_mut_slice());
        }
        master.add_buffer(sampler);
        self.master.apply(master.as_mut_slice());

        cue.fill_silence();
        for (i, deck) in decks.iter().enumerate() {
            if self.cue_listen[i] {
                cue.add_buffer(deck);
            }
        }
        self.cue.apply(cue.as_mut_slice());

        self.atomics
            .master_peak_bits
            .store(master.peak().to_bits(), Ordering::Relaxed);
        self.atomics
            .cue_peak_bits
            .store(cue.peak().to_bits(), Ordering::Relaxed);
    }
}

impl Default for MixerBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StereoSample;

    const EPS: f32 = 1e-6;

    fn dc(len: usize, value: f32) -> StereoBuffer {
        StereoBuffer::from_vec(vec![StereoSample::mono(value); len])
    }

    #[test]
    fn test_crossfade_endpoints() {
        let (a, b) = crossfade_gains(0.0);
        assert_eq!((a, b), (1.0, 0.0));
        let (a, b) = crossfade_gains(100.0);
        assert!(a.abs() < EPS);
        assert!((b - 1.0).abs() < EPS);
    }

    #[test]
    fn test_crossfade_center_is_equal_power() {
        let (a, b) = crossfade_gains(50.0);
        assert!((a - b).abs() < EPS);
        assert!((a - std::f32::consts::FRAC_1_SQRT_2).abs() < EPS);
    }

    #[test]
    fn test_crossfade_power_is_constant() {
        for step in 0..=20 {
            let (a, b) = crossfade_gains(step as f32 * 5.0);
            assert!((a * a + b * b - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_crossfade_clamps() {
        assert_eq!(crossfade_gains(-10.0), crossfade_gains(0.0));
        assert_eq!(crossfade_gains(150.0), crossfade_gains(100.0));
    }

    #[test]
    fn test_bus_defaults() {
        let bus = MixerBus::new();
        assert_eq!(bus.crossfader(), 50.0);
        assert_eq!(bus.master_volume(), 80.0);
        assert_eq!(bus.cue_volume(), 70.0);
        assert!(!bus.cue_listen(DeckId::A));
    }

    #[test]
    fn test_master_mix() {
        let mut bus = MixerBus::new();
        let decks = [dc(16, 1.0), dc(16, 0.5)];
        let sampler = dc(16, 0.25);
        let mut master = StereoBuffer::silence(16);
        let mut cue = StereoBuffer::silence(16);

        bus.process(&decks, &sampler, &mut master, &mut cue);

        let g = std::f32::consts::FRAC_1_SQRT_2;
        let expected = 0.8 * (g * 1.0 + g * 0.5 + 0.25);
        assert!(master.iter().all(|s| (s.left - expected).abs() < 1e-5));
        // No deck routed to cue
        assert_eq!(cue.peak(), 0.0);
    }

    #[test]
    fn test_hard_left_silences_deck_b() {
        let mut bus = MixerBus::new();
        bus.set_crossfader(0.0);
        bus.set_master_volume(100.0);
        let decks = [StereoBuffer::silence(16), dc(16, 1.0)];
        let sampler = StereoBuffer::silence(16);
        let mut master = StereoBuffer::silence(16);
        let mut cue = StereoBuffer::silence(16);

        bus.process(&decks, &sampler, &mut master, &mut cue); // ramp block
        bus.process(&decks, &sampler, &mut master, &mut cue);
        assert!(master.peak() < EPS);
    }

    #[test]
    fn test_cue_is_pre_crossfader() {
        let mut bus = MixerBus::new();
        bus.set_crossfader(0.0);
        bus.set_master_volume(0.0);
        bus.set_cue_listen(DeckId::B, true);

        let decks = [dc(16, 0.3), dc(16, 1.0)];
        let sampler = dc(16, 1.0);
        let mut master = StereoBuffer::silence(16);
        let mut cue = StereoBuffer::silence(16);
        bus.process(&decks, &sampler, &mut master, &mut cue);
        bus.process(&decks, &sampler, &mut master, &mut cue);

        // Deck B at cue volume 70, no sampler, no deck A
        assert!(cue.iter().all(|s| (s.left - 0.7).abs() < 1e-6));
        assert!(master.peak() < EPS);
        assert!(bus.atomics().cue_listen(DeckId::B));
    }

    #[test]
    fn test_snapshot() {
        let mut bus = MixerBus::new();
        bus.set_crossfader(25.0);
        bus.set_cue_volume(55.0);
        let snapshot = BusSnapshot::capture(&bus.atomics());
        assert_eq!(snapshot.crossfader, 25.0);
        assert_eq!(snapshot.cue_volume, 55.0);
        assert!(snapshot.gain_a > snapshot.gain_b);
    }
}

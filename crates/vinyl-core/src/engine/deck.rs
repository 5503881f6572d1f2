//! Deck - single track player with pitch, EQ and level controls
//!
//! Signal flow per block:
//!
//! ```text
//! track frames ──► resample cursor (pitch) ──► EQ ──► transport gate ──► volume × gain ──► out
//! ```
//!
//! Transport changes never cut the signal mid-waveform: starting playback
//! fades in over one block and pausing/cueing renders one more block from
//! the old position while fading out.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use crate::audio_file::{Track, TrackRef};
use crate::error::{EngineError, EngineResult};
use crate::types::{DeckId, EqBand, PlayState, StereoBuffer, StereoSample};

use super::eq::Equalizer;
use super::gain::GainRamp;

/// Pitch fader range in percent (±)
pub const PITCH_RANGE_PERCENT: f64 = 20.0;

/// Volume fader position for a fresh deck
pub const DEFAULT_DECK_VOLUME: f32 = 0.8;

/// Gain (trim) for a fresh deck
pub const DEFAULT_DECK_GAIN: f32 = 0.5;

/// Playback rate for a pitch adjustment in percent
#[inline]
pub fn playback_rate(pitch_percent: f64) -> f64 {
    1.0 + pitch_percent / 100.0
}

/// Lock-free deck state for UI access
///
/// Written by the audio thread after every change, read by the UI with
/// `Ordering::Relaxed`. Floating point values are stored as raw bits.
pub struct DeckAtomics {
    has_track: AtomicBool,
    /// 0=Stopped, 1=Cued, 2=Playing
    state: AtomicU8,
    position_bits: AtomicU64,
    duration_bits: AtomicU64,
    track_bpm_bits: AtomicU64,
    pitch_bits: AtomicU64,
    volume_bits: AtomicU32,
    gain_bits: AtomicU32,
    eq_bits: [AtomicU32; 3],
    peak_bits: AtomicU32,
}

impl DeckAtomics {
    pub fn new() -> Self {
        Self {
            has_track: AtomicBool::new(false),
            state: AtomicU8::new(PlayState::Stopped.to_u8()),
            position_bits: AtomicU64::new(0f64.to_bits()),
            duration_bits: AtomicU64::new(0f64.to_bits()),
            track_bpm_bits: AtomicU64::new(0f64.to_bits()),
            pitch_bits: AtomicU64::new(0f64.to_bits()),
            volume_bits: AtomicU32::new(DEFAULT_DECK_VOLUME.to_bits()),
            gain_bits: AtomicU32::new(DEFAULT_DECK_GAIN.to_bits()),
            eq_bits: [
                AtomicU32::new(0f32.to_bits()),
                AtomicU32::new(0f32.to_bits()),
                AtomicU32::new(0f32.to_bits()),
            ],
            peak_bits: AtomicU32::new(0f32.to_bits()),
        }
    }

    #[inline]
    pub fn has_track(&self) -> bool {
        self.has_track.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn play_state(&self) -> PlayState {
        PlayState::from_u8(self.state.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn is_playing(&self) -> bool {
        self.play_state() == PlayState::Playing
    }

    /// Playhead position in seconds
    #[inline]
    pub fn position_seconds(&self) -> f64 {
        f64::from_bits(self.position_bits.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn duration_seconds(&self) -> f64 {
        f64::from_bits(self.duration_bits.load(Ordering::Relaxed))
    }

    /// Original BPM of the loaded track (0 when empty)
    #[inline]
    pub fn track_bpm(&self) -> f64 {
        f64::from_bits(self.track_bpm_bits.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn pitch_percent(&self) -> f64 {
        f64::from_bits(self.pitch_bits.load(Ordering::Relaxed))
    }

    /// Full-precision tempo after pitch, `None` when no track is loaded
    pub fn effective_bpm(&self) -> Option<f64> {
        self.has_track()
            .then(|| self.track_bpm() * playback_rate(self.pitch_percent()))
    }

    /// Effective BPM rounded for display
    pub fn display_bpm(&self) -> Option<u32> {
        self.effective_bpm().map(|bpm| bpm.round().max(0.0) as u32)
    }

    #[inline]
    pub fn volume(&self) -> f32 {
        f32::from_bits(self.volume_bits.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn gain(&self) -> f32 {
        f32::from_bits(self.gain_bits.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn eq(&self, band: EqBand) -> f32 {
        f32::from_bits(self.eq_bits[band.index()].load(Ordering::Relaxed))
    }

    /// Output peak of the last processed block
    #[inline]
    pub fn peak(&self) -> f32 {
        f32::from_bits(self.peak_bits.load(Ordering::Relaxed))
    }

    fn store_track(&self, track: Option<&Track>) {
        self.has_track.store(track.is_some(), Ordering::Relaxed);
        let (duration, bpm) = track
            .map(|t| (t.duration_seconds(), t.bpm))
            .unwrap_or((0.0, 0.0));
        self.duration_bits.store(duration.to_bits(), Ordering::Relaxed);
        self.track_bpm_bits.store(bpm.to_bits(), Ordering::Relaxed);
    }

    fn store_transport(&self, state: PlayState, position_seconds: f64) {
        self.state.store(state.to_u8(), Ordering::Relaxed);
        self.position_bits.store(position_seconds.to_bits(), Ordering::Relaxed);
    }
}

impl Default for DeckAtomics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view of a deck for display
#[derive(Debug, Clone, PartialEq)]
pub struct DeckSnapshot {
    pub deck: DeckId,
    pub track_name: Option<String>,
    pub artist: Option<String>,
    pub key: Option<String>,
    pub track_bpm: Option<f64>,
    pub effective_bpm: Option<f64>,
    pub display_bpm: Option<u32>,
    pub state: PlayState,
    pub position_seconds: f64,
    pub duration_seconds: f64,
    pub pitch_percent: f64,
    pub playback_rate: f64,
    pub volume: f32,
    pub gain: f32,
    pub eq_low: f32,
    pub eq_mid: f32,
    pub eq_high: f32,
    pub peak: f32,
}

impl DeckSnapshot {
    /// Combine atomics with the metadata of the track the caller knows is loaded
    pub fn capture(deck: DeckId, atomics: &DeckAtomics, track: Option<&Track>) -> Self {
        let track = track.filter(|_| atomics.has_track());
        Self {
            deck,
            track_name: track.map(|t| t.name.clone()),
            artist: track.map(|t| t.artist.clone()),
            key: track.map(|t| t.key.clone()),
            track_bpm: atomics.has_track().then(|| atomics.track_bpm()),
            effective_bpm: atomics.effective_bpm(),
            display_bpm: atomics.display_bpm(),
            state: atomics.play_state(),
            position_seconds: atomics.position_seconds(),
            duration_seconds: atomics.duration_seconds(),
            pitch_percent: atomics.pitch_percent(),
            playback_rate: playback_rate(atomics.pitch_percent()),
            volume: atomics.volume(),
            gain: atomics.gain(),
            eq_low: atomics.eq(EqBand::Low),
            eq_mid: atomics.eq(EqBand::Mid),
            eq_high: atomics.eq(EqBand::High),
            peak: atomics.peak(),
        }
    }
}

/// A single deck
///
/// Owned by the audio thread. The loaded track is shared with the library
/// and never freed here.
pub struct Deck {
    id: DeckId,
    /// Engine (output) sample rate
    sample_rate: u32,
    track: Option<TrackRef>,
    /// Playhead in track frames (fractional while pitched)
    position: f64,
    state: PlayState,
    pitch: f64,
    volume: f32,
    gain: f32,
    /// volume × gain
    level: GainRamp,
    /// Transport fade (0 when stopped, 1 when playing)
    gate: GainRamp,
    /// Position to render a fade-out tail from after leaving Playing
    fade_from: Option<f64>,
    /// Replaced track still owed its fade-out tail
    outgoing: Option<TrackRef>,
    eq: Equalizer,
    atomics: Arc<DeckAtomics>,
}

impl Deck {
    pub fn new(id: DeckId, sample_rate: u32) -> Self {
        let deck = Self {
            id,
            sample_rate,
            track: None,
            position: 0.0,
            state: PlayState::Stopped,
            pitch: 0.0,
            volume: DEFAULT_DECK_VOLUME,
            gain: DEFAULT_DECK_GAIN,
            level: GainRamp::new(DEFAULT_DECK_VOLUME * DEFAULT_DECK_GAIN),
            gate: GainRamp::new(0.0),
            fade_from: None,
            outgoing: None,
            eq: Equalizer::new(sample_rate),
            atomics: Arc::new(DeckAtomics::new()),
        };
        deck.sync_all_atomics();
        deck
    }

    #[inline]
    pub fn id(&self) -> DeckId {
        self.id
    }

    pub fn atomics(&self) -> Arc<DeckAtomics> {
        Arc::clone(&self.atomics)
    }

    pub fn track(&self) -> Option<&Track> {
        self.track.as_deref()
    }

    #[inline]
    pub fn state(&self) -> PlayState {
        self.state
    }

    #[inline]
    pub fn is_playing(&self) -> bool {
        self.state == PlayState::Playing
    }

    // ─────────────────────────────────────────────────────────────
    // Track management
    // ─────────────────────────────────────────────────────────────

    /// Load a track, replacing any previous one
    ///
    /// The deck stops at the start of the new track. Pitch, levels and EQ
    /// carry over.
    pub fn load_track(&mut self, track: TrackRef) {
        log::info!(
            "Deck {}: loaded '{}' ({:.1}s, {} BPM)",
            self.id,
            track.name,
            track.duration_seconds(),
            track.bpm
        );
        self.retire_track();
        self.track = Some(track);
        self.reset_transport();
        self.atomics.store_track(self.track.as_deref());
        self.sync_transport_atomics();
    }

    pub fn unload_track(&mut self) {
        if self.track.is_some() {
            log::info!("Deck {}: unloaded", self.id);
        }
        self.retire_track();
        self.reset_transport();
        self.atomics.store_track(None);
        self.sync_transport_atomics();
    }

    /// Detach the current track, keeping it for one fade-out block if it
    /// is still audible
    fn retire_track(&mut self) {
        let old = self.track.take();
        if self.outgoing.is_some() {
            // Already fading an earlier track; `old` was never heard
            return;
        }
        if self.state == PlayState::Playing {
            self.fade_from = Some(self.position);
        }
        if self.fade_from.is_some() {
            self.outgoing = old;
        }
    }

    /// Queue a fade-out tail from the playhead, unless a replaced track is
    /// already fading
    fn start_fade(&mut self) {
        if self.outgoing.is_none() {
            self.fade_from = Some(self.position);
        }
    }

    fn reset_transport(&mut self) {
        self.position = 0.0;
        self.state = PlayState::Stopped;
        if self.outgoing.is_none() {
            self.fade_from = None;
            self.gate.jump_to(0.0);
            self.eq.reset();
        }
    }

    fn require_track(&self) -> EngineResult<&Track> {
        self.track.as_deref().ok_or(EngineError::NoTrackLoaded(self.id))
    }

    // ─────────────────────────────────────────────────────────────
    // Transport
    // ─────────────────────────────────────────────────────────────

    /// Start playback from the current position
    pub fn play(&mut self) -> EngineResult<()> {
        self.require_track()?;
        if self.state != PlayState::Playing {
            self.state = PlayState::Playing;
            if self.outgoing.is_none() {
                self.fade_from = None;
            }
            self.sync_transport_atomics();
        }
        Ok(())
    }

    /// Pause at the current position
    ///
    /// A cued deck is already silent and simply becomes stopped.
    pub fn pause(&mut self) {
        match self.state {
            PlayState::Playing => {
                self.start_fade();
                self.state = PlayState::Stopped;
                self.sync_transport_atomics();
            }
            PlayState::Cued => {
                self.state = PlayState::Stopped;
                self.sync_transport_atomics();
            }
            PlayState::Stopped => {}
        }
    }

    pub fn toggle_play(&mut self) -> EngineResult<()> {
        if self.is_playing() {
            self.pause();
            Ok(())
        } else {
            self.play()
        }
    }

    /// Return to the start of the track and hold there, paused
    pub fn cue(&mut self) -> EngineResult<()> {
        self.require_track()?;
        if self.state == PlayState::Playing {
            self.start_fade();
        }
        self.position = 0.0;
        self.state = PlayState::Cued;
        self.sync_transport_atomics();
        Ok(())
    }

    /// Move the playhead to `seconds`, clamped to the track bounds
    ///
    /// Transport state is unchanged.
    pub fn seek(&mut self, seconds: f64) -> EngineResult<()> {
        let track = self.require_track()?;
        let duration = track.duration_seconds();
        let target = if seconds.is_finite() {
            seconds.clamp(0.0, duration)
        } else {
            0.0
        };
        self.position = target * track.audio.sample_rate() as f64;
        self.sync_transport_atomics();
        Ok(())
    }

    /// Playhead position in seconds
    pub fn position_seconds(&self) -> f64 {
        match &self.track {
            Some(track) if track.audio.sample_rate() > 0 => {
                self.position / track.audio.sample_rate() as f64
            }
            _ => 0.0,
        }
    }

    pub fn duration_seconds(&self) -> f64 {
        self.track.as_ref().map(|t| t.duration_seconds()).unwrap_or(0.0)
    }

    // ─────────────────────────────────────────────────────────────
    // Levels, EQ, pitch
    // ─────────────────────────────────────────────────────────────

    /// Set the volume fader (0.0 to 1.0)
    pub fn set_volume(&mut self, volume: f32) {
        self.volume = clamp_unit(volume);
        self.level.set_target(self.volume * self.gain);
        self.atomics.volume_bits.store(self.volume.to_bits(), Ordering::Relaxed);
    }

    #[inline]
    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Set the input gain/trim (0.0 to 1.0)
    pub fn set_gain(&mut self, gain: f32) {
        self.gain = clamp_unit(gain);
        self.level.set_target(self.volume * self.gain);
        self.atomics.gain_bits.store(self.gain.to_bits(), Ordering::Relaxed);
    }

    #[inline]
    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Set an EQ band in dB (clamped to ±12)
    pub fn set_eq(&mut self, band: EqBand, gain_db: f32) {
        let applied = self.eq.set_band(band, gain_db);
        self.atomics.eq_bits[band.index()].store(applied.to_bits(), Ordering::Relaxed);
    }

    pub fn eq(&self, band: EqBand) -> f32 {
        self.eq.band(band)
    }

    /// Set the pitch adjustment in percent (clamped to ±20)
    ///
    /// Returns the pitch actually applied.
    pub fn set_pitch(&mut self, percent: f64) -> f64 {
        self.pitch = if percent.is_finite() {
            percent.clamp(-PITCH_RANGE_PERCENT, PITCH_RANGE_PERCENT)
        } else {
            0.0
        };
        self.atomics.pitch_bits.store(self.pitch.to_bits(), Ordering::Relaxed);
        self.pitch
    }

    #[inline]
    pub fn pitch(&self) -> f64 {
        self.pitch
    }

    #[inline]
    pub fn playback_rate(&self) -> f64 {
        playback_rate(self.pitch)
    }

    /// Track BPM scaled by the playback rate (full precision)
    pub fn effective_bpm(&self) -> Option<f64> {
        self.track.as_ref().map(|t| t.bpm * self.playback_rate())
    }

    /// Effective BPM rounded for display
    pub fn display_bpm(&self) -> Option<u32> {
        self.effective_bpm().map(|bpm| bpm.round().max(0.0) as u32)
    }

    // ─────────────────────────────────────────────────────────────
    // Processing
    // ─────────────────────────────────────────────────────────────

    /// Render one block into `output` (overwrites)
    ///
    /// Returns `true` when the track ran out during this block. The deck is
    /// then stopped with its playhead back at the start.
    pub fn process(&mut self, output: &mut StereoBuffer) -> bool {
        let out = output.as_mut_slice();

        // A replaced track gets its tail first; the new one starts next block
        let outgoing = self.outgoing.take();
        let playing = self.state == PlayState::Playing && outgoing.is_none();
        let (track, start) = match (outgoing.as_deref(), self.track.as_deref()) {
            (Some(old), _) => (old, self.fade_from.take()),
            (None, Some(track)) if playing => (track, Some(self.position)),
            (None, Some(track)) => (track, self.fade_from.take()),
            (None, None) => {
                out.fill(StereoSample::silence());
                self.gate.jump_to(0.0);
                self.atomics.peak_bits.store(0f32.to_bits(), Ordering::Relaxed);
                return false;
            }
        };
        let Some(start) = start else {
            out.fill(StereoSample::silence());
            self.gate.jump_to(0.0);
            self.atomics.peak_bits.store(0f32.to_bits(), Ordering::Relaxed);
            return false;
        };

        let step = playback_rate(self.pitch) * track.audio.sample_rate() as f64
            / self.sample_rate as f64;
        let (cursor, reached_end) = render_frames(track.audio.frames(), start, step, out);

        self.eq.process(out);
        self.gate.set_target(if playing { 1.0 } else { 0.0 });
        self.gate.apply(out);
        self.level.apply(out);

        let peak = out.iter().map(|s| s.peak()).fold(0.0, f32::max);
        self.atomics.peak_bits.store(peak.to_bits(), Ordering::Relaxed);

        if outgoing.is_some() {
            self.eq.reset();
        }
        if !playing {
            return false;
        }

        if reached_end {
            log::debug!("Deck {}: end of track", self.id);
            self.position = 0.0;
            self.state = PlayState::Stopped;
            self.gate.jump_to(0.0);
        } else {
            self.position = cursor;
        }
        self.sync_transport_atomics();
        reached_end
    }

    fn sync_transport_atomics(&self) {
        self.atomics.store_transport(self.state, self.position_seconds());
    }

    fn sync_all_atomics(&self) {
        self.atomics.store_track(self.track.as_deref());
        self.sync_transport_atomics();
        self.atomics.pitch_bits.store(self.pitch.to_bits(), Ordering::Relaxed);
        self.atomics.volume_bits.store(self.volume.to_bits(), Ordering::Relaxed);
        self.atomics.gain_bits.store(self.gain.to_bits(), Ordering::Relaxed);
        for band in EqBand::ALL {
            self.atomics.eq_bits[band.index()].store(self.eq.band(band).to_bits(), Ordering::Relaxed);
        }
    }
}

#[inline]
fn clamp_unit(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Read `out.len()` frames from `frames` starting at fractional `cursor`
///
/// Uses linear interpolation between neighbouring frames. Frames past the
/// end are silent. Returns the cursor after the block and whether the end
/// was reached.
fn render_frames(
    frames: &[StereoSample],
    mut cursor: f64,
    step: f64,
    out: &mut [StereoSample],
) -> (f64, bool) {
    let len = frames.len();
    for i in 0..out.len() {
        let idx = cursor as usize;
        if idx >= len {
            out[i..].fill(StereoSample::silence());
            return (cursor, true);
        }
        let frac = (cursor - idx as f64) as f32;
        let current = frames[idx];
        let next = if idx + 1 < len { frames[idx + 1] } else { current };
        out[i] = current.lerp(next, frac);
        cursor += step;
    }
    (cursor, cursor as usize >= len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_file::{PcmBuffer, UNKNOWN_ARTIST};

    const SR: u32 = 48000;

    fn dc_track(seconds: f64, bpm: f64) -> TrackRef {
        let frames = (seconds * SR as f64) as usize;
        let audio = PcmBuffer::new(vec![StereoSample::mono(1.0); frames], SR);
        Track::new("dc", UNKNOWN_ARTIST, bpm, "1A", audio).into_shared()
    }

    fn ramp_track(frames: usize) -> TrackRef {
        let samples = (0..frames).map(|i| StereoSample::mono(i as f32)).collect();
        Track::new("ramp", UNKNOWN_ARTIST, 120.0, "", PcmBuffer::new(samples, SR)).into_shared()
    }

    fn block(len: usize) -> StereoBuffer {
        StereoBuffer::silence(len)
    }

    #[test]
    fn test_new_deck_defaults() {
        let deck = Deck::new(DeckId::A, SR);
        assert_eq!(deck.volume(), 0.8);
        assert_eq!(deck.gain(), 0.5);
        assert_eq!(deck.pitch(), 0.0);
        assert_eq!(deck.state(), PlayState::Stopped);
        assert!(deck.effective_bpm().is_none());

        let atomics = deck.atomics();
        assert!(!atomics.has_track());
        assert_eq!(atomics.volume(), 0.8);
        assert_eq!(atomics.gain(), 0.5);
    }

    #[test]
    fn test_transport_requires_track() {
        let mut deck = Deck::new(DeckId::B, SR);
        assert_eq!(deck.play(), Err(EngineError::NoTrackLoaded(DeckId::B)));
        assert_eq!(deck.cue(), Err(EngineError::NoTrackLoaded(DeckId::B)));
        assert_eq!(deck.seek(1.0), Err(EngineError::NoTrackLoaded(DeckId::B)));
        assert_eq!(deck.state(), PlayState::Stopped);
    }

    #[test]
    fn test_empty_deck_outputs_silence() {
        let mut deck = Deck::new(DeckId::A, SR);
        let mut out = StereoBuffer::from_vec(vec![StereoSample::mono(1.0); 64]);
        assert!(!deck.process(&mut out));
        assert_eq!(out.peak(), 0.0);
    }

    #[test]
    fn test_play_advances_position() {
        let mut deck = Deck::new(DeckId::A, SR);
        deck.load_track(dc_track(1.0, 120.0));
        deck.play().unwrap();

        let mut out = block(480);
        for _ in 0..10 {
            deck.process(&mut out);
        }
        assert!((deck.position_seconds() - 0.1).abs() < 1e-9);
        assert!((deck.atomics().position_seconds() - 0.1).abs() < 1e-9);
        assert!(deck.atomics().is_playing());
    }

    #[test]
    fn test_output_level_is_volume_times_gain() {
        let mut deck = Deck::new(DeckId::A, SR);
        deck.load_track(dc_track(1.0, 120.0));
        deck.play().unwrap();

        let mut out = block(256);
        deck.process(&mut out); // fade-in block
        deck.process(&mut out);
        assert!(out.iter().all(|s| (s.left - 0.4).abs() < 1e-6));
    }

    #[test]
    fn test_play_fades_in() {
        let mut deck = Deck::new(DeckId::A, SR);
        deck.load_track(dc_track(1.0, 120.0));
        deck.play().unwrap();

        let mut out = block(256);
        deck.process(&mut out);
        assert!(out[0].left < 0.01);
        assert!((out[255].left - 0.4).abs() < 1e-5);
    }

    #[test]
    fn test_pause_holds_position_and_fades_out() {
        let mut deck = Deck::new(DeckId::A, SR);
        deck.load_track(dc_track(1.0, 120.0));
        deck.play().unwrap();
        let mut out = block(480);
        deck.process(&mut out);
        deck.process(&mut out);

        deck.pause();
        let held = deck.position_seconds();
        assert_eq!(deck.state(), PlayState::Stopped);

        // Tail block ramps down without moving the playhead
        deck.process(&mut out);
        assert!(out[0].left > 0.3);
        assert!(out[479].left < 0.01);
        assert_eq!(deck.position_seconds(), held);

        deck.process(&mut out);
        assert_eq!(out.peak(), 0.0);
    }

    #[test]
    fn test_cue_returns_to_start_paused() {
        let mut deck = Deck::new(DeckId::A, SR);
        deck.load_track(dc_track(2.0, 120.0));
        deck.seek(1.5).unwrap();
        deck.play().unwrap();
        deck.cue().unwrap();

        assert_eq!(deck.state(), PlayState::Cued);
        assert_eq!(deck.position_seconds(), 0.0);
        assert_eq!(deck.atomics().play_state(), PlayState::Cued);
    }

    #[test]
    fn test_seek_clamps_to_bounds() {
        let mut deck = Deck::new(DeckId::A, SR);
        deck.load_track(dc_track(2.0, 120.0));

        deck.seek(-5.0).unwrap();
        assert_eq!(deck.position_seconds(), 0.0);
        deck.seek(10.0).unwrap();
        assert!((deck.position_seconds() - 2.0).abs() < 1e-9);
        deck.seek(0.75).unwrap();
        assert!((deck.position_seconds() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_seek_keeps_play_state() {
        let mut deck = Deck::new(DeckId::A, SR);
        deck.load_track(dc_track(2.0, 120.0));
        deck.play().unwrap();
        deck.seek(1.0).unwrap();
        assert!(deck.is_playing());

        deck.cue().unwrap();
        deck.seek(1.0).unwrap();
        assert_eq!(deck.state(), PlayState::Cued);
        assert!((deck.position_seconds() - 1.0).abs() < 1e-9);
        assert_eq!(deck.atomics().play_state(), PlayState::Cued);

        deck.pause();
        deck.seek(0.5).unwrap();
        assert_eq!(deck.state(), PlayState::Stopped);
    }

    #[test]
    fn test_pause_from_cued_stops() {
        let mut deck = Deck::new(DeckId::A, SR);
        deck.load_track(dc_track(2.0, 120.0));
        deck.cue().unwrap();
        deck.pause();
        assert_eq!(deck.state(), PlayState::Stopped);
        assert_eq!(deck.atomics().play_state(), PlayState::Stopped);
        assert_eq!(deck.position_seconds(), 0.0);

        let mut out = block(64);
        deck.process(&mut out);
        assert_eq!(out.peak(), 0.0);
    }

    #[test]
    fn test_end_of_track_stops_and_rewinds() {
        let mut deck = Deck::new(DeckId::A, SR);
        deck.load_track(dc_track(0.01, 120.0)); // 480 frames
        deck.play().unwrap();

        let mut out = block(512);
        assert!(deck.process(&mut out));
        assert_eq!(deck.state(), PlayState::Stopped);
        assert_eq!(deck.position_seconds(), 0.0);
        // Frames past the end are silent
        assert_eq!(out[500], StereoSample::silence());
    }

    #[test]
    fn test_pitch_changes_rate_and_bpm() {
        let mut deck = Deck::new(DeckId::A, SR);
        deck.load_track(dc_track(2.0, 128.0));

        assert_eq!(deck.set_pitch(2.5), 2.5);
        assert!((deck.playback_rate() - 1.025).abs() < 1e-12);
        assert!((deck.effective_bpm().unwrap() - 131.2).abs() < 1e-9);
        assert_eq!(deck.display_bpm(), Some(131));

        deck.play().unwrap();
        let mut out = block(480);
        deck.process(&mut out);
        assert!((deck.position_seconds() - 0.01 * 1.025).abs() < 1e-9);
    }

    #[test]
    fn test_pitch_range_endpoints_and_reset() {
        let mut deck = Deck::new(DeckId::A, SR);
        deck.load_track(dc_track(2.0, 125.0));

        assert_eq!(deck.set_pitch(20.0), 20.0);
        assert!((deck.playback_rate() - 1.2).abs() < 1e-12);
        assert_eq!(deck.display_bpm(), Some(150));

        assert_eq!(deck.set_pitch(-20.0), -20.0);
        assert!((deck.playback_rate() - 0.8).abs() < 1e-12);
        assert_eq!(deck.display_bpm(), Some(100));

        deck.set_pitch(0.0);
        assert_eq!(deck.playback_rate(), 1.0);
        assert_eq!(deck.effective_bpm(), Some(125.0));
        assert_eq!(deck.atomics().effective_bpm(), Some(125.0));
    }

    #[test]
    fn test_pitch_is_clamped() {
        let mut deck = Deck::new(DeckId::A, SR);
        assert_eq!(deck.set_pitch(35.0), 20.0);
        assert_eq!(deck.set_pitch(-35.0), -20.0);
        assert_eq!(deck.set_pitch(f64::NAN), 0.0);
    }

    #[test]
    fn test_track_rate_is_converted() {
        let mut deck = Deck::new(DeckId::A, SR);
        let audio = PcmBuffer::new(vec![StereoSample::mono(1.0); 24000], 24000);
        deck.load_track(Track::new("half", UNKNOWN_ARTIST, 120.0, "", audio).into_shared());
        deck.play().unwrap();

        let mut out = block(4800);
        deck.process(&mut out);
        // 4800 output frames at 48k = 0.1s of a 24k track
        assert!((deck.position_seconds() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_interpolation_between_frames() {
        let mut out = [StereoSample::silence(); 4];
        let frames: Vec<StereoSample> = (0..8).map(|i| StereoSample::mono(i as f32)).collect();
        let (cursor, ended) = render_frames(&frames, 1.0, 0.5, &mut out);
        assert!(!ended);
        assert_eq!(cursor, 3.0);
        let values: Vec<f32> = out.iter().map(|s| s.left).collect();
        assert_eq!(values, vec![1.0, 1.5, 2.0, 2.5]);
    }

    #[test]
    fn test_load_resets_transport() {
        let mut deck = Deck::new(DeckId::A, SR);
        deck.load_track(ramp_track(48000));
        deck.play().unwrap();
        let mut out = block(256);
        deck.process(&mut out);

        deck.load_track(ramp_track(1000));
        assert_eq!(deck.state(), PlayState::Stopped);
        assert_eq!(deck.position_seconds(), 0.0);

        deck.unload_track();
        assert!(deck.track().is_none());
        assert!(!deck.atomics().has_track());
    }

    #[test]
    fn test_load_while_playing_fades_out_old_track() {
        let mut deck = Deck::new(DeckId::A, SR);
        deck.load_track(dc_track(1.0, 120.0));
        deck.play().unwrap();
        let mut out = block(256);
        deck.process(&mut out);
        deck.process(&mut out);

        deck.load_track(dc_track(1.0, 124.0));
        deck.play().unwrap();

        // Old track ramps down from full level
        deck.process(&mut out);
        assert!((out[0].left - 0.4).abs() < 0.01);
        assert!(out[255].left < 0.01);
        assert_eq!(deck.position_seconds(), 0.0);

        // New track fades in from the start
        deck.process(&mut out);
        assert!(out[0].left < 0.01);
        assert!((out[255].left - 0.4).abs() < 1e-5);
        assert!(deck.position_seconds() > 0.0);
    }

    #[test]
    fn test_unload_while_playing_fades_out() {
        let mut deck = Deck::new(DeckId::A, SR);
        deck.load_track(dc_track(1.0, 120.0));
        deck.play().unwrap();
        let mut out = block(256);
        deck.process(&mut out);
        deck.process(&mut out);

        deck.unload_track();
        deck.process(&mut out);
        assert!(out[0].left > 0.3);
        assert!(out[255].left < 0.01);

        deck.process(&mut out);
        assert_eq!(out.peak(), 0.0);
    }

    #[test]
    fn test_snapshot_reflects_track() {
        let mut deck = Deck::new(DeckId::A, SR);
        let track = dc_track(1.0, 126.0);
        deck.load_track(track.clone());
        deck.set_pitch(-2.0);
        deck.set_eq(EqBand::High, -6.0);

        let snapshot = DeckSnapshot::capture(DeckId::A, &deck.atomics(), Some(&track));
        assert_eq!(snapshot.track_name.as_deref(), Some("dc"));
        assert_eq!(snapshot.key.as_deref(), Some("1A"));
        assert_eq!(snapshot.track_bpm, Some(126.0));
        assert_eq!(snapshot.display_bpm, Some(123));
        assert_eq!(snapshot.eq_high, -6.0);
        assert_eq!(snapshot.state, PlayState::Stopped);
    }
}

//! Common types for Vinyl
//!
//! Fundamental audio types shared by the engine, decoder and backend:
//! stereo frames and buffers, deck and slot identifiers, transport states.

use std::fmt;
use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Default engine sample rate (48kHz)
///
/// The actual rate is negotiated with the output device at startup.
pub const SAMPLE_RATE: u32 = 48000;

/// Number of decks in the mixer
pub const NUM_DECKS: usize = 2;

/// Number of sampler slots
pub const NUM_SLOTS: usize = 8;

/// Audio sample type (32-bit float for all processing)
pub type Sample = f32;

/// A single stereo frame (left and right channels)
///
/// `#[repr(C)]` keeps the layout `[left, right]` so interleaved `f32` data
/// from the decoder can be reinterpreted with bytemuck.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct StereoSample {
    pub left: Sample,
    pub right: Sample,
}

impl StereoSample {
    #[inline]
    pub fn new(left: Sample, right: Sample) -> Self {
        Self { left, right }
    }

    #[inline]
    pub fn silence() -> Self {
        Self::default()
    }

    /// Same value in both channels
    #[inline]
    pub fn mono(value: Sample) -> Self {
        Self { left: value, right: value }
    }

    /// Linear interpolation between two frames (`t` in 0..1)
    #[inline]
    pub fn lerp(self, next: Self, t: Sample) -> Self {
        Self {
            left: self.left + (next.left - self.left) * t,
            right: self.right + (next.right - self.right) * t,
        }
    }

    /// Peak amplitude (max of abs(left), abs(right))
    #[inline]
    pub fn peak(&self) -> Sample {
        self.left.abs().max(self.right.abs())
    }
}

impl std::ops::Add for StereoSample {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Self {
            left: self.left + other.left,
            right: self.right + other.right,
        }
    }
}

impl std::ops::AddAssign for StereoSample {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.left += other.left;
        self.right += other.right;
    }
}

impl std::ops::Mul<Sample> for StereoSample {
    type Output = Self;

    #[inline]
    fn mul(self, factor: Sample) -> Self {
        Self {
            left: self.left * factor,
            right: self.right * factor,
        }
    }
}

impl std::ops::MulAssign<Sample> for StereoSample {
    #[inline]
    fn mul_assign(&mut self, factor: Sample) {
        self.left *= factor;
        self.right *= factor;
    }
}

/// A buffer of stereo frames
///
/// Used both for decoded audio and for the pre-allocated per-block working
/// buffers on the audio thread. Block buffers are sized once with
/// [`StereoBuffer::silence`] and then resized with
/// [`StereoBuffer::set_len_from_capacity`], which never allocates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StereoBuffer {
    samples: Vec<StereoSample>,
}

impl StereoBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
        }
    }

    /// Create a buffer filled with silence
    pub fn silence(len: usize) -> Self {
        Self {
            samples: vec![StereoSample::silence(); len],
        }
    }

    /// Create a buffer from interleaved samples [L, R, L, R, ...]
    ///
    /// A trailing odd sample is ignored.
    pub fn from_interleaved(interleaved: &[Sample]) -> Self {
        let even = interleaved.len() - interleaved.len() % 2;
        let frames: &[StereoSample] = bytemuck::cast_slice(&interleaved[..even]);
        Self {
            samples: frames.to_vec(),
        }
    }

    pub fn from_vec(samples: Vec<StereoSample>) -> Self {
        Self { samples }
    }

    /// Number of stereo frames in the buffer
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.samples.capacity()
    }

    /// Clear without releasing capacity
    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Set the working length of a pre-allocated buffer (real-time safe)
    ///
    /// Newly exposed frames are silent. Must not exceed capacity.
    #[inline]
    pub fn set_len_from_capacity(&mut self, new_len: usize) {
        if new_len > self.samples.len() {
            debug_assert!(
                new_len <= self.samples.capacity(),
                "set_len_from_capacity called with len > capacity"
            );
            self.samples.resize(new_len, StereoSample::silence());
        } else {
            self.samples.truncate(new_len);
        }
    }

    pub fn fill_silence(&mut self) {
        self.samples.fill(StereoSample::silence());
    }

    #[inline]
    pub fn as_slice(&self) -> &[StereoSample] {
        &self.samples
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [StereoSample] {
        &mut self.samples
    }

    /// Zero-copy interleaved view [L, R, L, R, ...]
    #[inline]
    pub fn as_interleaved(&self) -> &[Sample] {
        bytemuck::cast_slice(&self.samples)
    }

    /// Append frames, up to the remaining capacity
    ///
    /// Returns the number of frames appended. Never allocates.
    pub fn extend_within_capacity(&mut self, frames: &[StereoSample]) -> usize {
        let room = self.samples.capacity() - self.samples.len();
        let take = frames.len().min(room);
        self.samples.extend_from_slice(&frames[..take]);
        take
    }

    /// Sum another buffer into this one (lengths must match)
    pub fn add_buffer(&mut self, other: &StereoBuffer) {
        debug_assert_eq!(self.len(), other.len(), "Buffer lengths must match");
        for (dst, src) in self.samples.iter_mut().zip(other.samples.iter()) {
            *dst += *src;
        }
    }

    pub fn scale(&mut self, factor: Sample) {
        for sample in &mut self.samples {
            *sample *= factor;
        }
    }

    /// Copy from another buffer without allocating (if capacity suffices)
    pub fn copy_from(&mut self, other: &StereoBuffer) {
        let len = other.samples.len();
        debug_assert!(
            len <= self.samples.capacity(),
            "copy_from: insufficient capacity ({} < {})",
            self.samples.capacity(),
            len
        );
        self.set_len_from_capacity(len);
        self.samples[..len].copy_from_slice(&other.samples[..len]);
    }

    pub fn into_vec(self) -> Vec<StereoSample> {
        self.samples
    }

    pub fn iter(&self) -> impl Iterator<Item = &StereoSample> {
        self.samples.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut StereoSample> {
        self.samples.iter_mut()
    }

    /// Peak amplitude across the buffer
    pub fn peak(&self) -> Sample {
        self.samples.iter().map(|s| s.peak()).fold(0.0, Sample::max)
    }
}

impl Index<usize> for StereoBuffer {
    type Output = StereoSample;

    #[inline]
    fn index(&self, index: usize) -> &Self::Output {
        &self.samples[index]
    }
}

impl IndexMut<usize> for StereoBuffer {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.samples[index]
    }
}

/// Deck identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeckId {
    A,
    B,
}

impl DeckId {
    pub const ALL: [DeckId; NUM_DECKS] = [DeckId::A, DeckId::B];

    #[inline]
    pub fn index(self) -> usize {
        match self {
            DeckId::A => 0,
            DeckId::B => 1,
        }
    }

    pub fn from_index(idx: usize) -> Option<Self> {
        match idx {
            0 => Some(DeckId::A),
            1 => Some(DeckId::B),
            _ => None,
        }
    }

    /// The other deck
    pub fn opposite(self) -> Self {
        match self {
            DeckId::A => DeckId::B,
            DeckId::B => DeckId::A,
        }
    }
}

impl fmt::Display for DeckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeckId::A => write!(f, "A"),
            DeckId::B => write!(f, "B"),
        }
    }
}

/// Sampler slot identifier (1-8)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(u8);

impl SlotId {
    pub const ALL: [SlotId; NUM_SLOTS] = [
        SlotId(1), SlotId(2), SlotId(3), SlotId(4),
        SlotId(5), SlotId(6), SlotId(7), SlotId(8),
    ];

    /// Validate a 1-based slot number
    pub fn new(number: u8) -> Result<Self, EngineError> {
        if (1..=NUM_SLOTS as u8).contains(&number) {
            Ok(Self(number))
        } else {
            Err(EngineError::InvalidSlot(number))
        }
    }

    /// Slot for a 0-based array index
    pub fn from_index(idx: usize) -> Option<Self> {
        (idx < NUM_SLOTS).then(|| Self(idx as u8 + 1))
    }

    /// 1-based slot number as shown to the user
    #[inline]
    pub fn number(self) -> u8 {
        self.0
    }

    /// 0-based array index
    #[inline]
    pub fn index(self) -> usize {
        (self.0 - 1) as usize
    }

}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transport state for a deck
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayState {
    #[default]
    Stopped,
    /// Paused at the start of the track after a cue
    Cued,
    Playing,
}

impl PlayState {
    pub(crate) fn to_u8(self) -> u8 {
        match self {
            PlayState::Stopped => 0,
            PlayState::Cued => 1,
            PlayState::Playing => 2,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => PlayState::Cued,
            2 => PlayState::Playing,
            _ => PlayState::Stopped,
        }
    }
}

/// EQ band selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EqBand {
    Low,
    Mid,
    High,
}

impl EqBand {
    pub const ALL: [EqBand; 3] = [EqBand::Low, EqBand::Mid, EqBand::High];

    #[inline]
    pub fn index(self) -> usize {
        match self {
            EqBand::Low => 0,
            EqBand::Mid => 1,
            EqBand::High => 2,
        }
    }
}

/// Where a sampler recording takes its audio from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordSource {
    Microphone,
    MasterBusOutput,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stereo_sample_operations() {
        let a = StereoSample::new(1.0, 2.0);
        let b = StereoSample::new(0.5, 0.5);

        let sum = a + b;
        assert_eq!(sum.left, 1.5);
        assert_eq!(sum.right, 2.5);

        let scaled = a * 0.5;
        assert_eq!(scaled.left, 0.5);
        assert_eq!(scaled.right, 1.0);
    }

    #[test]
    fn test_lerp_midpoint() {
        let a = StereoSample::new(0.0, 1.0);
        let b = StereoSample::new(1.0, -1.0);
        let mid = a.lerp(b, 0.5);
        assert_eq!(mid, StereoSample::new(0.5, 0.0));
    }

    #[test]
    fn test_stereo_buffer_from_interleaved() {
        let buffer = StereoBuffer::from_interleaved(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);

        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer[0], StereoSample::new(1.0, 2.0));
        assert_eq!(buffer[2], StereoSample::new(5.0, 6.0));
    }

    #[test]
    fn test_extend_within_capacity_never_grows() {
        let mut buffer = StereoBuffer::with_capacity(4);
        let frames = [StereoSample::mono(0.5); 6];

        assert_eq!(buffer.extend_within_capacity(&frames[..3]), 3);
        assert_eq!(buffer.extend_within_capacity(&frames), 1);
        assert_eq!(buffer.len(), 4);
        assert_eq!(buffer.capacity(), 4);
    }

    #[test]
    fn test_set_len_from_capacity() {
        let mut buffer = StereoBuffer::silence(16);
        buffer.set_len_from_capacity(4);
        assert_eq!(buffer.len(), 4);
        buffer.set_len_from_capacity(16);
        assert_eq!(buffer.len(), 16);
        assert_eq!(buffer.peak(), 0.0);
    }

    #[test]
    fn test_slot_id_range() {
        assert!(SlotId::new(0).is_err());
        assert!(SlotId::new(9).is_err());
        let slot = SlotId::new(8).unwrap();
        assert_eq!(slot.index(), 7);
        assert_eq!(SlotId::from_index(7), Some(slot));
        assert_eq!(SlotId::ALL[0].number(), 1);
    }

    #[test]
    fn test_deck_id_roundtrip() {
        for deck in DeckId::ALL {
            assert_eq!(DeckId::from_index(deck.index()), Some(deck));
        }
        assert_eq!(DeckId::A.opposite(), DeckId::B);
    }
}

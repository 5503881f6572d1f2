//! Engine error types

use thiserror::Error;

use crate::audio_file::DecodeError;
use crate::types::{DeckId, SlotId};

/// Errors returned by deck, sampler and controller operations
///
/// A failed operation leaves engine state unchanged.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Transport or sync operation on a deck with no track
    #[error("No track loaded on deck {0}")]
    NoTrackLoaded(DeckId),

    /// Playback requested on a slot with no buffer
    #[error("Sampler slot {0} is empty")]
    EmptySlot(SlotId),

    /// Playback requested on a slot that is currently recording
    #[error("Sampler slot {0} is recording")]
    SlotRecording(SlotId),

    /// A recording is already in progress on the given slot
    #[error("Already recording into slot {0}")]
    AlreadyRecording(SlotId),

    /// Sample data could not be decoded
    #[error("Decode failed: {0}")]
    Decode(#[from] DecodeError),

    /// The requested capture source has no device behind it
    #[error("Capture device unavailable")]
    DeviceUnavailable,

    /// Slot number outside 1..=8
    #[error("Invalid sampler slot: {0} (expected 1-8)")]
    InvalidSlot(u8),

    /// The command queue to the audio thread is full
    #[error("Engine command queue is full")]
    QueueFull,
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

//! Lock-free command queue for real-time audio engine control
//!
//! The UI (or [`crate::EngineController`]) pushes commands into an `rtrb`
//! single-producer single-consumer ring. The audio thread drains the ring at
//! the start of every block, so state never changes mid-block and pushing
//! never blocks either side.
//!
//! ```ignore
//! let (mut tx, mut rx) = command_channel();
//! tx.push(EngineCommand::Play { deck: DeckId::A })?;
//! engine.process_commands(&mut rx);
//! ```

use basedrop::Shared;

use crate::audio_file::{PcmBuffer, TrackRef};
use crate::types::{DeckId, EqBand, RecordSource, SlotId, StereoBuffer};

/// A decoded sample ready to be installed into a slot
///
/// Boxed in the command enum to keep the enum small.
pub struct SampleInstall {
    pub slot: SlotId,
    /// Load generation this decode belongs to
    pub epoch: u64,
    /// Buffer already converted to the engine sample rate
    pub buffer: Shared<PcmBuffer>,
    /// New display name, `None` keeps the current one
    pub name: Option<String>,
}

/// Commands sent from the control thread to the audio thread
pub enum EngineCommand {
    // ─────────────────────────────────────────────────────────────
    // Track Management
    // ─────────────────────────────────────────────────────────────
    LoadTrack { deck: DeckId, track: TrackRef },
    UnloadTrack { deck: DeckId },

    // ─────────────────────────────────────────────────────────────
    // Transport
    // ─────────────────────────────────────────────────────────────
    Play { deck: DeckId },
    Pause { deck: DeckId },
    TogglePlay { deck: DeckId },
    /// Return to the start of the track, paused
    Cue { deck: DeckId },
    Seek { deck: DeckId, seconds: f64 },

    // ─────────────────────────────────────────────────────────────
    // Deck Levels, EQ, Pitch
    // ─────────────────────────────────────────────────────────────
    /// Volume fader, 0.0 to 1.0
    SetVolume { deck: DeckId, volume: f32 },
    /// Input gain, 0.0 to 1.0
    SetGain { deck: DeckId, gain: f32 },
    /// Band gain in dB, clamped to ±12
    SetEq { deck: DeckId, band: EqBand, gain_db: f32 },
    /// Pitch in percent, clamped to ±20
    SetPitch { deck: DeckId, percent: f64 },
    /// Match `target`'s tempo to `source`
    SyncTo { source: DeckId, target: DeckId },

    // ─────────────────────────────────────────────────────────────
    // Mixer Bus
    // ─────────────────────────────────────────────────────────────
    SetCrossfader { position: f32 },
    SetMasterVolume { volume: f32 },
    SetCueVolume { volume: f32 },
    SetCueListen { deck: DeckId, enabled: bool },

    // ─────────────────────────────────────────────────────────────
    // Sampler
    // ─────────────────────────────────────────────────────────────
    /// Begin recording; `capture` is pre-allocated by the sender
    StartRecording {
        slot: SlotId,
        source: RecordSource,
        capture: StereoBuffer,
    },
    StopRecording,
    InstallSample(Box<SampleInstall>),
    PlaySlot { slot: SlotId, looping: bool },
    StopSlot { slot: SlotId },
    StopAllSlots,
    /// Slot volume, 0-100
    SetSlotVolume { slot: SlotId, volume: f32 },
    /// Sampler master volume, 0-100
    SetSamplerVolume { volume: f32 },
    ClearSlot { slot: SlotId },
}

impl EngineCommand {
    /// Short name for logs and rejection events
    pub fn name(&self) -> &'static str {
        match self {
            EngineCommand::LoadTrack { .. } => "load_track",
            EngineCommand::UnloadTrack { .. } => "unload_track",
            EngineCommand::Play { .. } => "play",
            EngineCommand::Pause { .. } => "pause",
            EngineCommand::TogglePlay { .. } => "toggle_play",
            EngineCommand::Cue { .. } => "cue",
            EngineCommand::Seek { .. } => "seek",
            EngineCommand::SetVolume { .. } => "set_volume",
            EngineCommand::SetGain { .. } => "set_gain",
            EngineCommand::SetEq { .. } => "set_eq",
            EngineCommand::SetPitch { .. } => "set_pitch",
            EngineCommand::SyncTo { .. } => "sync_to",
            EngineCommand::SetCrossfader { .. } => "set_crossfader",
            EngineCommand::SetMasterVolume { .. } => "set_master_volume",
            EngineCommand::SetCueVolume { .. } => "set_cue_volume",
            EngineCommand::SetCueListen { .. } => "set_cue_listen",
            EngineCommand::StartRecording { .. } => "start_recording",
            EngineCommand::StopRecording => "stop_recording",
            EngineCommand::InstallSample(_) => "install_sample",
            EngineCommand::PlaySlot { .. } => "play_slot",
            EngineCommand::StopSlot { .. } => "stop_slot",
            EngineCommand::StopAllSlots => "stop_all_slots",
            EngineCommand::SetSlotVolume { .. } => "set_slot_volume",
            EngineCommand::SetSamplerVolume { .. } => "set_sampler_volume",
            EngineCommand::ClearSlot { .. } => "clear_slot",
        }
    }
}

/// Command queue capacity
///
/// Large enough that a burst of UI actions between two audio blocks never
/// fills it in practice.
pub const COMMAND_QUEUE_CAPACITY: usize = 1024;

/// Create the command ring (producer for the control side, consumer for audio)
pub fn command_channel() -> (rtrb::Producer<EngineCommand>, rtrb::Consumer<EngineCommand>) {
    rtrb::RingBuffer::new(COMMAND_QUEUE_CAPACITY)
}

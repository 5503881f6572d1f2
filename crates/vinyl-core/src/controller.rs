//! UI-side engine control
//!
//! [`EngineController`] is the only thing the UI needs: it turns user
//! actions into [`EngineCommand`]s, validates them against the engine's
//! atomics so errors come back synchronously, and builds display snapshots.
//!
//! Sample loading runs off-thread. `load_sample` returns immediately; the
//! decoded buffer comes back through [`EngineController::poll_loads`], which
//! forwards it to the audio thread. Every load, clear and recording bumps the
//! slot's epoch, so a decode that finishes after its slot moved on is dropped.
//!
//! Commands are checked against what the controller has already queued, not
//! only the atomics, so `load_track` followed at once by `play` is accepted.
//! Anything that changes in flight is reported by the engine as
//! [`EngineEvent::CommandRejected`]. Feed engine events back through
//! [`EngineController::handle_event`] to keep slot names current.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

use basedrop::Shared;
use crossbeam::channel::{unbounded, Receiver, Sender};

use crate::audio_file::{decode_sample, DecodeError, PcmBuffer, TrackRef};
use crate::engine::{
    default_slot_name, plan_sync, AudioEngine, BusAtomics, BusSnapshot, DeckAtomics,
    DeckSnapshot, EngineCommand, EngineEvent, EventSender, SampleInstall, SamplerAtomics,
    SlotAtomics, SlotSnapshot, SyncOutcome, SyncStatus,
};
use crate::error::{EngineError, EngineResult};
use crate::types::{DeckId, EqBand, RecordSource, SlotId, StereoBuffer, NUM_DECKS, NUM_SLOTS};

/// Point-in-time view of the whole sampler
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerSnapshot {
    pub master_volume: f32,
    pub recording_slot: Option<SlotId>,
    /// Length of the active recording so far
    pub recorded_seconds: f64,
    pub slots: Vec<SlotSnapshot>,
}

/// A finished background decode
struct DecodedSample {
    slot: SlotId,
    epoch: u64,
    name: Option<String>,
    buffer: Shared<PcmBuffer>,
}

/// Control surface for a running engine
pub struct EngineController {
    producer: rtrb::Producer<EngineCommand>,
    sample_rate: u32,
    deck_atomics: [Arc<DeckAtomics>; NUM_DECKS],
    slot_atomics: [Arc<SlotAtomics>; NUM_SLOTS],
    sampler_atomics: Arc<SamplerAtomics>,
    bus_atomics: Arc<BusAtomics>,
    /// Tracks as last sent to each deck, for snapshot metadata
    tracks: [Option<TrackRef>; NUM_DECKS],
    /// Slot names as confirmed by the engine, for snapshots
    slot_names: [String; NUM_SLOTS],
    /// Names waiting for `SampleLoaded` of the given epoch
    pending_names: [Option<(u64, String)>; NUM_SLOTS],
    /// Buffer presence a queued install or clear will leave, valid while the
    /// slot epoch still matches
    expected_sample: [Option<(u64, bool)>; NUM_SLOTS],
    events: EventSender,
    decoded_tx: Sender<DecodedSample>,
    decoded_rx: Receiver<DecodedSample>,
    /// Installs that did not fit in the queue, retried on the next poll
    backlog: VecDeque<EngineCommand>,
    microphone_available: bool,
    record_capacity_frames: usize,
}

impl EngineController {
    /// Build a controller for `engine`
    ///
    /// Call before the engine moves to the audio thread. `producer` must feed
    /// the consumer the engine drains, and `events` should be the sender the
    /// engine was given so load failures reach the same receiver.
    pub fn new(
        engine: &AudioEngine,
        producer: rtrb::Producer<EngineCommand>,
        events: EventSender,
        record_capacity_frames: usize,
    ) -> Self {
        let (decoded_tx, decoded_rx) = unbounded();
        Self {
            producer,
            sample_rate: engine.sample_rate(),
            deck_atomics: engine.deck_atomics(),
            slot_atomics: engine.slot_atomics(),
            sampler_atomics: engine.sampler_atomics(),
            bus_atomics: engine.bus_atomics(),
            tracks: [None, None],
            slot_names: SlotId::ALL.map(|slot| default_slot_name(slot).to_string()),
            pending_names: Default::default(),
            expected_sample: [None; NUM_SLOTS],
            events,
            decoded_tx,
            decoded_rx,
            backlog: VecDeque::new(),
            microphone_available: engine.has_microphone(),
            record_capacity_frames,
        }
    }

    /// Engine sample rate
    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn microphone_available(&self) -> bool {
        self.microphone_available
    }

    fn send(&mut self, cmd: EngineCommand) -> EngineResult<()> {
        log::debug!("send: {}", cmd.name());
        self.producer.push(cmd).map_err(|_| {
            log::warn!("Engine command queue full");
            EngineError::QueueFull
        })
    }

    /// Checked against the queued loads, which the engine applies in order
    fn require_track(&self, deck: DeckId) -> EngineResult<()> {
        if self.tracks[deck.index()].is_some() {
            Ok(())
        } else {
            Err(EngineError::NoTrackLoaded(deck))
        }
    }

    /// Whether `slot` holds a buffer once queued commands have applied
    fn slot_has_sample(&self, slot: SlotId) -> bool {
        let atomics = &self.slot_atomics[slot.index()];
        match self.expected_sample[slot.index()] {
            Some((epoch, has_sample)) if epoch == atomics.epoch() => has_sample,
            _ => atomics.has_sample(),
        }
    }

    /// Update UI-side state from an engine event
    ///
    /// Call for every event drained from the engine's receiver.
    pub fn handle_event(&mut self, event: &EngineEvent) {
        if let EngineEvent::SampleLoaded { slot, epoch } = *event {
            let index = slot.index();
            let confirmed = self.pending_names[index]
                .as_ref()
                .is_some_and(|(pending, _)| *pending == epoch);
            if confirmed {
                if let Some((_, name)) = self.pending_names[index].take() {
                    self.slot_names[index] = name;
                }
            }
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Decks
    // ─────────────────────────────────────────────────────────────

    /// Load a track; the deck stops at the start of it
    pub fn load_track(&mut self, deck: DeckId, track: TrackRef) -> EngineResult<()> {
        self.send(EngineCommand::LoadTrack {
            deck,
            track: track.clone(),
        })?;
        self.tracks[deck.index()] = Some(track);
        Ok(())
    }

    pub fn unload_track(&mut self, deck: DeckId) -> EngineResult<()> {
        self.send(EngineCommand::UnloadTrack { deck })?;
        self.tracks[deck.index()] = None;
        Ok(())
    }

    pub fn play(&mut self, deck: DeckId) -> EngineResult<()> {
        self.require_track(deck)?;
        self.send(EngineCommand::Play { deck })
    }

    pub fn pause(&mut self, deck: DeckId) -> EngineResult<()> {
        self.send(EngineCommand::Pause { deck })
    }

    pub fn toggle_play(&mut self, deck: DeckId) -> EngineResult<()> {
        self.require_track(deck)?;
        self.send(EngineCommand::TogglePlay { deck })
    }

    pub fn cue(&mut self, deck: DeckId) -> EngineResult<()> {
        self.require_track(deck)?;
        self.send(EngineCommand::Cue { deck })
    }

    /// Seek to `seconds` (clamped to the track)
    pub fn seek(&mut self, deck: DeckId, seconds: f64) -> EngineResult<()> {
        self.require_track(deck)?;
        self.send(EngineCommand::Seek { deck, seconds })
    }

    /// Volume fader, 0.0 to 1.0
    pub fn set_volume(&mut self, deck: DeckId, volume: f32) -> EngineResult<()> {
        self.send(EngineCommand::SetVolume { deck, volume })
    }

    /// Input gain, 0.0 to 1.0
    pub fn set_gain(&mut self, deck: DeckId, gain: f32) -> EngineResult<()> {
        self.send(EngineCommand::SetGain { deck, gain })
    }

    pub fn set_eq(&mut self, deck: DeckId, band: EqBand, gain_db: f32) -> EngineResult<()> {
        self.send(EngineCommand::SetEq {
            deck,
            band,
            gain_db,
        })
    }

    /// Pitch in percent, clamped to ±20 by the deck
    pub fn set_pitch(&mut self, deck: DeckId, percent: f64) -> EngineResult<()> {
        self.send(EngineCommand::SetPitch { deck, percent })
    }

    // ─────────────────────────────────────────────────────────────
    // Beat sync
    // ─────────────────────────────────────────────────────────────

    /// Current tempo relationship, `None` unless both decks have tracks
    pub fn sync_status(&self) -> Option<SyncStatus> {
        let a = self.deck_atomics[0].effective_bpm()?;
        let b = self.deck_atomics[1].effective_bpm()?;
        Some(SyncStatus::measure(a, b))
    }

    /// Match `target`'s tempo to `source`
    ///
    /// Does nothing and returns [`SyncOutcome::AlreadyInSync`] when the
    /// decks are already within tolerance.
    pub fn sync_to(&mut self, source: DeckId, target: DeckId) -> EngineResult<SyncOutcome> {
        let source_bpm = self.deck_atomics[source.index()]
            .effective_bpm()
            .ok_or(EngineError::NoTrackLoaded(source))?;
        let target_atomics = &self.deck_atomics[target.index()];
        let target_bpm = target_atomics
            .effective_bpm()
            .ok_or(EngineError::NoTrackLoaded(target))?;

        let outcome = plan_sync(source_bpm, target_atomics.track_bpm(), target_bpm);
        if let SyncOutcome::Adjusted { pitch_percent } = outcome {
            log::info!("Sync deck {} to {}: pitch {:+.2}%", target, source, pitch_percent);
            self.set_pitch(target, pitch_percent)?;
        }
        Ok(outcome)
    }

    // ─────────────────────────────────────────────────────────────
    // Mixer bus
    // ─────────────────────────────────────────────────────────────

    /// Crossfader, 0 (deck A) to 100 (deck B)
    pub fn set_crossfader(&mut self, position: f32) -> EngineResult<()> {
        self.send(EngineCommand::SetCrossfader { position })
    }

    pub fn set_master_volume(&mut self, volume: f32) -> EngineResult<()> {
        self.send(EngineCommand::SetMasterVolume { volume })
    }

    pub fn set_cue_volume(&mut self, volume: f32) -> EngineResult<()> {
        self.send(EngineCommand::SetCueVolume { volume })
    }

    pub fn set_cue_listen(&mut self, deck: DeckId, enabled: bool) -> EngineResult<()> {
        self.send(EngineCommand::SetCueListen { deck, enabled })
    }

    // ─────────────────────────────────────────────────────────────
    // Sampler
    // ─────────────────────────────────────────────────────────────

    /// Start recording into `slot` from `source`
    pub fn start_recording(&mut self, slot: SlotId, source: RecordSource) -> EngineResult<()> {
        if source == RecordSource::Microphone && !self.microphone_available {
            return Err(EngineError::DeviceUnavailable);
        }
        self.sampler_atomics
            .claim_recording(slot)
            .map_err(EngineError::AlreadyRecording)?;

        // Pending loads into this slot lose to the recording
        self.slot_atomics[slot.index()].next_epoch();
        let capture = StereoBuffer::with_capacity(self.record_capacity_frames);
        let result = self.send(EngineCommand::StartRecording {
            slot,
            source,
            capture,
        });
        if result.is_err() {
            self.sampler_atomics.release_recording_if(slot);
        }
        result
    }

    /// Finish the active recording (no-op when nothing is recording)
    ///
    /// The result arrives as [`EngineEvent::RecordingFinished`].
    pub fn stop_recording(&mut self) -> EngineResult<()> {
        self.send(EngineCommand::StopRecording)
    }

    fn check_loadable(&self, slot: SlotId) -> EngineResult<()> {
        if self.sampler_atomics.recording_slot() == Some(slot) {
            Err(EngineError::SlotRecording(slot))
        } else {
            Ok(())
        }
    }

    /// Decode `bytes` in the background and install them into `slot`
    ///
    /// `name` replaces the slot's display name when given. The outcome is
    /// reported as [`EngineEvent::SampleLoaded`] or
    /// [`EngineEvent::SampleLoadFailed`]; call [`Self::poll_loads`]
    /// regularly to forward finished decodes.
    pub fn load_sample(
        &mut self,
        slot: SlotId,
        bytes: Vec<u8>,
        name: Option<String>,
        hint: Option<String>,
    ) -> EngineResult<()> {
        self.check_loadable(slot)?;
        let epoch = self.slot_atomics[slot.index()].next_epoch();
        self.spawn_decode(slot, epoch, name, move || Ok((bytes, hint)));
        Ok(())
    }

    /// Read and decode a file in the background, naming the slot after it
    pub fn load_sample_file(&mut self, slot: SlotId, path: &Path) -> EngineResult<()> {
        self.check_loadable(slot)?;
        let epoch = self.slot_atomics[slot.index()].next_epoch();
        let name = path.file_stem().and_then(|s| s.to_str()).map(str::to_string);
        let hint = path.extension().and_then(|e| e.to_str()).map(str::to_string);
        let path = path.to_path_buf();
        self.spawn_decode(slot, epoch, name, move || {
            std::fs::read(&path)
                .map(|bytes| (bytes, hint))
                .map_err(|e| DecodeError::Io(format!("{}: {}", path.display(), e)))
        });
        Ok(())
    }

    /// Decode on the calling thread and queue the install
    ///
    /// Decode errors are returned directly and leave the slot unchanged.
    pub fn load_sample_blocking(
        &mut self,
        slot: SlotId,
        bytes: Vec<u8>,
        name: Option<String>,
        hint: Option<&str>,
    ) -> EngineResult<()> {
        self.check_loadable(slot)?;
        let epoch = self.slot_atomics[slot.index()].next_epoch();
        let pcm = decode_sample(bytes, hint, self.sample_rate)?;
        self.forward(DecodedSample {
            slot,
            epoch,
            name,
            buffer: pcm.into_shared(),
        });
        Ok(())
    }

    fn spawn_decode<F>(&self, slot: SlotId, epoch: u64, name: Option<String>, read: F)
    where
        F: FnOnce() -> Result<(Vec<u8>, Option<String>), DecodeError> + Send + 'static,
    {
        let sample_rate = self.sample_rate;
        let decoded_tx = self.decoded_tx.clone();
        let events = self.events.clone();
        let slot_atomics = Arc::clone(&self.slot_atomics[slot.index()]);

        rayon::spawn(move || {
            let result = read()
                .and_then(|(bytes, hint)| decode_sample(bytes, hint.as_deref(), sample_rate));
            match result {
                Ok(pcm) => {
                    log::info!(
                        "Sampler: decoded slot {} ({:.2}s)",
                        slot,
                        pcm.duration_seconds()
                    );
                    let _ = decoded_tx.send(DecodedSample {
                        slot,
                        epoch,
                        name,
                        buffer: pcm.into_shared(),
                    });
                }
                Err(error) => {
                    if slot_atomics.epoch() != epoch {
                        return;
                    }
                    log::warn!("Sampler: failed to decode slot {}: {}", slot, error);
                    if events
                        .try_send(EngineEvent::SampleLoadFailed { slot, error })
                        .is_err()
                    {
                        log::warn!("Sampler: event queue full, load failure not reported");
                    }
                }
            }
        });
    }

    /// Forward finished decodes to the audio thread
    ///
    /// Returns the number of installs queued. Decodes for slots that have
    /// since been cleared or reloaded are dropped here.
    pub fn poll_loads(&mut self) -> usize {
        let mut queued = 0;
        while let Some(cmd) = self.backlog.pop_front() {
            if let Err(rtrb::PushError::Full(cmd)) = self.producer.push(cmd) {
                self.backlog.push_front(cmd);
                return queued;
            }
            queued += 1;
        }
        while let Ok(decoded) = self.decoded_rx.try_recv() {
            if self.forward(decoded) {
                queued += 1;
            }
        }
        queued
    }

    /// Queue an install; false if the decode is stale
    fn forward(&mut self, decoded: DecodedSample) -> bool {
        let slot = decoded.slot;
        if self.slot_atomics[slot.index()].epoch() != decoded.epoch {
            log::debug!("Sampler: dropping stale decode for slot {}", slot);
            return false;
        }
        self.pending_names[slot.index()] = decoded.name.clone().map(|name| (decoded.epoch, name));
        self.expected_sample[slot.index()] = Some((decoded.epoch, true));
        let cmd = EngineCommand::InstallSample(Box::new(SampleInstall {
            slot,
            epoch: decoded.epoch,
            buffer: decoded.buffer,
            name: decoded.name,
        }));
        if let Err(rtrb::PushError::Full(cmd)) = self.producer.push(cmd) {
            self.backlog.push_back(cmd);
        }
        true
    }

    /// Play a slot from the top; retriggers if already playing
    pub fn play_slot(&mut self, slot: SlotId, looping: bool) -> EngineResult<()> {
        if self.sampler_atomics.recording_slot() == Some(slot) {
            return Err(EngineError::SlotRecording(slot));
        }
        if !self.slot_has_sample(slot) {
            return Err(EngineError::EmptySlot(slot));
        }
        self.send(EngineCommand::PlaySlot { slot, looping })
    }

    pub fn stop_slot(&mut self, slot: SlotId) -> EngineResult<()> {
        self.send(EngineCommand::StopSlot { slot })
    }

    pub fn stop_all_slots(&mut self) -> EngineResult<()> {
        self.send(EngineCommand::StopAllSlots)
    }

    /// Slot volume, 0-100
    pub fn set_slot_volume(&mut self, slot: SlotId, volume: f32) -> EngineResult<()> {
        self.send(EngineCommand::SetSlotVolume { slot, volume })
    }

    /// Sampler master volume, 0-100
    pub fn set_sampler_volume(&mut self, volume: f32) -> EngineResult<()> {
        self.send(EngineCommand::SetSamplerVolume { volume })
    }

    /// Empty a slot, cancelling its playback, recording and pending loads
    pub fn clear_slot(&mut self, slot: SlotId) -> EngineResult<()> {
        self.send(EngineCommand::ClearSlot { slot })?;
        let epoch = self.slot_atomics[slot.index()].next_epoch();
        self.expected_sample[slot.index()] = Some((epoch, false));
        self.pending_names[slot.index()] = None;
        self.slot_names[slot.index()] = default_slot_name(slot).to_string();
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────
    // Snapshots
    // ─────────────────────────────────────────────────────────────

    pub fn deck_snapshot(&self, deck: DeckId) -> DeckSnapshot {
        DeckSnapshot::capture(
            deck,
            &self.deck_atomics[deck.index()],
            self.tracks[deck.index()].as_deref(),
        )
    }

    pub fn slot_snapshot(&self, slot: SlotId) -> SlotSnapshot {
        SlotSnapshot::capture(
            slot,
            &self.slot_atomics[slot.index()],
            &self.slot_names[slot.index()],
        )
    }

    pub fn sampler_snapshot(&self) -> SamplerSnapshot {
        SamplerSnapshot {
            master_volume: self.sampler_atomics.master_volume(),
            recording_slot: self.sampler_atomics.recording_slot(),
            recorded_seconds: self.sampler_atomics.recorded_frames() as f64
                / self.sample_rate.max(1) as f64,
            slots: SlotId::ALL.iter().map(|&slot| self.slot_snapshot(slot)).collect(),
        }
    }

    pub fn bus_snapshot(&self) -> BusSnapshot {
        BusSnapshot::capture(&self.bus_atomics)
    }
}

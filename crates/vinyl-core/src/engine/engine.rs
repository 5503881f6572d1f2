//! Main audio engine - ties together decks, sampler and mixer bus

use std::sync::Arc;

use crate::audio_file::TrackRef;
use crate::config::VinylConfig;
use crate::error::{EngineError, EngineResult};
use crate::types::{
    DeckId, EqBand, RecordSource, SlotId, StereoBuffer, StereoSample, NUM_DECKS, NUM_SLOTS,
    SAMPLE_RATE,
};

use super::command::{EngineCommand, SampleInstall};
use super::events::{EngineEvent, EventSender};
use super::gc::{defer_drop, gc_handle};
use super::sampler::{FinishedRecording, SamplerAtomics, SamplerBank, SlotAtomics};
use super::sync::{plan_sync, SyncOutcome, SyncStatus};
use super::{BusAtomics, Deck, DeckAtomics, MixerBus};

/// Largest block the engine renders at once
///
/// Working buffers are pre-allocated to this size, so processing never
/// allocates. Backends split larger device buffers into blocks of this size.
pub const MAX_BUFFER_SIZE: usize = 8192;

/// The main audio engine
///
/// Owns both decks, the sampler bank and the mixer bus. Lives on the audio
/// thread; the UI talks to it through [`EngineCommand`]s and reads its state
/// through the atomics handed out at construction.
pub struct AudioEngine {
    sample_rate: u32,
    decks: [Deck; NUM_DECKS],
    sampler: SamplerBank,
    mixer: MixerBus,
    /// Pre-allocated per-deck output buffers
    deck_buffers: [StereoBuffer; NUM_DECKS],
    /// Pre-allocated sampler output buffer
    sampler_buffer: StereoBuffer,
    /// Live microphone frames, drained once per block
    microphone: Option<rtrb::Consumer<StereoSample>>,
    events: Option<EventSender>,
}

impl AudioEngine {
    /// Create an engine at the default 48kHz
    pub fn new() -> Self {
        Self::new_with_sample_rate(SAMPLE_RATE)
    }

    /// Create an engine rendering at `sample_rate`
    pub fn new_with_sample_rate(sample_rate: u32) -> Self {
        // Start the collector before anything shared is created
        let _ = gc_handle();
        Self {
            sample_rate,
            decks: DeckId::ALL.map(|id| Deck::new(id, sample_rate)),
            sampler: SamplerBank::new(sample_rate),
            mixer: MixerBus::new(),
            deck_buffers: std::array::from_fn(|_| StereoBuffer::silence(MAX_BUFFER_SIZE)),
            sampler_buffer: StereoBuffer::silence(MAX_BUFFER_SIZE),
            microphone: None,
            events: None,
        }
    }

    /// Apply configured startup levels
    pub fn apply_config(&mut self, config: &VinylConfig) {
        for deck in &mut self.decks {
            deck.set_volume(config.deck.volume);
            deck.set_gain(config.deck.gain);
        }
        self.mixer.set_crossfader(config.mixer.crossfader);
        self.mixer.set_master_volume(config.mixer.master_volume);
        self.mixer.set_cue_volume(config.mixer.cue_volume);
        self.sampler.set_master_volume(config.sampler.master_volume);
        for slot in SlotId::ALL {
            self.sampler.set_slot_volume(slot, config.sampler.slot_volume);
        }
    }

    /// Route engine events to `sender`
    pub fn set_event_sender(&mut self, sender: EventSender) {
        self.events = Some(sender);
    }

    /// Attach the consumer side of the microphone ring
    pub fn attach_microphone(&mut self, consumer: rtrb::Consumer<StereoSample>) {
        self.microphone = Some(consumer);
    }

    pub fn has_microphone(&self) -> bool {
        self.microphone.is_some()
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn deck(&self, id: DeckId) -> &Deck {
        &self.decks[id.index()]
    }

    fn deck_mut(&mut self, id: DeckId) -> &mut Deck {
        &mut self.decks[id.index()]
    }

    pub fn sampler(&self) -> &SamplerBank {
        &self.sampler
    }

    pub fn mixer(&self) -> &MixerBus {
        &self.mixer
    }

    /// Lock-free deck state for the UI
    ///
    /// Call once during setup and keep the Arcs.
    pub fn deck_atomics(&self) -> [Arc<DeckAtomics>; NUM_DECKS] {
        std::array::from_fn(|i| self.decks[i].atomics())
    }

    pub fn slot_atomics(&self) -> [Arc<SlotAtomics>; NUM_SLOTS] {
        self.sampler.slot_atomics()
    }

    pub fn sampler_atomics(&self) -> Arc<SamplerAtomics> {
        self.sampler.atomics()
    }

    pub fn bus_atomics(&self) -> Arc<BusAtomics> {
        self.mixer.atomics()
    }

    // ─────────────────────────────────────────────────────────────
    // Decks
    // ─────────────────────────────────────────────────────────────

    pub fn load_track(&mut self, deck: DeckId, track: TrackRef) {
        self.deck_mut(deck).load_track(track);
    }

    pub fn unload_track(&mut self, deck: DeckId) {
        self.deck_mut(deck).unload_track();
    }

    pub fn play(&mut self, deck: DeckId) -> EngineResult<()> {
        self.deck_mut(deck).play()
    }

    pub fn pause(&mut self, deck: DeckId) {
        self.deck_mut(deck).pause();
    }

    pub fn toggle_play(&mut self, deck: DeckId) -> EngineResult<()> {
        self.deck_mut(deck).toggle_play()
    }

    pub fn cue(&mut self, deck: DeckId) -> EngineResult<()> {
        self.deck_mut(deck).cue()
    }

    pub fn seek(&mut self, deck: DeckId, seconds: f64) -> EngineResult<()> {
        self.deck_mut(deck).seek(seconds)
    }

    pub fn set_volume(&mut self, deck: DeckId, volume: f32) {
        self.deck_mut(deck).set_volume(volume);
    }

    pub fn set_gain(&mut self, deck: DeckId, gain: f32) {
        self.deck_mut(deck).set_gain(gain);
    }

    pub fn set_eq(&mut self, deck: DeckId, band: EqBand, gain_db: f32) {
        self.deck_mut(deck).set_eq(band, gain_db);
    }

    pub fn set_pitch(&mut self, deck: DeckId, percent: f64) -> f64 {
        self.deck_mut(deck).set_pitch(percent)
    }

    /// Tempo relationship between the decks, `None` unless both have tracks
    pub fn sync_status(&self) -> Option<SyncStatus> {
        let a = self.decks[0].effective_bpm()?;
        let b = self.decks[1].effective_bpm()?;
        Some(SyncStatus::measure(a, b))
    }

    /// Pitch `target` so its effective BPM matches `source`
    pub fn sync_to(&mut self, source: DeckId, target: DeckId) -> EngineResult<SyncOutcome> {
        let source_bpm = self
            .deck(source)
            .effective_bpm()
            .ok_or(EngineError::NoTrackLoaded(source))?;
        let target_deck = self.deck(target);
        let target_bpm = target_deck
            .effective_bpm()
            .ok_or(EngineError::NoTrackLoaded(target))?;
        let target_track_bpm = target_deck.track().map(|t| t.bpm).unwrap_or(0.0);

        let outcome = plan_sync(source_bpm, target_track_bpm, target_bpm);
        if let SyncOutcome::Adjusted { pitch_percent } = outcome {
            self.deck_mut(target).set_pitch(pitch_percent);
        }
        Ok(outcome)
    }

    // ─────────────────────────────────────────────────────────────
    // Mixer bus
    // ─────────────────────────────────────────────────────────────

    pub fn set_crossfader(&mut self, position: f32) {
        self.mixer.set_crossfader(position);
    }

    pub fn set_master_volume(&mut self, volume: f32) {
        self.mixer.set_master_volume(volume);
    }

    pub fn set_cue_volume(&mut self, volume: f32) {
        self.mixer.set_cue_volume(volume);
    }

    pub fn set_cue_listen(&mut self, deck: DeckId, enabled: bool) {
        self.mixer.set_cue_listen(deck, enabled);
    }

    // ─────────────────────────────────────────────────────────────
    // Sampler
    // ─────────────────────────────────────────────────────────────

    /// Begin recording into `slot`
    ///
    /// Fails with `DeviceUnavailable` for a microphone recording when no
    /// capture stream is attached.
    pub fn start_recording(
        &mut self,
        slot: SlotId,
        source: RecordSource,
        capture: StereoBuffer,
    ) -> EngineResult<()> {
        if source == RecordSource::Microphone && self.microphone.is_none() {
            defer_drop(capture);
            return Err(EngineError::DeviceUnavailable);
        }
        self.sampler.start_recording(slot, source, capture)?;
        log::info!("Sampler: recording slot {} from {:?}", slot, source);
        Ok(())
    }

    /// Finish the active recording, if any
    pub fn stop_recording(&mut self) -> Option<FinishedRecording> {
        let finished = self.sampler.stop_recording()?;
        log::info!(
            "Sampler: slot {} recorded {} frames{}",
            finished.slot,
            finished.buffer.as_ref().map(|b| b.len()).unwrap_or(0),
            if finished.truncated { " (truncated)" } else { "" }
        );
        Some(finished)
    }

    /// Install a decoded sample if its load is still current
    ///
    /// Returns `Ok(false)` and drops the buffer when the slot was cleared or
    /// reloaded after the decode started.
    pub fn install_sample(&mut self, install: SampleInstall) -> EngineResult<bool> {
        let SampleInstall {
            slot,
            epoch,
            buffer,
            name,
        } = install;
        if self.sampler.slot(slot).epoch() != epoch {
            defer_drop(buffer);
            defer_drop(name);
            return Ok(false);
        }
        self.sampler.install(slot, buffer, name)?;
        Ok(true)
    }

    pub fn play_slot(&mut self, slot: SlotId, looping: bool) -> EngineResult<()> {
        self.sampler.play(slot, looping)
    }

    pub fn stop_slot(&mut self, slot: SlotId) {
        self.sampler.stop(slot);
    }

    pub fn stop_all_slots(&mut self) {
        self.sampler.stop_all();
    }

    pub fn set_slot_volume(&mut self, slot: SlotId, volume: f32) {
        self.sampler.set_slot_volume(slot, volume);
    }

    pub fn set_sampler_volume(&mut self, volume: f32) {
        self.sampler.set_master_volume(volume);
    }

    pub fn clear_slot(&mut self, slot: SlotId) {
        self.sampler.clear(slot);
    }

    // ─────────────────────────────────────────────────────────────
    // Commands
    // ─────────────────────────────────────────────────────────────

    /// Drain and apply every pending command
    ///
    /// Called at the start of each block so changes land on block
    /// boundaries.
    pub fn process_commands(&mut self, rx: &mut rtrb::Consumer<EngineCommand>) {
        while let Ok(cmd) = rx.pop() {
            self.apply_command(cmd);
        }
    }

    /// Apply a single command, reporting failures as events
    pub fn apply_command(&mut self, cmd: EngineCommand) {
        let name = cmd.name();
        let result = match cmd {
            EngineCommand::LoadTrack { deck, track } => {
                self.load_track(deck, track);
                Ok(())
            }
            EngineCommand::UnloadTrack { deck } => {
                self.unload_track(deck);
                Ok(())
            }
            EngineCommand::Play { deck } => self.play(deck),
            EngineCommand::Pause { deck } => {
                self.pause(deck);
                Ok(())
            }
            EngineCommand::TogglePlay { deck } => self.toggle_play(deck),
            EngineCommand::Cue { deck } => self.cue(deck),
            EngineCommand::Seek { deck, seconds } => self.seek(deck, seconds),
            EngineCommand::SetVolume { deck, volume } => {
                self.set_volume(deck, volume);
                Ok(())
            }
            EngineCommand::SetGain { deck, gain } => {
                self.set_gain(deck, gain);
                Ok(())
            }
            EngineCommand::SetEq {
                deck,
                band,
                gain_db,
            } => {
                self.set_eq(deck, band, gain_db);
                Ok(())
            }
            EngineCommand::SetPitch { deck, percent } => {
                self.set_pitch(deck, percent);
                Ok(())
            }
            EngineCommand::SyncTo { source, target } => self.sync_to(source, target).map(|_| ()),
            EngineCommand::SetCrossfader { position } => {
                self.set_crossfader(position);
                Ok(())
            }
            EngineCommand::SetMasterVolume { volume } => {
                self.set_master_volume(volume);
                Ok(())
            }
            EngineCommand::SetCueVolume { volume } => {
                self.set_cue_volume(volume);
                Ok(())
            }
            EngineCommand::SetCueListen { deck, enabled } => {
                self.set_cue_listen(deck, enabled);
                Ok(())
            }
            EngineCommand::StartRecording {
                slot,
                source,
                capture,
            } => {
                let result = self.start_recording(slot, source, capture);
                if result.is_err() {
                    // The sender claimed the recorder for this slot
                    self.sampler.atomics().release_recording_if(slot);
                }
                result
            }
            EngineCommand::StopRecording => {
                if let Some(finished) = self.stop_recording() {
                    self.emit(EngineEvent::RecordingFinished(finished));
                }
                Ok(())
            }
            EngineCommand::InstallSample(install) => {
                let slot = install.slot;
                let epoch = install.epoch;
                match self.install_sample(*install) {
                    Ok(true) => {
                        self.emit(EngineEvent::SampleLoaded { slot, epoch });
                        Ok(())
                    }
                    Ok(false) => {
                        log::warn!("Sampler: discarded stale sample for slot {}", slot);
                        self.emit(EngineEvent::StaleSampleDiscarded { slot });
                        Ok(())
                    }
                    Err(e) => Err(e),
                }
            }
            EngineCommand::PlaySlot { slot, looping } => self.play_slot(slot, looping),
            EngineCommand::StopSlot { slot } => {
                self.stop_slot(slot);
                Ok(())
            }
            EngineCommand::StopAllSlots => {
                self.stop_all_slots();
                Ok(())
            }
            EngineCommand::SetSlotVolume { slot, volume } => {
                self.set_slot_volume(slot, volume);
                Ok(())
            }
            EngineCommand::SetSamplerVolume { volume } => {
                self.set_sampler_volume(volume);
                Ok(())
            }
            EngineCommand::ClearSlot { slot } => {
                self.clear_slot(slot);
                Ok(())
            }
        };

        if let Err(error) = result {
            log::warn!("Command {} rejected: {}", name, error);
            self.emit(EngineEvent::CommandRejected {
                command: name,
                error,
            });
        }
    }

    fn emit(&self, event: EngineEvent) {
        if let Some(events) = &self.events {
            // A full channel means nobody is listening; drop the event
            let _ = events.try_send(event);
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Processing
    // ─────────────────────────────────────────────────────────────

    /// Render one block into `master_out` and `cue_out`
    ///
    /// Both buffers must have the same length, at most [`MAX_BUFFER_SIZE`].
    pub fn process(&mut self, master_out: &mut StereoBuffer, cue_out: &mut StereoBuffer) {
        let buffer_len = master_out.len();
        debug_assert!(buffer_len <= MAX_BUFFER_SIZE);
        debug_assert_eq!(buffer_len, cue_out.len());

        for buf in &mut self.deck_buffers {
            buf.set_len_from_capacity(buffer_len);
        }
        self.sampler_buffer.set_len_from_capacity(buffer_len);

        let mut ended_decks = [false; NUM_DECKS];
        for (i, deck) in self.decks.iter_mut().enumerate() {
            ended_decks[i] = deck.process(&mut self.deck_buffers[i]);
        }

        let ended_slots = self.sampler.render(&mut self.sampler_buffer);

        self.mixer.process(
            &self.deck_buffers,
            &self.sampler_buffer,
            master_out,
            cue_out,
        );

        self.drain_microphone();
        self.sampler
            .capture(RecordSource::MasterBusOutput, master_out.as_slice());

        for deck in DeckId::ALL {
            if ended_decks[deck.index()] {
                self.emit(EngineEvent::TrackEnded { deck });
            }
        }
        if ended_slots != 0 {
            for slot in SlotId::ALL {
                if ended_slots & (1 << slot.index()) != 0 {
                    self.emit(EngineEvent::SlotPlaybackEnded { slot });
                }
            }
        }
    }

    /// Move pending microphone frames into the active capture
    ///
    /// Frames are consumed even when nothing is recording so the ring never
    /// holds stale audio.
    fn drain_microphone(&mut self) {
        let Some(mic) = self.microphone.as_mut() else {
            return;
        };
        let available = mic.slots();
        if available == 0 {
            return;
        }
        if let Ok(chunk) = mic.read_chunk(available) {
            let (first, second) = chunk.as_slices();
            self.sampler.capture(RecordSource::Microphone, first);
            self.sampler.capture(RecordSource::Microphone, second);
            chunk.commit_all();
        }
    }
}

impl Default for AudioEngine {
    fn default() -> Self {
        Self::new()
    }
}

//! Sampler - eight one-shot/loop slots with record-from-input
//!
//! Each slot holds at most one audio buffer and is either idle, recording
//! or playing. Only one slot can record at a time, from either the
//! microphone or the master bus output.
//!
//! Levels: a slot plays at `(slot volume / 100) × (sampler volume / 100)`.
//! Both volumes are re-applied to already-playing slots, ramped per block.
//!
//! Stopping, clearing, replacing or retriggering an audible slot keeps the
//! old instance for one more block, faded to silence, so the cut never
//! clicks. A retriggered instance starts in that same block.
//!
//! Buffers are `basedrop::Shared`, so clearing or replacing a slot on the
//! audio thread only queues the old buffer for collection.

use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use basedrop::Shared;

use crate::audio_file::PcmBuffer;
use crate::error::{EngineError, EngineResult};
use crate::types::{RecordSource, SlotId, StereoBuffer, StereoSample, NUM_SLOTS};

use super::gain::GainRamp;
use super::gc::defer_drop;

/// Volume of a fresh slot (0-100)
pub const DEFAULT_SLOT_VOLUME: f32 = 75.0;

/// Sampler master volume at startup (0-100)
pub const DEFAULT_SAMPLER_VOLUME: f32 = 75.0;

const DEFAULT_SLOT_NAMES: [&str; NUM_SLOTS] = [
    "Sample 1", "Sample 2", "Sample 3", "Sample 4",
    "Sample 5", "Sample 6", "Sample 7", "Sample 8",
];

/// Name a slot shows when it has never been loaded or was cleared
pub fn default_slot_name(slot: SlotId) -> &'static str {
    DEFAULT_SLOT_NAMES[slot.index()]
}

/// What a slot is doing right now
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlotActivity {
    #[default]
    Idle,
    Recording(RecordSource),
    Playing { looping: bool },
}

impl SlotActivity {
    fn to_u8(self) -> u8 {
        match self {
            SlotActivity::Idle => 0,
            SlotActivity::Recording(RecordSource::Microphone) => 1,
            SlotActivity::Recording(RecordSource::MasterBusOutput) => 2,
            SlotActivity::Playing { looping: false } => 3,
            SlotActivity::Playing { looping: true } => 4,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => SlotActivity::Recording(RecordSource::Microphone),
            2 => SlotActivity::Recording(RecordSource::MasterBusOutput),
            3 => SlotActivity::Playing { looping: false },
            4 => SlotActivity::Playing { looping: true },
            _ => SlotActivity::Idle,
        }
    }
}

/// Lock-free slot state for UI access
pub struct SlotAtomics {
    has_sample: AtomicBool,
    activity: AtomicU8,
    volume_bits: AtomicU32,
    duration_bits: AtomicU64,
    position_bits: AtomicU64,
    /// Load generation, bumped by the controller on every load or clear
    /// request. A decoded sample is only installed if its epoch is current.
    epoch: AtomicU64,
}

impl SlotAtomics {
    pub fn new() -> Self {
        Self {
            has_sample: AtomicBool::new(false),
            activity: AtomicU8::new(0),
            volume_bits: AtomicU32::new(DEFAULT_SLOT_VOLUME.to_bits()),
            duration_bits: AtomicU64::new(0f64.to_bits()),
            position_bits: AtomicU64::new(0f64.to_bits()),
            epoch: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn has_sample(&self) -> bool {
        self.has_sample.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn activity(&self) -> SlotActivity {
        SlotActivity::from_u8(self.activity.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn volume(&self) -> f32 {
        f32::from_bits(self.volume_bits.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn duration_seconds(&self) -> f64 {
        f64::from_bits(self.duration_bits.load(Ordering::Relaxed))
    }

    /// Playback position within the sample, in seconds
    #[inline]
    pub fn position_seconds(&self) -> f64 {
        f64::from_bits(self.position_bits.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Relaxed)
    }

    /// Start a new load generation, returning its epoch
    pub(crate) fn next_epoch(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::Relaxed) + 1
    }
}

impl Default for SlotAtomics {
    fn default() -> Self {
        Self::new()
    }
}

/// Lock-free sampler-wide state
pub struct SamplerAtomics {
    master_volume_bits: AtomicU32,
    /// Slot number being recorded into, 0 when idle
    ///
    /// The controller claims it before sending a start command so that two
    /// quick requests cannot both pass validation. The audio thread releases
    /// it when the recording ends.
    recording_slot: AtomicU8,
    recorded_frames: AtomicU64,
}

impl SamplerAtomics {
    pub fn new() -> Self {
        Self {
            master_volume_bits: AtomicU32::new(DEFAULT_SAMPLER_VOLUME.to_bits()),
            recording_slot: AtomicU8::new(0),
            recorded_frames: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn master_volume(&self) -> f32 {
        f32::from_bits(self.master_volume_bits.load(Ordering::Relaxed))
    }

    pub fn recording_slot(&self) -> Option<SlotId> {
        match self.recording_slot.load(Ordering::Relaxed) {
            0 => None,
            n => SlotId::new(n).ok(),
        }
    }

    /// Frames captured so far by the active recording
    #[inline]
    pub fn recorded_frames(&self) -> u64 {
        self.recorded_frames.load(Ordering::Relaxed)
    }

    /// Reserve the recorder for `slot`, failing with the current owner
    pub(crate) fn claim_recording(&self, slot: SlotId) -> Result<(), SlotId> {
        self.recording_slot
            .compare_exchange(0, slot.number(), Ordering::Relaxed, Ordering::Relaxed)
            .map(|_| ())
            .map_err(|current| SlotId::new(current).unwrap_or(slot))
    }

    pub(crate) fn release_recording(&self) {
        self.recording_slot.store(0, Ordering::Relaxed);
    }

    /// Release only if `slot` still holds the recorder
    pub(crate) fn release_recording_if(&self, slot: SlotId) {
        let _ = self.recording_slot.compare_exchange(
            slot.number(),
            0,
            Ordering::Relaxed,
            Ordering::Relaxed,
        );
    }
}

impl Default for SamplerAtomics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view of a slot for display
#[derive(Debug, Clone, PartialEq)]
pub struct SlotSnapshot {
    pub slot: SlotId,
    pub name: String,
    pub has_sample: bool,
    pub duration_seconds: f64,
    pub position_seconds: f64,
    pub volume: f32,
    pub activity: SlotActivity,
}

impl SlotSnapshot {
    pub fn capture(slot: SlotId, atomics: &SlotAtomics, name: &str) -> Self {
        Self {
            slot,
            name: name.to_string(),
            has_sample: atomics.has_sample(),
            duration_seconds: atomics.duration_seconds(),
            position_seconds: atomics.position_seconds(),
            volume: atomics.volume(),
            activity: atomics.activity(),
        }
    }
}

/// A finished recording handed back to the caller
#[derive(Clone)]
pub struct FinishedRecording {
    pub slot: SlotId,
    /// The new slot buffer, `None` if nothing was captured (the slot then
    /// keeps its previous sample)
    pub buffer: Option<Shared<PcmBuffer>>,
    /// True if the capture ran out of pre-allocated space and dropped audio
    pub truncated: bool,
}

impl std::fmt::Debug for FinishedRecording {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FinishedRecording")
            .field("slot", &self.slot)
            .field("frames", &self.buffer.as_ref().map(|b| b.len()))
            .field("truncated", &self.truncated)
            .finish()
    }
}

/// A released instance rendered once more while fading out
struct Tail {
    buffer: Shared<PcmBuffer>,
    cursor: usize,
    looping: bool,
    gain: f32,
}

/// One sampler slot
pub struct SampleSlot {
    id: SlotId,
    name: Cow<'static, str>,
    buffer: Option<Shared<PcmBuffer>>,
    volume: f32,
    activity: SlotActivity,
    cursor: usize,
    /// The playing instance has been rendered at least once
    sounding: bool,
    tail: Option<Tail>,
    level: GainRamp,
    atomics: Arc<SlotAtomics>,
}

impl SampleSlot {
    pub fn new(id: SlotId) -> Self {
        Self {
            id,
            name: Cow::Borrowed(default_slot_name(id)),
            buffer: None,
            volume: DEFAULT_SLOT_VOLUME,
            activity: SlotActivity::Idle,
            cursor: 0,
            sounding: false,
            tail: None,
            level: GainRamp::new(slot_gain(DEFAULT_SLOT_VOLUME, DEFAULT_SAMPLER_VOLUME)),
            atomics: Arc::new(SlotAtomics::new()),
        }
    }

    #[inline]
    pub fn id(&self) -> SlotId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn buffer(&self) -> Option<&PcmBuffer> {
        self.buffer.as_deref()
    }

    #[inline]
    pub fn has_sample(&self) -> bool {
        self.buffer.is_some()
    }

    #[inline]
    pub fn activity(&self) -> SlotActivity {
        self.activity
    }

    #[inline]
    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn duration_seconds(&self) -> f64 {
        self.buffer.as_ref().map(|b| b.duration_seconds()).unwrap_or(0.0)
    }

    pub fn atomics(&self) -> Arc<SlotAtomics> {
        Arc::clone(&self.atomics)
    }

    /// Current load generation
    #[inline]
    pub fn epoch(&self) -> u64 {
        self.atomics.epoch()
    }

    fn is_recording(&self) -> bool {
        matches!(self.activity, SlotActivity::Recording(_))
    }

    fn set_activity(&mut self, activity: SlotActivity) {
        self.activity = activity;
        self.atomics.activity.store(activity.to_u8(), Ordering::Relaxed);
    }

    /// Hand the playing instance over to a fade-out tail
    fn release_voice(&mut self) {
        if !std::mem::take(&mut self.sounding) {
            return;
        }
        if let (SlotActivity::Playing { looping }, Some(buffer)) = (self.activity, &self.buffer) {
            self.tail = Some(Tail {
                buffer: buffer.clone(),
                cursor: self.cursor,
                looping,
                gain: self.level.current(),
            });
        }
    }

    fn install(&mut self, buffer: Shared<PcmBuffer>, name: Option<String>) {
        if matches!(self.activity, SlotActivity::Playing { .. }) {
            self.release_voice();
            self.set_activity(SlotActivity::Idle);
        }
        self.cursor = 0;
        let duration = buffer.duration_seconds();
        self.buffer = Some(buffer);
        if let Some(name) = name {
            self.name = Cow::Owned(name);
        }
        self.atomics.has_sample.store(true, Ordering::Relaxed);
        self.atomics.duration_bits.store(duration.to_bits(), Ordering::Relaxed);
        self.atomics.position_bits.store(0f64.to_bits(), Ordering::Relaxed);
    }

    fn play(&mut self, looping: bool) -> EngineResult<()> {
        if self.is_recording() {
            return Err(EngineError::SlotRecording(self.id));
        }
        if self.buffer.as_ref().map_or(true, |b| b.is_empty()) {
            return Err(EngineError::EmptySlot(self.id));
        }
        // Retrigger: one instance per slot, restarted from the top
        self.release_voice();
        self.cursor = 0;
        self.set_activity(SlotActivity::Playing { looping });
        Ok(())
    }

    fn stop(&mut self) {
        if matches!(self.activity, SlotActivity::Playing { .. }) {
            self.release_voice();
            self.set_activity(SlotActivity::Idle);
            self.cursor = 0;
            self.atomics.position_bits.store(0f64.to_bits(), Ordering::Relaxed);
        }
    }

    fn clear(&mut self) {
        self.release_voice();
        self.set_activity(SlotActivity::Idle);
        self.cursor = 0;
        self.buffer = None;
        self.name = Cow::Borrowed(default_slot_name(self.id));
        self.atomics.has_sample.store(false, Ordering::Relaxed);
        self.atomics.duration_bits.store(0f64.to_bits(), Ordering::Relaxed);
        self.atomics.position_bits.store(0f64.to_bits(), Ordering::Relaxed);
    }

    fn set_volume(&mut self, volume: f32, master: f32) {
        self.volume = clamp_percent(volume);
        self.level.set_target(slot_gain(self.volume, master));
        self.atomics.volume_bits.store(self.volume.to_bits(), Ordering::Relaxed);
    }

    fn apply_master(&mut self, master: f32) {
        self.level.set_target(slot_gain(self.volume, master));
    }

    /// Mix this slot into `out`: any fading tail, then the playing instance
    ///
    /// Returns `true` if a one-shot finished during this block.
    fn render_into(&mut self, out: &mut [StereoSample]) -> bool {
        if let Some(mut tail) = self.tail.take() {
            mix_ramped(
                tail.buffer.frames(),
                &mut tail.cursor,
                tail.looping,
                out,
                tail.gain,
                0.0,
            );
        }

        let SlotActivity::Playing { looping } = self.activity else {
            self.level.jump_to(self.level.target());
            return false;
        };
        let Some(buffer) = self.buffer.as_deref() else {
            self.sounding = false;
            self.set_activity(SlotActivity::Idle);
            return true;
        };
        let frames = buffer.frames();
        if frames.is_empty() {
            self.sounding = false;
            self.set_activity(SlotActivity::Idle);
            return true;
        }

        let target = self.level.target();
        let ended = mix_ramped(
            frames,
            &mut self.cursor,
            looping,
            out,
            self.level.current(),
            target,
        );
        self.level.jump_to(target);
        self.sounding = true;

        let position = if buffer.sample_rate() > 0 {
            self.cursor as f64 / buffer.sample_rate() as f64
        } else {
            0.0
        };

        if ended {
            self.cursor = 0;
            self.sounding = false;
            self.set_activity(SlotActivity::Idle);
            self.atomics.position_bits.store(0f64.to_bits(), Ordering::Relaxed);
        } else {
            self.atomics.position_bits.store(position.to_bits(), Ordering::Relaxed);
        }
        ended
    }
}

/// Add `frames` from `*cursor` into `out`, gain ramping `from` to `to`
///
/// Wraps to the start when `looping`. Returns `true` once a one-shot has
/// played its last frame.
fn mix_ramped(
    frames: &[StereoSample],
    cursor: &mut usize,
    looping: bool,
    out: &mut [StereoSample],
    from: f32,
    to: f32,
) -> bool {
    if frames.is_empty() {
        return true;
    }
    let step = if out.is_empty() { 0.0 } else { (to - from) / out.len() as f32 };
    let mut gain = from;
    for frame in out.iter_mut() {
        if *cursor >= frames.len() {
            if looping {
                *cursor = 0;
            } else {
                return true;
            }
        }
        gain += step;
        *frame += frames[*cursor] * gain;
        *cursor += 1;
    }
    !looping && *cursor >= frames.len()
}

/// Linear playback gain for a slot
#[inline]
pub fn slot_gain(slot_volume: f32, sampler_volume: f32) -> f32 {
    (slot_volume / 100.0) * (sampler_volume / 100.0)
}

#[inline]
fn clamp_percent(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

/// An in-progress recording
struct Recording {
    slot: SlotId,
    source: RecordSource,
    capture: StereoBuffer,
    truncated: bool,
}

/// The eight slots plus the shared recorder
pub struct SamplerBank {
    slots: [SampleSlot; NUM_SLOTS],
    master_volume: f32,
    recording: Option<Recording>,
    sample_rate: u32,
    atomics: Arc<SamplerAtomics>,
}

impl SamplerBank {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            slots: SlotId::ALL.map(SampleSlot::new),
            master_volume: DEFAULT_SAMPLER_VOLUME,
            recording: None,
            sample_rate,
            atomics: Arc::new(SamplerAtomics::new()),
        }
    }

    pub fn slot(&self, slot: SlotId) -> &SampleSlot {
        &self.slots[slot.index()]
    }

    fn slot_mut(&mut self, slot: SlotId) -> &mut SampleSlot {
        &mut self.slots[slot.index()]
    }

    pub fn atomics(&self) -> Arc<SamplerAtomics> {
        Arc::clone(&self.atomics)
    }

    pub fn slot_atomics(&self) -> [Arc<SlotAtomics>; NUM_SLOTS] {
        std::array::from_fn(|i| self.slots[i].atomics())
    }

    #[inline]
    pub fn master_volume(&self) -> f32 {
        self.master_volume
    }

    /// Slot currently recording, if any
    pub fn recording_slot(&self) -> Option<SlotId> {
        self.recording.as_ref().map(|r| r.slot)
    }

    pub fn recording_source(&self) -> Option<RecordSource> {
        self.recording.as_ref().map(|r| r.source)
    }

    // ─────────────────────────────────────────────────────────────
    // Recording
    // ─────────────────────────────────────────────────────────────

    /// Begin recording into `slot`
    ///
    /// `capture` is pre-allocated by the caller; its capacity bounds the
    /// recording length and it is never grown on the audio thread. Playback
    /// on the target slot stops.
    pub fn start_recording(
        &mut self,
        slot: SlotId,
        source: RecordSource,
        mut capture: StereoBuffer,
    ) -> EngineResult<()> {
        if let Some(active) = &self.recording {
            let busy = active.slot;
            defer_drop(capture);
            return Err(EngineError::AlreadyRecording(busy));
        }

        capture.clear();
        let target = self.slot_mut(slot);
        target.stop();
        target.set_activity(SlotActivity::Recording(source));

        self.recording = Some(Recording {
            slot,
            source,
            capture,
            truncated: false,
        });
        self.atomics.recording_slot.store(slot.number(), Ordering::Relaxed);
        self.atomics.recorded_frames.store(0, Ordering::Relaxed);
        Ok(())
    }

    /// Append frames from `source` to the active recording
    ///
    /// Frames from the other source, or with no recording active, are
    /// ignored.
    pub fn capture(&mut self, source: RecordSource, frames: &[StereoSample]) {
        let Some(recording) = self.recording.as_mut() else {
            return;
        };
        if recording.source != source || frames.is_empty() {
            return;
        }
        let taken = recording.capture.extend_within_capacity(frames);
        if taken < frames.len() {
            recording.truncated = true;
        }
        self.atomics
            .recorded_frames
            .store(recording.capture.len() as u64, Ordering::Relaxed);
    }

    /// Finish the active recording and install it into its slot
    ///
    /// Returns `None` when nothing was recording. A recording that captured
    /// no frames leaves the slot's previous buffer untouched.
    pub fn stop_recording(&mut self) -> Option<FinishedRecording> {
        let recording = self.recording.take()?;
        self.atomics.release_recording();
        self.atomics.recorded_frames.store(0, Ordering::Relaxed);

        let slot_id = recording.slot;
        let slot = self.slot_mut(slot_id);
        slot.set_activity(SlotActivity::Idle);

        if recording.capture.is_empty() {
            defer_drop(recording.capture);
            return Some(FinishedRecording {
                slot: slot_id,
                buffer: None,
                truncated: false,
            });
        }

        let pcm = PcmBuffer::new(recording.capture.into_vec(), self.sample_rate);
        let shared = pcm.into_shared();
        self.slot_mut(slot_id).install(shared.clone(), None);

        Some(FinishedRecording {
            slot: slot_id,
            buffer: Some(shared),
            truncated: recording.truncated,
        })
    }

    // ─────────────────────────────────────────────────────────────
    // Slot control
    // ─────────────────────────────────────────────────────────────

    /// Install a decoded buffer (already at the engine rate)
    ///
    /// Rejected while the slot is recording.
    pub fn install(
        &mut self,
        slot: SlotId,
        buffer: Shared<PcmBuffer>,
        name: Option<String>,
    ) -> EngineResult<()> {
        if self.recording_slot() == Some(slot) {
            defer_drop(buffer);
            return Err(EngineError::SlotRecording(slot));
        }
        self.slot_mut(slot).install(buffer, name);
        Ok(())
    }

    /// Play a slot from the start; retriggers if already playing
    pub fn play(&mut self, slot: SlotId, looping: bool) -> EngineResult<()> {
        self.slot_mut(slot).play(looping)
    }

    pub fn stop(&mut self, slot: SlotId) {
        self.slot_mut(slot).stop();
    }

    pub fn stop_all(&mut self) {
        for slot in self.slots.iter_mut() {
            slot.stop();
        }
    }

    /// Empty a slot, cancelling its playback or recording
    pub fn clear(&mut self, slot: SlotId) {
        if self.recording_slot() == Some(slot) {
            if let Some(recording) = self.recording.take() {
                defer_drop(recording.capture);
            }
            self.atomics.release_recording();
            self.atomics.recorded_frames.store(0, Ordering::Relaxed);
        }
        self.slot_mut(slot).clear();
    }

    /// Set a slot's volume (0-100)
    pub fn set_slot_volume(&mut self, slot: SlotId, volume: f32) {
        let master = self.master_volume;
        self.slot_mut(slot).set_volume(volume, master);
    }

    /// Set the sampler master volume (0-100)
    pub fn set_master_volume(&mut self, volume: f32) {
        self.master_volume = clamp_percent(volume);
        for slot in self.slots.iter_mut() {
            slot.apply_master(self.master_volume);
        }
        self.atomics
            .master_volume_bits
            .store(self.master_volume.to_bits(), Ordering::Relaxed);
    }

    /// Render all playing slots into `output` (overwrites)
    ///
    /// Returns a bitmask of slots whose one-shot ended this block
    /// (bit `i` = slot index `i`).
    pub fn render(&mut self, output: &mut StereoBuffer) -> u8 {
        output.fill_silence();
        let out = output.as_mut_slice();
        let mut ended = 0u8;
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if slot.render_into(out) {
                ended |= 1 << i;
            }
        }
        ended
    }
}

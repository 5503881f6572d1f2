//! Notifications from the audio thread
//!
//! The engine reports things the UI cannot infer from the atomics alone:
//! a track or one-shot reaching its end, a finished recording, the outcome of
//! an asynchronous sample load, or a command that was valid when sent but no
//! longer applied when it reached the audio thread.
//!
//! Events travel over a bounded crossbeam channel. The audio thread only ever
//! uses `try_send`; if the UI stops draining, events are dropped rather than
//! blocking the callback.

use crossbeam::channel::{bounded, Receiver, Sender};

use crate::audio_file::DecodeError;
use crate::error::EngineError;
use crate::types::{DeckId, SlotId};

use super::sampler::FinishedRecording;

/// Capacity of the event channel
pub const EVENT_QUEUE_CAPACITY: usize = 256;

/// Something the UI may want to react to
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A deck played to the end of its track and stopped
    TrackEnded { deck: DeckId },
    /// A non-looping slot finished and went idle
    SlotPlaybackEnded { slot: SlotId },
    /// A recording was finalized (buffer is `None` if nothing was captured)
    RecordingFinished(FinishedRecording),
    /// A decoded sample was installed into its slot (`epoch` is the load's)
    SampleLoaded { slot: SlotId, epoch: u64 },
    /// Decoding a sample failed; the slot is unchanged
    SampleLoadFailed { slot: SlotId, error: DecodeError },
    /// A decode finished after the slot was cleared or reloaded, and was dropped
    StaleSampleDiscarded { slot: SlotId },
    /// A queued command could not be applied
    CommandRejected {
        command: &'static str,
        error: EngineError,
    },
}

pub type EventSender = Sender<EngineEvent>;
pub type EventReceiver = Receiver<EngineEvent>;

/// Create the bounded event channel
pub fn event_channel() -> (EventSender, EventReceiver) {
    bounded(EVENT_QUEUE_CAPACITY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_channel_is_bounded() {
        let (tx, rx) = event_channel();
        for _ in 0..EVENT_QUEUE_CAPACITY {
            assert!(tx.try_send(EngineEvent::TrackEnded { deck: DeckId::A }).is_ok());
        }
        assert!(tx.try_send(EngineEvent::TrackEnded { deck: DeckId::B }).is_err());
        assert_eq!(rx.len(), EVENT_QUEUE_CAPACITY);
    }
}

//! Audio engine - decks, sampler, mixer bus and beat sync
//!
//! - Deck: track playback with pitch, 3-band EQ, volume and gain
//! - SamplerBank: eight record/playback slots
//! - MixerBus: equal-power crossfader, master and cue outputs
//! - Sync: tempo comparison and pitch matching between the decks
//! - AudioEngine: owns all of the above on the audio thread
//!
//! The UI side talks to the engine through the lock-free command queue and
//! reads back state through atomics and events.

mod command;
mod deck;
mod engine;
mod eq;
mod events;
mod gain;
mod gc;
mod mixer;
mod sampler;
mod sync;

pub use command::*;
pub use deck::*;
pub use engine::*;
pub use eq::{Equalizer, EQ_MAX_DB, EQ_MIN_DB};
pub use events::*;
pub use gain::GainRamp;
pub use gc::{defer_drop, gc_handle};
pub use mixer::*;
pub use sampler::*;
pub use sync::*;

//! Audio device backend
//!
//! Built on CPAL (ALSA/PipeWire/JACK on Linux, CoreAudio on macOS, WASAPI on
//! Windows). The audio thread owns the [`AudioEngine`](crate::engine::AudioEngine);
//! the UI drives it through [`EngineController`](crate::controller::EngineController).
//!
//! # Output Modes
//!
//! - **MasterOnly**: single stereo output; the cue bus is rendered but unheard
//! - **MasterAndCue**: a second stereo output for headphones
//!
//! # Example Usage
//!
//! ```ignore
//! use vinyl_core::audio::start_audio_system;
//! use vinyl_core::config::VinylConfig;
//!
//! let mut system = start_audio_system(&VinylConfig::default())?;
//! system.controller.set_crossfader(50.0)?;
//! let deck = system.controller.deck_snapshot(DeckId::A);
//! ```

mod backend;
mod config;
mod cpal_backend;
mod device;
mod error;

pub use config::{
    AudioConfig, BufferSize, DeviceId, OutputMode, DEFAULT_BUFFER_SIZE, DEFAULT_SAMPLE_RATE,
    LOW_LATENCY_BUFFER_SIZE, MAX_BUFFER_SIZE, MIN_BUFFER_SIZE,
};

pub use backend::{start_audio_system, AudioHandle, AudioSystem};

pub use device::{
    default_device, find_device_by_id, get_available_output_devices, get_input_devices,
    get_output_devices, list_devices, AudioDevice, DeviceDirection,
};

pub use error::{AudioError, AudioResult};

//! Audio system startup
//!
//! Wires the engine, its command and event channels and the controller to
//! the device streams:
//! - UI sends commands through the controller's lock-free queue
//! - The master output callback owns the [`AudioEngine`] exclusively
//! - State flows back through relaxed atomics and the event channel

use crate::config::VinylConfig;
use crate::controller::EngineController;
use crate::engine::{command_channel, event_channel, AudioEngine, EventReceiver};

use super::cpal_backend::{self, CpalAudioHandle};
use super::error::AudioResult;

/// Handle to the running streams; drop it to stop audio
pub type AudioHandle = CpalAudioHandle;

/// A running audio system
pub struct AudioSystem {
    /// Keeps the streams alive
    pub handle: AudioHandle,
    /// Control surface for the UI thread
    pub controller: EngineController,
    /// Notifications from the audio thread and background loads
    pub events: EventReceiver,
    pub sample_rate: u32,
    /// Buffer size in frames
    pub buffer_size: u32,
    /// One-way output latency in milliseconds
    pub latency_ms: f32,
}

/// Open the configured devices and start the engine
///
/// Output failures are fatal. A microphone that cannot be opened is logged
/// and leaves microphone recording unavailable.
pub fn start_audio_system(config: &VinylConfig) -> AudioResult<AudioSystem> {
    let plan = cpal_backend::plan_outputs(&config.audio)?;
    let sample_rate = plan.sample_rate;
    let buffer_size = plan.buffer_size;

    let mut engine = AudioEngine::new_with_sample_rate(sample_rate);
    engine.apply_config(config);

    let input_stream = if config.audio.enable_microphone {
        match cpal_backend::open_microphone(&config.audio, sample_rate, buffer_size) {
            Ok((stream, consumer)) => {
                engine.attach_microphone(consumer);
                Some(stream)
            }
            Err(e) => {
                log::warn!("Microphone unavailable: {}", e);
                None
            }
        }
    } else {
        log::info!("Microphone disabled in config");
        None
    };

    let (command_tx, command_rx) = command_channel();
    let (event_tx, event_rx) = event_channel();
    engine.set_event_sender(event_tx.clone());

    let controller = EngineController::new(
        &engine,
        command_tx,
        event_tx,
        config.sampler.record_capacity_frames(sample_rate),
    );

    let handle = cpal_backend::start_streams(plan, engine, command_rx, input_stream)?;
    let latency_ms = handle.latency_ms();

    Ok(AudioSystem {
        handle,
        controller,
        events: event_rx,
        sample_rate,
        buffer_size,
        latency_ms,
    })
}

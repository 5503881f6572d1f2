//! CPAL stream setup
//!
//! # Architecture
//!
//! ```text
//!   UI commands ──► command queue ──► ┌────────────────────────┐
//!                   (rtrb SPSC)       │    Master stream       │
//!                                     │  (owns AudioEngine)    │
//!   Microphone ──► input stream ────► │                        │
//!                  (rtrb SPSC ring)   └───────────┬────────────┘
//!                                                 │ cue frames
//!                                     ┌───────────▼────────────┐
//!                                     │   Cue ring (SPSC)      │
//!                                     └───────────┬────────────┘
//!                                     ┌───────────▼────────────┐
//!                                     │     Cue stream         │
//!                                     │  (reads ring only)     │
//!                                     └────────────────────────┘
//! ```
//!
//! The master callback owns the engine outright, so no stream ever waits on
//! another. Missing cue or microphone frames become silence.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BufferSize as CpalBufferSize, SampleFormat, Stream, StreamConfig};

use super::config::{AudioConfig, MAX_BUFFER_SIZE};
use super::device::{resolve_device, DeviceDirection};
use super::error::{AudioError, AudioResult};
use crate::engine::{AudioEngine, EngineCommand};
use crate::types::{StereoBuffer, StereoSample};

/// Keeps the streams alive; drop to stop audio
pub struct CpalAudioHandle {
    _master_stream: Stream,
    cue_stream: Option<Stream>,
    _input_stream: Option<Stream>,
    sample_rate: u32,
    buffer_size: u32,
}

impl CpalAudioHandle {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Buffer size in frames as requested from the device
    pub fn buffer_size(&self) -> u32 {
        self.buffer_size
    }

    /// One-way output latency in milliseconds
    pub fn latency_ms(&self) -> f32 {
        (self.buffer_size as f32 / self.sample_rate as f32) * 1000.0
    }

    pub fn has_cue_output(&self) -> bool {
        self.cue_stream.is_some()
    }
}

/// Output devices and configs chosen before the engine exists
pub struct OutputPlan {
    master_device: cpal::Device,
    master_config: StreamConfig,
    cue: Option<(cpal::Device, StreamConfig)>,
    pub sample_rate: u32,
    pub buffer_size: u32,
}

/// Pick devices, sample rate and buffer size for the configured outputs
pub fn plan_outputs(config: &AudioConfig) -> AudioResult<OutputPlan> {
    let master_device = resolve_device(config.master_device.as_ref(), DeviceDirection::Output)?;
    log::info!("Master device: {}", device_label(&master_device));

    let buffer_size = config.buffer_size.frames();
    let master_supported = select_config(&master_device, config.target_sample_rate())?;
    let sample_rate = master_supported.sample_rate().0;
    let master_config = stream_config(&master_supported, buffer_size);

    let cue = match config.output_mode {
        super::OutputMode::MasterOnly => None,
        super::OutputMode::MasterAndCue => {
            let cue_device = resolve_device(config.cue_device.as_ref(), DeviceDirection::Output)?;
            log::info!("Cue device: {}", device_label(&cue_device));
            let cue_supported = select_config(&cue_device, sample_rate)?;
            let cue_rate = cue_supported.sample_rate().0;
            if cue_rate != sample_rate {
                return Err(AudioError::SampleRateMismatch {
                    master: sample_rate,
                    cue: cue_rate,
                });
            }
            let cue_config = stream_config(&cue_supported, buffer_size);
            Some((cue_device, cue_config))
        }
    };

    log::info!(
        "Audio config: {} channels, {}Hz, {} frames (~{:.1}ms latency)",
        master_config.channels,
        sample_rate,
        buffer_size,
        config.buffer_size.latency_ms(sample_rate)
    );

    Ok(OutputPlan {
        master_device,
        master_config,
        cue,
        sample_rate,
        buffer_size,
    })
}

/// Open the microphone stream at the engine rate
///
/// Frames are converted to stereo and pushed to the returned ring. Any
/// failure is returned to the caller, which carries on without a
/// microphone.
pub fn open_microphone(
    config: &AudioConfig,
    sample_rate: u32,
    buffer_size: u32,
) -> AudioResult<(Stream, rtrb::Consumer<StereoSample>)> {
    let device = resolve_device(config.input_device.as_ref(), DeviceDirection::Input)?;
    log::info!("Input device: {}", device_label(&device));

    let ranges: Vec<_> = device
        .supported_input_configs()
        .map_err(|e| AudioError::ConfigError(e.to_string()))?
        .collect();
    let range = ranges
        .iter()
        .filter(|c| c.sample_format() == SampleFormat::F32)
        .find(|c| supports_rate(c, sample_rate))
        .ok_or_else(|| {
            AudioError::UnsupportedFormat(format!("no f32 input at {}Hz", sample_rate))
        })?;
    let supported = range.clone().with_sample_rate(cpal::SampleRate(sample_rate));
    let config = stream_config(&supported, buffer_size);
    let channels = config.channels as usize;

    let capacity = (buffer_size as usize * 4).max(MAX_BUFFER_SIZE);
    let (mut producer, consumer) = rtrb::RingBuffer::<StereoSample>::new(capacity);

    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                push_input(data, channels, &mut producer);
            },
            move |err| {
                log::error!("Input stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))?;
    stream
        .play()
        .map_err(|e| AudioError::StreamPlayError(format!("Input: {}", e)))?;

    log::info!("Input stream started ({} channels)", channels);
    Ok((stream, consumer))
}

/// Build and start the output streams, moving the engine into the master
/// callback
pub fn start_streams(
    plan: OutputPlan,
    engine: AudioEngine,
    command_rx: rtrb::Consumer<EngineCommand>,
    input_stream: Option<Stream>,
) -> AudioResult<CpalAudioHandle> {
    let OutputPlan {
        master_device,
        master_config,
        cue,
        sample_rate,
        buffer_size,
    } = plan;

    let (cue_producer, cue_stream) = match cue {
        Some((cue_device, cue_config)) => {
            // 4x the buffer absorbs jitter between the two device clocks
            let capacity = buffer_size as usize * 4;
            let (producer, consumer) = rtrb::RingBuffer::<StereoSample>::new(capacity);
            let stream = build_cue_stream(&cue_device, &cue_config, consumer)?;
            (Some(producer), Some(stream))
        }
        None => (None, None),
    };

    let state = CallbackState::new(engine, command_rx, cue_producer);
    let master_stream = build_master_stream(&master_device, &master_config, state)?;

    master_stream
        .play()
        .map_err(|e| AudioError::StreamPlayError(format!("Master: {}", e)))?;
    if let Some(stream) = &cue_stream {
        stream
            .play()
            .map_err(|e| AudioError::StreamPlayError(format!("Cue: {}", e)))?;
    }

    log::info!(
        "Audio streams started ({})",
        if cue_stream.is_some() { "master+cue" } else { "master only" }
    );

    Ok(CpalAudioHandle {
        _master_stream: master_stream,
        cue_stream,
        _input_stream: input_stream,
        sample_rate,
        buffer_size,
    })
}

fn device_label(device: &cpal::Device) -> String {
    device.name().unwrap_or_else(|_| "Unknown".to_string())
}

fn supports_rate(range: &cpal::SupportedStreamConfigRange, rate: u32) -> bool {
    rate >= range.min_sample_rate().0 && rate <= range.max_sample_rate().0
}

fn stream_config(supported: &cpal::SupportedStreamConfig, buffer_size: u32) -> StreamConfig {
    StreamConfig {
        channels: supported.channels(),
        sample_rate: supported.sample_rate(),
        buffer_size: CpalBufferSize::Fixed(buffer_size),
    }
}

/// Best output config for a device
///
/// Prefers f32 stereo at `target_rate`; falls back to any stereo config at
/// its maximum rate.
fn select_config(
    device: &cpal::Device,
    target_rate: u32,
) -> AudioResult<cpal::SupportedStreamConfig> {
    let ranges: Vec<_> = device
        .supported_output_configs()
        .map_err(|e| AudioError::ConfigError(e.to_string()))?
        .collect();

    let best = ranges
        .iter()
        .filter(|c| c.sample_format() == SampleFormat::F32 && c.channels() >= 2)
        .find(|c| supports_rate(c, target_rate))
        .or_else(|| {
            ranges
                .iter()
                .find(|c| c.sample_format() == SampleFormat::F32 && c.channels() >= 2)
        })
        .or_else(|| ranges.iter().find(|c| c.sample_format() == SampleFormat::F32))
        .ok_or_else(|| AudioError::ConfigError("No f32 output configuration".to_string()))?;

    let rate = if supports_rate(best, target_rate) {
        cpal::SampleRate(target_rate)
    } else {
        let fallback = best.max_sample_rate();
        log::warn!(
            "Audio device doesn't support {}Hz, falling back to {}Hz",
            target_rate,
            fallback.0
        );
        fallback
    };
    Ok(best.clone().with_sample_rate(rate))
}

/// Everything the master callback owns
struct CallbackState {
    engine: AudioEngine,
    command_rx: rtrb::Consumer<EngineCommand>,
    master_buffer: StereoBuffer,
    cue_buffer: StereoBuffer,
    cue_producer: Option<rtrb::Producer<StereoSample>>,
}

impl CallbackState {
    fn new(
        engine: AudioEngine,
        command_rx: rtrb::Consumer<EngineCommand>,
        cue_producer: Option<rtrb::Producer<StereoSample>>,
    ) -> Self {
        Self {
            engine,
            command_rx,
            master_buffer: StereoBuffer::silence(MAX_BUFFER_SIZE),
            cue_buffer: StereoBuffer::silence(MAX_BUFFER_SIZE),
            cue_producer,
        }
    }

    /// Fill an interleaved device buffer
    ///
    /// Device buffers larger than the engine's block size are rendered in
    /// several blocks.
    fn render(&mut self, data: &mut [f32], channels: usize) {
        self.engine.process_commands(&mut self.command_rx);

        for chunk in data.chunks_mut(MAX_BUFFER_SIZE * channels) {
            let n_frames = chunk.len() / channels;
            self.master_buffer.set_len_from_capacity(n_frames);
            self.cue_buffer.set_len_from_capacity(n_frames);
            self.engine
                .process(&mut self.master_buffer, &mut self.cue_buffer);

            write_interleaved(self.master_buffer.as_slice(), chunk, channels);
            if let Some(producer) = &mut self.cue_producer {
                push_frames(self.cue_buffer.as_slice(), producer);
            }
        }
    }
}

fn build_master_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    mut state: CallbackState,
) -> AudioResult<Stream> {
    let channels = config.channels as usize;
    device
        .build_output_stream(
            config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                state.render(data, channels);
            },
            move |err| {
                log::error!("Master stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))
}

fn build_cue_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    mut consumer: rtrb::Consumer<StereoSample>,
) -> AudioResult<Stream> {
    let channels = config.channels as usize;
    device
        .build_output_stream(
            config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                pop_interleaved(&mut consumer, data, channels);
            },
            move |err| {
                log::error!("Cue stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))
}

/// Copy stereo frames into an interleaved buffer
///
/// Extra channels and frames past the end of `frames` are zeroed. A mono
/// device gets the average of both sides.
fn write_interleaved(frames: &[StereoSample], data: &mut [f32], channels: usize) {
    for (i, out) in data.chunks_mut(channels).enumerate() {
        match frames.get(i) {
            Some(frame) => write_frame(*frame, out),
            None => out.fill(0.0),
        }
    }
}

fn write_frame(frame: StereoSample, out: &mut [f32]) {
    match out {
        [mono] => *mono = (frame.left + frame.right) * 0.5,
        [left, right, rest @ ..] => {
            *left = frame.left;
            *right = frame.right;
            rest.fill(0.0);
        }
        [] => {}
    }
}

/// Fill an interleaved buffer from a ring, silence on underrun
fn pop_interleaved(consumer: &mut rtrb::Consumer<StereoSample>, data: &mut [f32], channels: usize) {
    for out in data.chunks_mut(channels) {
        match consumer.pop() {
            Ok(frame) => write_frame(frame, out),
            Err(_) => out.fill(0.0),
        }
    }
}

/// Push frames until the ring is full; the rest are dropped
fn push_frames(frames: &[StereoSample], producer: &mut rtrb::Producer<StereoSample>) {
    for frame in frames {
        if producer.push(*frame).is_err() {
            break;
        }
    }
}

/// Convert interleaved input to stereo and push it
///
/// Mono is duplicated to both sides; beyond two channels only the first
/// two are kept.
fn push_input(data: &[f32], channels: usize, producer: &mut rtrb::Producer<StereoSample>) {
    for frame in data.chunks(channels.max(1)) {
        let sample = match frame {
            [mono] => StereoSample::mono(*mono),
            [left, right, ..] => StereoSample::new(*left, *right),
            [] => continue,
        };
        if producer.push(sample).is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_file::{PcmBuffer, Track, UNKNOWN_ARTIST};
    use crate::engine::command_channel;
    use crate::types::DeckId;

    #[test]
    fn test_write_interleaved_pads_channels() {
        let frames = [StereoSample::new(0.1, 0.2), StereoSample::new(0.3, 0.4)];
        let mut data = [9.0f32; 12];
        write_interleaved(&frames, &mut data, 4);
        assert_eq!(data, [0.1, 0.2, 0.0, 0.0, 0.3, 0.4, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_write_interleaved_mono_device() {
        let frames = [StereoSample::new(0.2, 0.6)];
        let mut data = [0.0f32; 1];
        write_interleaved(&frames, &mut data, 1);
        assert!((data[0] - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_push_input_converts_to_stereo() {
        let (mut producer, mut consumer) = rtrb::RingBuffer::new(8);
        push_input(&[0.5, 0.25], 1, &mut producer);
        push_input(&[0.1, 0.2, 0.3, 0.4, 0.5, 0.6], 3, &mut producer);

        assert_eq!(consumer.pop(), Ok(StereoSample::mono(0.5)));
        assert_eq!(consumer.pop(), Ok(StereoSample::mono(0.25)));
        assert_eq!(consumer.pop(), Ok(StereoSample::new(0.1, 0.2)));
        assert_eq!(consumer.pop(), Ok(StereoSample::new(0.4, 0.5)));
        assert!(consumer.pop().is_err());
    }

    #[test]
    fn test_push_input_drops_when_full() {
        let (mut producer, mut consumer) = rtrb::RingBuffer::new(2);
        push_input(&[0.1, 0.2, 0.3], 1, &mut producer);
        assert_eq!(consumer.slots(), 2);
        assert_eq!(consumer.pop(), Ok(StereoSample::mono(0.1)));
    }

    #[test]
    fn test_pop_interleaved_underrun_is_silent() {
        let (mut producer, mut consumer) = rtrb::RingBuffer::new(4);
        assert!(producer.push(StereoSample::new(0.5, -0.5)).is_ok());
        let mut data = [1.0f32; 4];
        pop_interleaved(&mut consumer, &mut data, 2);
        assert_eq!(data, [0.5, -0.5, 0.0, 0.0]);
    }

    #[test]
    fn test_render_splits_large_device_buffers() {
        let sr = 48000;
        let mut engine = AudioEngine::new_with_sample_rate(sr);
        let audio = PcmBuffer::new(vec![StereoSample::mono(0.5); sr as usize], sr);
        let track = Track::new("Loop", UNKNOWN_ARTIST, 120.0, "1A", audio).into_shared();
        engine.load_track(DeckId::A, track);
        engine.set_crossfader(0.0);
        assert!(engine.play(DeckId::A).is_ok());

        let (_tx, rx) = command_channel();
        let (cue_tx, mut cue_rx) = rtrb::RingBuffer::new(MAX_BUFFER_SIZE * 4);
        let mut state = CallbackState::new(engine, rx, Some(cue_tx));

        let frames = MAX_BUFFER_SIZE + 100;
        let mut data = vec![0.0f32; frames * 2];
        state.render(&mut data, 2);

        // Both blocks produced sound, including the tail past the first block
        assert!(data[2000..2002].iter().any(|s| s.abs() > 0.0));
        assert!(data[frames * 2 - 2..].iter().any(|s| s.abs() > 0.0));
        assert_eq!(cue_rx.slots(), frames);
    }
}

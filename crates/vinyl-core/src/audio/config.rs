//! Audio backend configuration
//!
//! Output mode, device selection (output and capture), buffer size and
//! sample rate.

use serde::{Deserialize, Serialize};

pub use crate::engine::MAX_BUFFER_SIZE;

/// Smallest buffer size accepted for a fixed request (frames)
pub const MIN_BUFFER_SIZE: u32 = 64;

/// Buffer size when none is configured (frames)
///
/// About 10.7ms at 48kHz.
pub const DEFAULT_BUFFER_SIZE: u32 = 512;

/// Buffer size used in low-latency mode (frames)
pub const LOW_LATENCY_BUFFER_SIZE: u32 = 256;

/// Preferred sample rate
///
/// If the output device cannot run at this rate the backend falls back to
/// the device maximum; decks read tracks at their native rate either way.
pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

/// Which outputs the backend opens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputMode {
    /// Master only; the cue bus is rendered but not played
    #[default]
    MasterOnly,

    /// Master plus a separate headphone (cue) output
    MasterAndCue,
}

/// Preferred buffer size for audio streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BufferSize {
    #[default]
    Default,
    /// A specific size in frames, clamped to 64..=8192
    Fixed(u32),
    LowLatency,
}

impl BufferSize {
    /// Buffer size in frames that the backend will request
    pub fn frames(&self) -> u32 {
        match self {
            BufferSize::Default => DEFAULT_BUFFER_SIZE,
            BufferSize::Fixed(frames) => (*frames).clamp(MIN_BUFFER_SIZE, MAX_BUFFER_SIZE as u32),
            BufferSize::LowLatency => LOW_LATENCY_BUFFER_SIZE,
        }
    }

    /// One-way latency in milliseconds at `sample_rate`
    pub fn latency_ms(&self, sample_rate: u32) -> f32 {
        (self.frames() as f32 / sample_rate as f32) * 1000.0
    }
}

/// Audio device identifier
///
/// The host (ALSA, JACK, CoreAudio, ...) is optional; without it every host
/// is searched by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceId {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

impl DeviceId {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: None,
        }
    }

    pub fn with_host(name: &str, host: &str) -> Self {
        Self {
            name: name.to_string(),
            host: Some(host.to_string()),
        }
    }

    /// Label including the host, e.g. `[ALSA] hw:0,0`
    pub fn display_label(&self) -> String {
        match &self.host {
            Some(host) => format!("[{}] {}", host, self.name),
            None => self.name.clone(),
        }
    }
}

/// Configuration for the audio backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub output_mode: OutputMode,

    /// Master output device (None = system default)
    pub master_device: Option<DeviceId>,

    /// Headphone output device, only used in `MasterAndCue` mode
    /// (None = system default)
    pub cue_device: Option<DeviceId>,

    /// Capture device for microphone recording (None = system default input)
    pub input_device: Option<DeviceId>,

    /// Open a capture stream at startup
    ///
    /// When false, or when no input device can be opened, microphone
    /// recording reports the device as unavailable.
    pub enable_microphone: bool,

    pub buffer_size: BufferSize,

    /// Preferred sample rate (None = 48kHz)
    pub sample_rate: Option<u32>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            output_mode: OutputMode::default(),
            master_device: None,
            cue_device: None,
            input_device: None,
            enable_microphone: true,
            buffer_size: BufferSize::default(),
            sample_rate: None,
        }
    }
}

impl AudioConfig {
    pub fn master_only() -> Self {
        Self {
            output_mode: OutputMode::MasterOnly,
            ..Default::default()
        }
    }

    pub fn master_and_cue() -> Self {
        Self {
            output_mode: OutputMode::MasterAndCue,
            ..Default::default()
        }
    }

    pub fn with_master_device(mut self, device: DeviceId) -> Self {
        self.master_device = Some(device);
        self
    }

    pub fn with_cue_device(mut self, device: DeviceId) -> Self {
        self.cue_device = Some(device);
        self
    }

    pub fn with_input_device(mut self, device: DeviceId) -> Self {
        self.input_device = Some(device);
        self
    }

    pub fn without_microphone(mut self) -> Self {
        self.enable_microphone = false;
        self
    }

    pub fn with_buffer_frames(mut self, frames: u32) -> Self {
        self.buffer_size = BufferSize::Fixed(frames);
        self
    }

    pub fn with_sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = Some(rate);
        self
    }

    /// Sample rate the backend will try to open
    pub fn target_sample_rate(&self) -> u32 {
        self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_size_clamping() {
        assert_eq!(BufferSize::Default.frames(), 512);
        assert_eq!(BufferSize::Fixed(16).frames(), 64);
        assert_eq!(BufferSize::Fixed(100_000).frames(), 8192);
        assert_eq!(BufferSize::Fixed(1024).frames(), 1024);
        assert_eq!(BufferSize::LowLatency.frames(), 256);
    }

    #[test]
    fn test_latency() {
        let latency = BufferSize::Fixed(480).latency_ms(48000);
        assert!((latency - 10.0).abs() < 1e-4);
    }

    #[test]
    fn test_builder() {
        let config = AudioConfig::master_and_cue()
            .with_cue_device(DeviceId::with_host("hw:1,0", "ALSA"))
            .with_buffer_frames(256)
            .without_microphone();
        assert_eq!(config.output_mode, OutputMode::MasterAndCue);
        assert_eq!(config.cue_device.as_ref().map(|d| d.display_label()).as_deref(), Some("[ALSA] hw:1,0"));
        assert_eq!(config.buffer_size, BufferSize::Fixed(256));
        assert!(!config.enable_microphone);
        assert_eq!(config.target_sample_rate(), 48000);
    }
}

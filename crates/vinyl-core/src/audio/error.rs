//! Audio backend error types

use thiserror::Error;

/// Errors that can occur while opening audio devices and streams
#[derive(Error, Debug)]
pub enum AudioError {
    /// No devices of the requested direction
    #[error("No audio {0} devices found")]
    NoDevices(&'static str),

    #[error("Failed to get default audio device: {0}")]
    NoDefaultDevice(String),

    #[error("Audio device not found: {0}")]
    DeviceNotFound(String),

    /// Failed to get device configuration
    #[error("Failed to get device config: {0}")]
    ConfigError(String),

    #[error("Failed to build audio stream: {0}")]
    StreamBuildError(String),

    #[error("Failed to start audio stream: {0}")]
    StreamPlayError(String),

    /// Device cannot run at the rate the engine needs
    #[error("Unsupported stream format: {0}")]
    UnsupportedFormat(String),

    /// Master and cue devices negotiated different rates
    #[error("Sample rate mismatch: master={master}Hz, cue={cue}Hz")]
    SampleRateMismatch { master: u32, cue: u32 },
}

/// Result type for audio operations
pub type AudioResult<T> = Result<T, AudioError>;

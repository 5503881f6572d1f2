//! Decoded audio and track loading
//!
//! Everything that turns bytes on disk into engine-ready audio:
//!
//! - [`PcmBuffer`]: decoded stereo `f32` frames at a known sample rate
//! - [`Track`]: a decoded song plus its BPM, key and display metadata
//! - [`decode`]: container/codec decoding via symphonia (WAV, FLAC, OGG, MP3)
//! - [`resample`]: sample rate conversion via rubato
//!
//! Decoding allocates and may take a long time; it must never run on the
//! audio thread.

mod decode;
mod resample;

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use basedrop::Shared;
use thiserror::Error;

use crate::engine::gc_handle;
use crate::types::{StereoBuffer, StereoSample};

pub use decode::decode;
pub use resample::resample;

/// Artist shown for tracks without metadata
pub const UNKNOWN_ARTIST: &str = "Unknown Artist";

/// Errors produced while reading or decoding audio
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// File could not be read
    #[error("IO error: {0}")]
    Io(String),

    /// No demuxer/codec recognised the data
    #[error("Unsupported format: {0}")]
    Unsupported(String),

    /// Container has no decodable audio track
    #[error("No audio track found")]
    NoAudioTrack,

    /// Stream recognised but corrupt
    #[error("Malformed audio data: {0}")]
    Malformed(String),

    /// Decoding succeeded but produced no frames
    #[error("Decoded audio is empty")]
    Empty,

    /// Sample rate conversion failed
    #[error("Resampling failed: {0}")]
    Resample(String),
}

/// Decoded stereo audio at a fixed sample rate
///
/// Mono sources are duplicated to both channels, multichannel sources keep
/// their first two channels.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    frames: StereoBuffer,
    sample_rate: u32,
}

impl PcmBuffer {
    pub fn new(frames: Vec<StereoSample>, sample_rate: u32) -> Self {
        Self {
            frames: StereoBuffer::from_vec(frames),
            sample_rate,
        }
    }

    /// Number of stereo frames
    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[inline]
    pub fn frames(&self) -> &[StereoSample] {
        self.frames.as_slice()
    }

    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames.len() as f64 / self.sample_rate as f64
    }

    /// Wrap for sharing with the audio thread (deferred deallocation)
    pub fn into_shared(self) -> Shared<PcmBuffer> {
        Shared::new(&gc_handle(), self)
    }
}

/// Unique track identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackId(u64);

impl TrackId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// A decoded song owned by the track library
///
/// Immutable once created. Decks borrow it through [`TrackRef`]; the audio
/// thread never frees track memory.
#[derive(Debug)]
pub struct Track {
    pub id: TrackId,
    pub name: String,
    pub artist: String,
    /// Original tempo of the recording
    pub bpm: f64,
    /// Musical key label, e.g. "8A" or "F#m"
    pub key: String,
    pub audio: PcmBuffer,
}

/// Shared, non-owning reference to a [`Track`] held by a deck
pub type TrackRef = Shared<Track>;

impl Track {
    pub fn new(
        name: impl Into<String>,
        artist: impl Into<String>,
        bpm: f64,
        key: impl Into<String>,
        audio: PcmBuffer,
    ) -> Self {
        Self {
            id: TrackId::next(),
            name: name.into(),
            artist: artist.into(),
            bpm,
            key: key.into(),
            audio,
        }
    }

    pub fn duration_seconds(&self) -> f64 {
        self.audio.duration_seconds()
    }

    pub fn into_shared(self) -> TrackRef {
        Shared::new(&gc_handle(), self)
    }
}

/// Read and decode a track from disk
///
/// The track name is the file stem and the artist is [`UNKNOWN_ARTIST`].
/// The decoded audio keeps the file's native sample rate; decks convert
/// on the fly.
pub fn load_track(path: &Path, bpm: f64, key: &str) -> Result<Track, DecodeError> {
    log::info!("load_track: Loading {:?} ({} BPM, key {})", path, bpm, key);

    let bytes = std::fs::read(path).map_err(|e| DecodeError::Io(format!("{}: {}", path.display(), e)))?;
    let hint = path.extension().and_then(|e| e.to_str());
    let audio = decode(bytes, hint)?;

    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("Untitled")
        .to_string();

    log::info!(
        "load_track: Decoded '{}' ({:.1}s @ {}Hz)",
        name,
        audio.duration_seconds(),
        audio.sample_rate()
    );

    Ok(Track::new(name, UNKNOWN_ARTIST, bpm, key, audio))
}

/// Decode sample bytes and convert them to `sample_rate`
///
/// Sampler slots always hold audio at the engine rate.
pub fn decode_sample(
    bytes: Vec<u8>,
    hint: Option<&str>,
    sample_rate: u32,
) -> Result<PcmBuffer, DecodeError> {
    let pcm = decode(bytes, hint)?;
    if pcm.sample_rate() == sample_rate {
        return Ok(pcm);
    }
    resample(&pcm, sample_rate)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::io::Cursor;

    /// Encode a 16-bit stereo WAV sine in memory
    pub fn sine_wav(sample_rate: u32, frames: usize, freq: f32) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for i in 0..frames {
                let t = i as f32 / sample_rate as f32;
                let value = ((t * freq * std::f32::consts::TAU).sin() * 0.5 * i16::MAX as f32) as i16;
                writer.write_sample(value).unwrap();
                writer.write_sample(value).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    /// Encode a 16-bit mono WAV of a constant value
    pub fn mono_dc_wav(sample_rate: u32, frames: usize, value: i16) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for _ in 0..frames {
                writer.write_sample(value).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pcm_duration() {
        let pcm = PcmBuffer::new(vec![StereoSample::silence(); 24000], 48000);
        assert_eq!(pcm.len(), 24000);
        assert!((pcm.duration_seconds() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_track_ids_are_unique() {
        let a = Track::new("a", UNKNOWN_ARTIST, 120.0, "1A", PcmBuffer::new(Vec::new(), 48000));
        let b = Track::new("b", UNKNOWN_ARTIST, 120.0, "1A", PcmBuffer::new(Vec::new(), 48000));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_load_track_uses_file_stem() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Night Drive.wav");
        std::fs::write(&path, test_support::sine_wav(44100, 4410, 440.0)).unwrap();

        let track = load_track(&path, 124.0, "8A").unwrap();
        assert_eq!(track.name, "Night Drive");
        assert_eq!(track.artist, UNKNOWN_ARTIST);
        assert_eq!(track.bpm, 124.0);
        assert_eq!(track.key, "8A");
        assert_eq!(track.audio.sample_rate(), 44100);
        assert!((track.duration_seconds() - 0.1).abs() < 1e-3);
    }

    #[test]
    fn test_decode_sample_converts_rate() {
        let bytes = test_support::mono_dc_wav(24000, 2400, 8000);
        let pcm = decode_sample(bytes, Some("wav"), 48000).unwrap();
        assert_eq!(pcm.sample_rate(), 48000);
        assert_eq!(pcm.len(), 4800);
    }

    #[test]
    fn test_decode_sample_rejects_garbage() {
        let result = decode_sample(vec![0x13; 512], None, 48000);
        assert!(result.is_err());
    }

    #[test]
    fn test_load_track_missing_file() {
        let result = load_track(Path::new("/nonexistent/track.wav"), 120.0, "");
        assert!(matches!(result, Err(DecodeError::Io(_))));
    }
}

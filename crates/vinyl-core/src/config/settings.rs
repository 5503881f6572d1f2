//! Application settings
//!
//! Every section uses `#[serde(default)]`, so a config file only needs to
//! mention the values it changes.

use serde::{Deserialize, Serialize};

use crate::audio::AudioConfig;
use crate::engine::{
    DEFAULT_CROSSFADER, DEFAULT_CUE_VOLUME, DEFAULT_DECK_GAIN, DEFAULT_DECK_VOLUME,
    DEFAULT_MASTER_VOLUME, DEFAULT_SAMPLER_VOLUME, DEFAULT_SLOT_VOLUME,
};

/// Seconds of capture space reserved when a recording starts
pub const DEFAULT_RECORD_PREALLOC_SECONDS: f64 = 30.0;

/// Mixer bus levels at startup (all 0-100)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixerSettings {
    pub crossfader: f32,
    pub master_volume: f32,
    pub cue_volume: f32,
}

impl Default for MixerSettings {
    fn default() -> Self {
        Self {
            crossfader: DEFAULT_CROSSFADER,
            master_volume: DEFAULT_MASTER_VOLUME,
            cue_volume: DEFAULT_CUE_VOLUME,
        }
    }
}

/// Sampler levels and recorder sizing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerSettings {
    /// Sampler master volume (0-100)
    pub master_volume: f32,
    /// Initial volume of every slot (0-100)
    pub slot_volume: f32,
    /// Longest recording, in seconds; audio past this is dropped
    pub record_prealloc_seconds: f64,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            master_volume: DEFAULT_SAMPLER_VOLUME,
            slot_volume: DEFAULT_SLOT_VOLUME,
            record_prealloc_seconds: DEFAULT_RECORD_PREALLOC_SECONDS,
        }
    }
}

impl SamplerSettings {
    /// Capture capacity in frames at `sample_rate`
    pub fn record_capacity_frames(&self, sample_rate: u32) -> usize {
        let seconds = if self.record_prealloc_seconds.is_finite() {
            self.record_prealloc_seconds.max(0.0)
        } else {
            DEFAULT_RECORD_PREALLOC_SECONDS
        };
        (seconds * sample_rate as f64).ceil() as usize
    }
}

/// Deck levels at startup (0.0 to 1.0)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeckSettings {
    pub volume: f32,
    pub gain: f32,
}

impl Default for DeckSettings {
    fn default() -> Self {
        Self {
            volume: DEFAULT_DECK_VOLUME,
            gain: DEFAULT_DECK_GAIN,
        }
    }
}

/// Top-level configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VinylConfig {
    pub audio: AudioConfig,
    pub mixer: MixerSettings,
    pub sampler: SamplerSettings,
    pub deck: DeckSettings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_engine() {
        let config = VinylConfig::default();
        assert_eq!(config.mixer.crossfader, 50.0);
        assert_eq!(config.mixer.master_volume, 80.0);
        assert_eq!(config.mixer.cue_volume, 70.0);
        assert_eq!(config.sampler.master_volume, 75.0);
        assert_eq!(config.sampler.slot_volume, 75.0);
        assert_eq!(config.deck.volume, 0.8);
        assert_eq!(config.deck.gain, 0.5);
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = "mixer:\n  crossfader: 10.0\nsampler:\n  record_prealloc_seconds: 5.0\n";
        let config: VinylConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.mixer.crossfader, 10.0);
        assert_eq!(config.mixer.master_volume, DEFAULT_MASTER_VOLUME);
        assert_eq!(config.sampler.record_prealloc_seconds, 5.0);
        assert_eq!(config.deck, DeckSettings::default());
    }

    #[test]
    fn test_record_capacity() {
        let settings = SamplerSettings {
            record_prealloc_seconds: 2.5,
            ..Default::default()
        };
        assert_eq!(settings.record_capacity_frames(48000), 120_000);

        let negative = SamplerSettings {
            record_prealloc_seconds: -1.0,
            ..Default::default()
        };
        assert_eq!(negative.record_capacity_frames(48000), 0);
    }
}

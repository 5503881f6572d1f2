//! YAML configuration I/O
//!
//! Works with any serde type that has a `Default`, so a missing or broken
//! file never prevents startup.

use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Load configuration from a YAML file
///
/// Returns `T::default()` when the file is missing. A file that cannot be
/// read or parsed is reported with a warning and also yields the default.
pub fn load_config<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        log::info!("No config at {:?}, using defaults", path);
        return T::default();
    }

    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            log::warn!("Could not read {:?}: {}, using defaults", path, e);
            return T::default();
        }
    };

    match serde_yaml::from_str::<T>(&contents) {
        Ok(config) => {
            log::info!("Loaded config from {:?}", path);
            config
        }
        Err(e) => {
            log::warn!("Invalid config in {:?}: {}, using defaults", path, e);
            T::default()
        }
    }
}

/// Save configuration as YAML, creating parent directories as needed
pub fn save_config<T>(config: &T, path: &Path) -> Result<()>
where
    T: Serialize,
{
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
    }

    let yaml = serde_yaml::to_string(config).context("Failed to serialize config to YAML")?;
    std::fs::write(path, yaml)
        .with_context(|| format!("Failed to write config file: {:?}", path))?;

    log::info!("Saved config to {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VinylConfig;

    #[test]
    fn test_load_nonexistent_returns_default() {
        let config: VinylConfig = load_config(Path::new("/nonexistent/vinyl/config.yaml"));
        assert_eq!(config, VinylConfig::default());
    }

    #[test]
    fn test_invalid_yaml_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "mixer: [this is: not valid").unwrap();

        let config: VinylConfig = load_config(&path);
        assert_eq!(config, VinylConfig::default());
    }

    #[test]
    fn test_save_creates_directories_and_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");

        let mut config = VinylConfig::default();
        config.mixer.crossfader = 25.0;
        config.sampler.record_prealloc_seconds = 12.0;

        save_config(&config, &path).unwrap();
        let loaded: VinylConfig = load_config(&path);

        assert_eq!(loaded, config);
    }
}

//! Configuration for vinyl applications
//!
//! - YAML load/save for any serde type
//! - [`VinylConfig`]: audio backend settings plus mixer, sampler and deck
//!   startup defaults
//! - Platform config path
//!
//! ```ignore
//! use vinyl_core::config::{default_config_path, load_config, save_config, VinylConfig};
//!
//! let path = default_config_path();
//! let config: VinylConfig = load_config(&path);
//! save_config(&config, &path)?;
//! ```

mod io;
mod paths;
mod settings;

pub use io::{load_config, save_config};
pub use paths::{default_config_dir, default_config_path, CONFIG_FILE_NAME};
pub use settings::{DeckSettings, MixerSettings, SamplerSettings, VinylConfig};

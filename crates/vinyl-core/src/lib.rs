//! Vinyl Core - two-deck mixing and eight-slot sampling engine

pub mod audio;
pub mod audio_file;
pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod types;

pub use controller::{EngineController, SamplerSnapshot};
pub use error::{EngineError, EngineResult};
pub use types::*;

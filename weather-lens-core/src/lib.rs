//! Core library for the `weather-lens` CLI.
//!
//! This crate defines:
//! - Configuration handling
//! - Photo and weather observation loading
//! - Time alignment of observations to photos
//! - Abstraction over the image/text embedding model and similarity ranking
//!
//! It is used by `weather-lens-cli`, but can also be reused by other binaries or services.

pub mod config;
pub mod describe;
pub mod embedding;
pub mod images;
pub mod model;
pub mod observations;
pub mod pairing;
pub mod pipeline;
pub mod search;
pub mod similarity;

pub use config::Config;
pub use embedding::{Embedder, embedder_from_config};
pub use model::{Pairing, PairingMap, Timeline, TimelineError, Timestamped, WeatherRecord};
pub use pipeline::{PairingReport, RunSummary, Sample};
pub use search::{DEFAULT_TOLERANCE_SECS, find_within_tolerance};

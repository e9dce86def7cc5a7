//! Utterance batching and feature pipeline for speech recognition training.
//!
//! A manifest is planned into batches once ([`UtteranceDataset`]); each batch
//! is then decoded, featurized, augmented and padded on demand
//! ([`CollateFunc`]), optionally across worker threads ([`BatchLoader`]).

/// Audio decoding, waveform distortion and filterbank features.
pub mod analysis;
/// Application directories for logs.
pub mod app_dirs;
/// TOML pipeline configuration.
pub mod config;
/// Manifest parsing and batch planning.
pub mod dataset;
/// Tracing initialization.
pub mod logging;
/// Extraction, augmentation, collation and loading of batches.
pub mod pipeline;

pub use config::{CollateConfig, DatasetConfig, LoaderConfig, PipelineConfig};
pub use dataset::UtteranceDataset;
pub use pipeline::CollateFunc;
pub use pipeline::collate::{CollatedBatch, IGNORE_ID};
pub use pipeline::loader::BatchLoader;

//! TOML configuration for dataset construction, batch fetching and loading.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analysis::distortion::WavDistortionConfig;
use crate::analysis::fbank::FbankConfig;
use crate::dataset::plan::{BatchPolicy, BatchType, PlanError, PlanOptions};
use crate::pipeline::augment::{AugmentOptions, SpecAugConfig};
use crate::pipeline::collate::IGNORE_ID;

/// Errors that may occur while loading a pipeline configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the config file.
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to parse TOML config.
    #[error("Invalid config at {path}: {source}")]
    ParseToml {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Whole pipeline configuration; every section falls back to defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub dataset: DatasetConfig,
    pub collate: CollateConfig,
    pub loader: LoaderConfig,
}

/// Dataset construction parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Drop utterances longer than this (ms).
    pub max_length_ms: u64,
    /// Drop utterances shorter than this (ms).
    pub min_length_ms: u64,
    pub batch_type: BatchType,
    /// Utterances per batch for static batching.
    pub batch_size: usize,
    /// Summed duration cap (ms) for dynamic batching.
    pub max_frames_in_batch: u64,
    /// Sort by duration so batches hold similar lengths.
    pub sort: bool,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            max_length_ms: 10_240,
            min_length_ms: 0,
            batch_type: BatchType::Static,
            batch_size: 1,
            max_frames_in_batch: 0,
            sort: true,
        }
    }
}

impl DatasetConfig {
    /// Validate the batching parameters.
    pub fn plan_options(&self) -> Result<PlanOptions, PlanError> {
        Ok(PlanOptions {
            max_length_ms: self.max_length_ms,
            min_length_ms: self.min_length_ms,
            sort: self.sort,
            policy: BatchPolicy::new(self.batch_type, self.batch_size, self.max_frames_in_batch)?,
        })
    }
}

/// Whether collated batches carry label targets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchMode {
    #[default]
    Train,
    Inference,
}

/// Batch-fetch parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollateConfig {
    #[serde(default)]
    pub feature_extraction: FbankConfig,
    #[serde(default)]
    pub wav_distortion: WavDistortionConfig,
    #[serde(default = "default_subsampling_factor")]
    pub subsampling_factor: usize,
    #[serde(default)]
    pub left_context: usize,
    #[serde(default)]
    pub right_context: usize,
    #[serde(default)]
    pub spec_aug: bool,
    #[serde(default)]
    pub spec_aug_conf: SpecAugConfig,
    /// Upper bound of the feature dither scale; 0 disables dither.
    #[serde(default)]
    pub feature_dither: f32,
    /// Label padding value.
    #[serde(default = "default_ignore_id")]
    pub ignore_id: i32,
    #[serde(default)]
    pub mode: BatchMode,
}

impl Default for CollateConfig {
    fn default() -> Self {
        Self {
            feature_extraction: FbankConfig::default(),
            wav_distortion: WavDistortionConfig::default(),
            subsampling_factor: default_subsampling_factor(),
            left_context: 0,
            right_context: 0,
            spec_aug: false,
            spec_aug_conf: SpecAugConfig::default(),
            feature_dither: 0.0,
            ignore_id: default_ignore_id(),
            mode: BatchMode::Train,
        }
    }
}

impl CollateConfig {
    pub fn augment_options(&self) -> AugmentOptions {
        AugmentOptions {
            feature_dither: self.feature_dither,
            spec_aug: self.spec_aug.then_some(self.spec_aug_conf),
            left_context: self.left_context,
            right_context: self.right_context,
            subsampling_factor: self.subsampling_factor,
        }
    }
}

fn default_subsampling_factor() -> usize {
    1
}

fn default_ignore_id() -> i32 {
    IGNORE_ID
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Worker threads preparing batches; 1 runs inline.
    pub num_workers: usize,
    /// Base seed for per-batch RNGs.
    pub seed: u64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            num_workers: 1,
            seed: 0,
        }
    }
}

/// Load a pipeline configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<PipelineConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| ConfigError::ParseToml {
        path: path.to_path_buf(),
        source,
    })
}

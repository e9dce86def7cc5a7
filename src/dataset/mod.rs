//! Utterance dataset: manifest parsing and batch planning.

pub mod manifest;
pub mod plan;

use std::path::Path;

use thiserror::Error;

use crate::config::DatasetConfig;
use manifest::{Manifest, ManifestError, load_manifest};
use plan::{BatchPlan, PlanError, PlannedUtterance};

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error("Invalid batching configuration: {0}")]
    Plan(#[from] PlanError),
}

/// Indexable dataset of planned batches.
///
/// The plan is built once and never mutated, so the dataset can be shared
/// by reference across batch workers.
#[derive(Debug, Clone)]
pub struct UtteranceDataset {
    plan: BatchPlan,
    output_dim: Option<usize>,
}

impl UtteranceDataset {
    /// Parse `manifest_path` and plan batches according to `config`.
    pub fn open(manifest_path: &Path, config: &DatasetConfig) -> Result<Self, DatasetError> {
        let options = config.plan_options()?;
        let manifest = load_manifest(manifest_path)?;
        Ok(Self::build(manifest, &options))
    }

    /// Plan batches from an already parsed manifest.
    pub fn from_manifest(manifest: Manifest, config: &DatasetConfig) -> Result<Self, DatasetError> {
        let options = config.plan_options()?;
        Ok(Self::build(manifest, &options))
    }

    fn build(manifest: Manifest, options: &plan::PlanOptions) -> Self {
        Self {
            plan: BatchPlan::build(manifest.records, options),
            output_dim: manifest.vocab_size,
        }
    }

    /// Number of batches.
    pub fn len(&self) -> usize {
        self.plan.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plan.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&[PlannedUtterance]> {
        self.plan.get(idx)
    }

    pub fn plan(&self) -> &BatchPlan {
        &self.plan
    }

    /// Vocabulary size declared by the manifest's `token_shape` column.
    pub fn output_dim(&self) -> Option<usize> {
        self.output_dim
    }
}

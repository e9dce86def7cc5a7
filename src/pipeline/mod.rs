//! Per-batch feature pipeline: extraction, augmentation and collation.

pub mod augment;
pub mod collate;
pub mod extract;
pub mod loader;

use rand::Rng;

use crate::analysis::audio_decode::{SymphoniaLoader, WaveformLoader};
use crate::analysis::fbank::{FeatureComputer, KaldiFbank};
use crate::config::CollateConfig;
use crate::dataset::plan::PlannedUtterance;
use collate::CollatedBatch;
use extract::ExtractedBatch;

/// Turns one planned batch into a padded training batch.
///
/// Holds only read-only state, so a single instance can serve several
/// worker threads.
pub struct CollateFunc {
    config: CollateConfig,
    loader: Box<dyn WaveformLoader>,
    computer: Box<dyn FeatureComputer>,
}

impl CollateFunc {
    /// Symphonia decoding and Kaldi fbank features.
    pub fn new(config: CollateConfig) -> Self {
        Self::with_backends(config, Box::new(SymphoniaLoader), Box::new(KaldiFbank))
    }

    pub fn with_backends(
        config: CollateConfig,
        loader: Box<dyn WaveformLoader>,
        computer: Box<dyn FeatureComputer>,
    ) -> Self {
        Self {
            config,
            loader,
            computer,
        }
    }

    /// Extract surviving utterances of `batch`, longest first.
    pub fn extract<R: Rng + ?Sized>(
        &self,
        batch: &[PlannedUtterance],
        rng: &mut R,
    ) -> ExtractedBatch {
        extract::extract_batch(
            batch,
            self.loader.as_ref(),
            self.computer.as_ref(),
            &self.config,
            rng,
        )
    }

    /// Run extraction, the augmentation chain and padding for one batch.
    pub fn collate<R: Rng + ?Sized>(
        &self,
        batch: &[PlannedUtterance],
        rng: &mut R,
    ) -> CollatedBatch {
        let ExtractedBatch {
            keys,
            feats,
            labels,
        } = self.extract(batch, rng);
        if keys.len() < batch.len() {
            tracing::debug!(
                "Batch kept {} of {} utterances",
                keys.len(),
                batch.len()
            );
        }
        let feats = augment::augment_batch(feats, &self.config.augment_options(), rng);
        collate::collate(
            ExtractedBatch {
                keys,
                feats,
                labels,
            },
            self.config.ignore_id,
        )
    }
}

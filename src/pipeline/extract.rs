//! Per-utterance feature extraction with failure isolation.

use std::path::Path;

use rand::Rng;

use crate::analysis::audio_decode::{DecodeError, WaveformLoader};
use crate::analysis::fbank::{FeatureComputer, FeatureError, FeatureMatrix};
use crate::config::{BatchMode, CollateConfig};
use crate::dataset::plan::PlannedUtterance;

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("Feature computation failed: {0}")]
    Feature(#[from] FeatureError),
}

/// Surviving utterances of one batch, longest first.
///
/// `keys`, `feats` and `labels` (when present) always have equal length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedBatch {
    pub keys: Vec<String>,
    pub feats: Vec<FeatureMatrix>,
    pub labels: Option<Vec<Vec<i32>>>,
}

impl ExtractedBatch {
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Decode, optionally distort and featurize one utterance.
pub fn extract_utterance<R: Rng + ?Sized>(
    utt: &PlannedUtterance,
    loader: &dyn WaveformLoader,
    computer: &dyn FeatureComputer,
    config: &CollateConfig,
    rng: &mut R,
) -> Result<FeatureMatrix, ExtractError> {
    let mut waveform = loader.load(Path::new(&utt.audio_path))?;
    if let Some(method) = config
        .wav_distortion
        .maybe_distort(&mut waveform.samples, rng)
    {
        tracing::trace!("Distorted {} with {:?}", utt.key, method.kind);
    }
    Ok(computer.compute(&waveform, &config.feature_extraction)?)
}

/// Extract every utterance of `batch`, dropping the ones that fail.
///
/// Survivors are ordered by descending frame count; ties keep plan order.
pub fn extract_batch<R: Rng + ?Sized>(
    batch: &[PlannedUtterance],
    loader: &dyn WaveformLoader,
    computer: &dyn FeatureComputer,
    config: &CollateConfig,
    rng: &mut R,
) -> ExtractedBatch {
    let mut survivors: Vec<(&PlannedUtterance, FeatureMatrix)> = batch
        .iter()
        .filter_map(
            |utt| match extract_utterance(utt, loader, computer, config, rng) {
                Ok(feats) => Some((utt, feats)),
                Err(err) => {
                    tracing::warn!("Dropping utterance {}: {err}", utt.key);
                    None
                }
            },
        )
        .collect();
    survivors.sort_by(|a, b| b.1.nrows().cmp(&a.1.nrows()));

    let labels = match config.mode {
        BatchMode::Train => Some(
            survivors
                .iter()
                .map(|(utt, _)| utt.label_token_ids.clone())
                .collect(),
        ),
        BatchMode::Inference => None,
    };
    let keys = survivors.iter().map(|(utt, _)| utt.key.clone()).collect();
    let feats = survivors.into_iter().map(|(_, feats)| feats).collect();
    ExtractedBatch {
        keys,
        feats,
        labels,
    }
}

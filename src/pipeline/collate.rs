//! Length-aware padding of an extracted batch into rectangular tensors.

use ndarray::{Array1, Array2, Array3, s};

use super::extract::ExtractedBatch;
use crate::analysis::fbank::FeatureMatrix;

/// Label padding value; never a valid vocabulary id and distinct from 0.
pub const IGNORE_ID: i32 = -1;

/// Padded label tensor and true label lengths.
#[derive(Debug, Clone, PartialEq)]
pub struct Targets {
    /// `[batch, max_label_len]`, padded with the configured ignore id.
    pub ys_pad: Array2<i32>,
    pub ys_lengths: Array1<usize>,
}

/// Training-ready batch.
#[derive(Debug, Clone, PartialEq)]
pub struct CollatedBatch {
    pub keys: Vec<String>,
    /// `[batch, max_frames, feat_dim]`, zero padded.
    pub xs_pad: Array3<f32>,
    pub xs_lengths: Array1<usize>,
    /// Absent in inference mode.
    pub targets: Option<Targets>,
}

impl CollatedBatch {
    pub fn batch_size(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn max_frames(&self) -> usize {
        self.xs_pad.dim().1
    }

    pub fn feat_dim(&self) -> usize {
        self.xs_pad.dim().2
    }
}

/// Pad features with zeros and labels with `ignore_id`.
pub fn collate(batch: ExtractedBatch, ignore_id: i32) -> CollatedBatch {
    let (xs_pad, xs_lengths) = pad_features(&batch.feats);
    let targets = batch.labels.map(|labels| {
        let (ys_pad, ys_lengths) = pad_labels(&labels, ignore_id);
        Targets { ys_pad, ys_lengths }
    });
    CollatedBatch {
        keys: batch.keys,
        xs_pad,
        xs_lengths,
        targets,
    }
}

/// Stack matrices into `[batch, max_frames, feat_dim]`; an empty batch
/// yields a `[0, 0, 0]` tensor.
pub fn pad_features(feats: &[FeatureMatrix]) -> (Array3<f32>, Array1<usize>) {
    let xs_lengths: Array1<usize> = feats.iter().map(|x| x.nrows()).collect();
    let max_frames = xs_lengths.iter().copied().max().unwrap_or(0);
    let feat_dim = feats.first().map_or(0, |x| x.ncols());
    let mut xs_pad = Array3::<f32>::zeros((feats.len(), max_frames, feat_dim));
    for (i, x) in feats.iter().enumerate() {
        debug_assert_eq!(x.ncols(), feat_dim, "feature dims differ within a batch");
        xs_pad.slice_mut(s![i, ..x.nrows(), ..]).assign(x);
    }
    (xs_pad, xs_lengths)
}

/// Stack label sequences into `[batch, max_len]`, right-padded with `ignore_id`.
pub fn pad_labels(labels: &[Vec<i32>], ignore_id: i32) -> (Array2<i32>, Array1<usize>) {
    let ys_lengths: Array1<usize> = labels.iter().map(Vec::len).collect();
    let max_len = ys_lengths.iter().copied().max().unwrap_or(0);
    let mut ys_pad = Array2::<i32>::from_elem((labels.len(), max_len), ignore_id);
    for (mut row, label) in ys_pad.rows_mut().into_iter().zip(labels) {
        for (dst, &id) in row.iter_mut().zip(label) {
            *dst = id;
        }
    }
    (ys_pad, ys_lengths)
}

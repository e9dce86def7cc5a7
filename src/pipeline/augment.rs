//! Batch-wide feature augmentation: dither, spectral masking, context
//! splicing and temporal subsampling, applied in that order.

use ndarray::{Array2, s};
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::analysis::fbank::FeatureMatrix;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpecAugConfig {
    pub num_t_mask: usize,
    pub num_f_mask: usize,
    /// Maximum time-mask width in frames.
    pub max_t: usize,
    /// Maximum frequency-mask width in bins.
    pub max_f: usize,
    /// Fill time masks with standard-normal noise instead of zeros.
    pub gauss_mask_for_t: bool,
}

impl Default for SpecAugConfig {
    fn default() -> Self {
        Self {
            num_t_mask: 2,
            num_f_mask: 2,
            max_t: 50,
            max_f: 10,
            gauss_mask_for_t: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AugmentOptions {
    /// Upper bound of the batch-wide dither scale; 0 disables dither.
    pub feature_dither: f32,
    pub spec_aug: Option<SpecAugConfig>,
    pub left_context: usize,
    pub right_context: usize,
    pub subsampling_factor: usize,
}

/// Run the enabled stages over every matrix of a batch.
pub fn augment_batch<R: Rng + ?Sized>(
    mut feats: Vec<FeatureMatrix>,
    options: &AugmentOptions,
    rng: &mut R,
) -> Vec<FeatureMatrix> {
    if options.feature_dither > 0.0 {
        let scale = rng.random_range(0.0..options.feature_dither);
        for x in &mut feats {
            add_dither(x, scale, rng);
        }
    }
    if let Some(conf) = &options.spec_aug {
        feats = feats
            .iter()
            .map(|x| spec_augment(x, conf, rng))
            .collect();
    }
    if options.left_context > 0 || options.right_context > 0 {
        feats = feats
            .iter()
            .map(|x| splice(x, options.left_context, options.right_context))
            .collect();
    }
    if options.subsampling_factor > 1 {
        feats = feats
            .into_iter()
            .map(|x| subsample(&x, options.subsampling_factor))
            .collect();
    }
    feats
}

/// Add `U(-0.5, 0.5) * scale` noise to every element.
pub fn add_dither<R: Rng + ?Sized>(x: &mut FeatureMatrix, scale: f32, rng: &mut R) {
    x.mapv_inplace(|v| v + (rng.random::<f32>() - 0.5) * scale);
}

/// Copy `x` and apply time and frequency masks to the copy.
pub fn spec_augment<R: Rng + ?Sized>(
    x: &FeatureMatrix,
    conf: &SpecAugConfig,
    rng: &mut R,
) -> FeatureMatrix {
    let mut y = x.clone();
    let (max_frames, max_freq) = y.dim();
    if max_frames == 0 || max_freq == 0 {
        return y;
    }
    for _ in 0..conf.num_t_mask {
        let (start, end) = mask_span(rng, max_frames, conf.max_t);
        let mut block = y.slice_mut(s![start..end, ..]);
        if conf.gauss_mask_for_t {
            block.mapv_inplace(|_| rng.sample::<f32, _>(StandardNormal));
        } else {
            block.fill(0.0);
        }
    }
    for _ in 0..conf.num_f_mask {
        let (start, end) = mask_span(rng, max_freq, conf.max_f);
        y.slice_mut(s![.., start..end]).fill(0.0);
    }
    y
}

fn mask_span<R: Rng + ?Sized>(rng: &mut R, extent: usize, max_width: usize) -> (usize, usize) {
    let start = rng.random_range(0..extent);
    let width = rng.random_range(1..=max_width.max(1));
    (start, (start + width).min(extent))
}

/// Stack each frame with `left` preceding and `right` following frames,
/// replicating the edge frames where the context runs off either end.
pub fn splice(x: &FeatureMatrix, left: usize, right: usize) -> FeatureMatrix {
    if left == 0 && right == 0 {
        return x.clone();
    }
    let (rows, cols) = x.dim();
    let width = 1 + left + right;
    let mut out = Array2::<f32>::zeros((rows, cols * width));
    if rows == 0 {
        return out;
    }
    for t in 0..rows {
        for k in 0..width {
            let src = (t + k).saturating_sub(left).min(rows - 1);
            out.slice_mut(s![t, k * cols..(k + 1) * cols])
                .assign(&x.row(src));
        }
    }
    out
}

/// Keep every `factor`-th frame starting at frame 0.
pub fn subsample(x: &FeatureMatrix, factor: usize) -> FeatureMatrix {
    if factor <= 1 {
        return x.clone();
    }
    x.slice(s![..;factor as isize, ..]).to_owned()
}

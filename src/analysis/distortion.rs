//! Stochastic waveform distortions applied before feature extraction.
//!
//! A distortion method is picked by one cumulative scan over the configured
//! `method_rate`s. Each kind then rewrites individual samples, each sample
//! being touched with probability `point_rate`.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Distortion kinds with their parameter records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", content = "params", rename_all = "snake_case")]
pub enum DistortionKind {
    /// Constant gain in dB.
    GainDb { db: f32 },
    /// Hard clip at `max_db` relative to the waveform peak.
    MaxDistortion { max_db: f32 },
    /// `2 * mask_number` equal blocks; every second block is attenuated by a
    /// random gain in `[max_db, 0]` dB.
    FenceDistortion { mask_number: usize, max_db: f32 },
    /// `mask_number` randomly placed segments, each attenuated by a random
    /// gain in `[max_db, 0]` dB.
    JagDistortion { mask_number: usize, max_db: f32 },
    /// Peak-relative compression: magnitudes above `m` become
    /// `m + a * (|u| - m)^n`.
    PolyDistortion { a: f32, m: f32, n: f32 },
    NoneDistortion,
}

/// One entry of the distortion partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistortionMethod {
    #[serde(flatten)]
    pub kind: DistortionKind,
    /// Probability mass of this method within the partition.
    pub method_rate: f32,
    /// Per-sample probability of applying the transform.
    #[serde(default = "default_point_rate")]
    pub point_rate: f32,
}

fn default_point_rate() -> f32 {
    1.0
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WavDistortionConfig {
    /// Probability that an utterance is distorted at all.
    pub wav_distortion_rate: f32,
    /// Ordered partition; rates are expected to sum to at most 1.
    pub distortion_methods: Vec<DistortionMethod>,
}

impl WavDistortionConfig {
    /// Possibly distort `samples` in place, returning the method that fired.
    pub fn maybe_distort<R: Rng + ?Sized>(
        &self,
        samples: &mut [f32],
        rng: &mut R,
    ) -> Option<&DistortionMethod> {
        if self.wav_distortion_rate <= 0.0 {
            return None;
        }
        if rng.random::<f32>() >= self.wav_distortion_rate {
            return None;
        }
        let draw = rng.random::<f32>();
        let method = select_method(&self.distortion_methods, draw)?;
        method.kind.apply(samples, method.point_rate, rng);
        Some(method)
    }
}

/// First method whose cumulative rate exceeds `draw`.
///
/// Draws past the partition's total select nothing; rates are not normalized.
pub fn select_method(methods: &[DistortionMethod], draw: f32) -> Option<&DistortionMethod> {
    let mut acc = 0.0_f32;
    methods.iter().find(|method| {
        acc += method.method_rate;
        draw < acc
    })
}

impl DistortionKind {
    /// Apply this distortion in place.
    pub fn apply<R: Rng + ?Sized>(&self, samples: &mut [f32], point_rate: f32, rng: &mut R) {
        if samples.is_empty() {
            return;
        }
        match *self {
            Self::GainDb { db } => {
                let gain = db_to_amp(db);
                distort(samples, point_rate, rng, |_, x| x * gain);
            }
            Self::MaxDistortion { max_db } => {
                let limit = peak(samples) * db_to_amp(max_db);
                distort(samples, point_rate, rng, |_, x| x.clamp(-limit, limit));
            }
            Self::FenceDistortion {
                mask_number,
                max_db,
            } => {
                let mask = fence_mask(samples.len(), mask_number, max_db, rng);
                distort(samples, point_rate, rng, |i, x| x * mask[i]);
            }
            Self::JagDistortion {
                mask_number,
                max_db,
            } => {
                let mask = jag_mask(samples.len(), mask_number, max_db, rng);
                distort(samples, point_rate, rng, |i, x| x * mask[i]);
            }
            Self::PolyDistortion { a, m, n } => {
                let peak = peak(samples);
                if peak <= 0.0 {
                    return;
                }
                distort(samples, point_rate, rng, |_, x| {
                    let u = (x / peak).abs();
                    if u <= m {
                        x
                    } else {
                        x.signum() * peak * (m + a * (u - m).powf(n))
                    }
                });
            }
            Self::NoneDistortion => {}
        }
    }
}

fn distort<R, F>(samples: &mut [f32], point_rate: f32, rng: &mut R, f: F)
where
    R: Rng + ?Sized,
    F: Fn(usize, f32) -> f32,
{
    for (i, sample) in samples.iter_mut().enumerate() {
        if rng.random::<f32>() < point_rate {
            *sample = f(i, *sample);
        }
    }
}

fn fence_mask<R: Rng + ?Sized>(len: usize, mask_number: usize, max_db: f32, rng: &mut R) -> Vec<f32> {
    let mut mask = vec![1.0_f32; len];
    let blocks = mask_number.max(1) * 2;
    let block_len = len.div_ceil(blocks).max(1);
    for (idx, block) in mask.chunks_mut(block_len).enumerate() {
        if idx % 2 == 1 {
            block.fill(random_attenuation(rng, max_db));
        }
    }
    mask
}

fn jag_mask<R: Rng + ?Sized>(len: usize, mask_number: usize, max_db: f32, rng: &mut R) -> Vec<f32> {
    let mut mask = vec![1.0_f32; len];
    let max_segment = (len / mask_number.max(1)).max(1);
    for _ in 0..mask_number {
        let start = rng.random_range(0..len);
        let end = (start + rng.random_range(1..=max_segment)).min(len);
        mask[start..end].fill(random_attenuation(rng, max_db));
    }
    mask
}

fn random_attenuation<R: Rng + ?Sized>(rng: &mut R, max_db: f32) -> f32 {
    let floor = max_db.min(0.0);
    if floor == 0.0 {
        return 1.0;
    }
    db_to_amp(rng.random_range(floor..=0.0))
}

fn peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0_f32, |acc, v| acc.max(v.abs()))
}

fn db_to_amp(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn method(kind: DistortionKind, method_rate: f32) -> DistortionMethod {
        DistortionMethod {
            kind,
            method_rate,
            point_rate: 1.0,
        }
    }

    fn ramp(len: usize) -> Vec<f32> {
        (0..len).map(|i| (i as f32 - len as f32 / 2.0) * 100.0).collect()
    }

    #[test]
    fn cumulative_scan_picks_first_covering_method() {
        let methods = vec![
            method(DistortionKind::GainDb { db: -6.0 }, 0.5),
            method(DistortionKind::MaxDistortion { max_db: -3.0 }, 0.25),
            method(DistortionKind::NoneDistortion, 0.25),
        ];
        assert_eq!(select_method(&methods, 0.0).unwrap().kind, methods[0].kind);
        assert_eq!(select_method(&methods, 0.49).unwrap().kind, methods[0].kind);
        assert_eq!(select_method(&methods, 0.5).unwrap().kind, methods[1].kind);
        assert_eq!(select_method(&methods, 0.99).unwrap().kind, methods[2].kind);
    }

    #[test]
    fn residual_mass_passes_through() {
        let methods = vec![method(DistortionKind::GainDb { db: 6.0 }, 0.3)];
        assert!(select_method(&methods, 0.3).is_none());
        assert!(select_method(&methods, 0.9).is_none());
    }

    #[test]
    fn zero_rate_never_distorts() {
        let config = WavDistortionConfig {
            wav_distortion_rate: 0.0,
            distortion_methods: vec![method(DistortionKind::GainDb { db: 20.0 }, 1.0)],
        };
        let mut rng = StdRng::seed_from_u64(1);
        let mut samples = ramp(64);
        let original = samples.clone();
        assert!(config.maybe_distort(&mut samples, &mut rng).is_none());
        assert_eq!(samples, original);
    }

    #[test]
    fn full_rate_applies_selected_method() {
        let config = WavDistortionConfig {
            wav_distortion_rate: 1.0,
            distortion_methods: vec![method(DistortionKind::GainDb { db: 20.0 }, 1.0)],
        };
        let mut rng = StdRng::seed_from_u64(2);
        let mut samples = vec![1.0_f32, -2.0, 0.5];
        let fired = config.maybe_distort(&mut samples, &mut rng).unwrap();
        assert_eq!(fired.kind, DistortionKind::GainDb { db: 20.0 });
        assert!((samples[0] - 10.0).abs() < 1e-4);
        assert!((samples[1] + 20.0).abs() < 1e-4);
    }

    #[test]
    fn max_distortion_clips_relative_to_peak() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut samples = vec![1000.0_f32, -1000.0, 100.0];
        DistortionKind::MaxDistortion { max_db: -6.0 }.apply(&mut samples, 1.0, &mut rng);
        let limit = 1000.0 * db_to_amp(-6.0);
        assert!((samples[0] - limit).abs() < 1e-3);
        assert!((samples[1] + limit).abs() < 1e-3);
        assert_eq!(samples[2], 100.0);
    }

    #[test]
    fn masks_only_attenuate() {
        let mut rng = StdRng::seed_from_u64(4);
        let original = ramp(400);
        for kind in [
            DistortionKind::FenceDistortion {
                mask_number: 3,
                max_db: -20.0,
            },
            DistortionKind::JagDistortion {
                mask_number: 4,
                max_db: -40.0,
            },
        ] {
            let mut samples = original.clone();
            kind.apply(&mut samples, 1.0, &mut rng);
            assert_eq!(samples.len(), original.len());
            for (y, x) in samples.iter().zip(&original) {
                assert!(y.abs() <= x.abs() + 1e-3);
            }
        }
    }

    #[test]
    fn poly_leaves_quiet_samples_alone() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut samples = vec![100.0_f32, 10.0, -100.0];
        DistortionKind::PolyDistortion {
            a: 0.5,
            m: 0.5,
            n: 2.0,
        }
        .apply(&mut samples, 1.0, &mut rng);
        assert_eq!(samples[1], 10.0);
        assert!((samples[0] - 62.5).abs() < 1e-3);
        assert!((samples[2] + 62.5).abs() < 1e-3);
    }

    #[test]
    fn zero_point_rate_is_identity() {
        let mut rng = StdRng::seed_from_u64(6);
        let original = ramp(32);
        let mut samples = original.clone();
        DistortionKind::GainDb { db: 12.0 }.apply(&mut samples, 0.0, &mut rng);
        assert_eq!(samples, original);
    }
}

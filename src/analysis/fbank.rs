//! Kaldi-compatible log-mel filterbank.
//!
//! Framing follows Kaldi's `snip_edges` convention: only frames that fit
//! entirely inside the waveform are emitted. Dither and energy floor are
//! both zero; feature-level dither is applied later by the augmentation chain.

use std::f32::consts::PI;

use ndarray::Array2;
use rustfft::{FftPlanner, num_complex::Complex32};
use serde::{Deserialize, Serialize};

use super::audio_decode::Waveform;

/// Time frames × feature dimension.
pub type FeatureMatrix = Array2<f32>;

const PREEMPHASIS_COEFF: f32 = 0.97;
const POVEY_EXPONENT: f32 = 0.85;
const LOW_FREQ_HZ: f32 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FbankConfig {
    /// Number of mel filters (output columns).
    pub mel_bins: usize,
    /// Frame length in milliseconds.
    pub frame_length: f32,
    /// Frame shift in milliseconds.
    pub frame_shift: f32,
}

impl Default for FbankConfig {
    fn default() -> Self {
        Self {
            mel_bins: 80,
            frame_length: 25.0,
            frame_shift: 10.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FeatureError {
    #[error("mel_bins must be greater than zero")]
    NoMelBins,
    #[error("Frame of {frame_length}ms / shift {frame_shift}ms is empty at {sample_rate}Hz")]
    InvalidFraming {
        frame_length: f32,
        frame_shift: f32,
        sample_rate: u32,
    },
}

/// Acoustic feature function applied to each decoded utterance.
pub trait FeatureComputer: Send + Sync {
    fn compute(
        &self,
        waveform: &Waveform,
        config: &FbankConfig,
    ) -> Result<FeatureMatrix, FeatureError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct KaldiFbank;

impl FeatureComputer for KaldiFbank {
    fn compute(
        &self,
        waveform: &Waveform,
        config: &FbankConfig,
    ) -> Result<FeatureMatrix, FeatureError> {
        if config.mel_bins == 0 {
            return Err(FeatureError::NoMelBins);
        }
        let sample_rate = waveform.sample_rate.max(1);
        let window_len = (f64::from(sample_rate) * f64::from(config.frame_length) * 0.001) as usize;
        let shift = (f64::from(sample_rate) * f64::from(config.frame_shift) * 0.001) as usize;
        if window_len == 0 || shift == 0 {
            return Err(FeatureError::InvalidFraming {
                frame_length: config.frame_length,
                frame_shift: config.frame_shift,
                sample_rate,
            });
        }

        let samples = &waveform.samples;
        let num_frames = if samples.len() < window_len {
            0
        } else {
            1 + (samples.len() - window_len) / shift
        };
        let mut out = Array2::<f32>::zeros((num_frames, config.mel_bins));
        if num_frames == 0 {
            return Ok(out);
        }

        let fft_len = window_len.next_power_of_two();
        let fft = FftPlanner::<f32>::new().plan_fft_forward(fft_len);
        let window = povey_window(window_len);
        let bank = MelBank::new(sample_rate, fft_len, config.mel_bins);
        let mut frame = vec![0.0_f32; window_len];
        let mut buf = vec![Complex32::default(); fft_len];
        let mut power = vec![0.0_f32; fft_len / 2];

        for (idx, mut row) in out.rows_mut().into_iter().enumerate() {
            let start = idx * shift;
            frame.copy_from_slice(&samples[start..start + window_len]);
            remove_dc_offset(&mut frame);
            preemphasize(&mut frame, PREEMPHASIS_COEFF);
            buf.fill(Complex32::default());
            for ((dst, &x), &w) in buf.iter_mut().zip(&frame).zip(&window) {
                dst.re = x * w;
            }
            fft.process(&mut buf);
            for (p, c) in power.iter_mut().zip(&buf) {
                *p = c.norm_sqr();
            }
            for (dst, energy) in row.iter_mut().zip(bank.energies(&power)) {
                *dst = energy.max(f32::EPSILON).ln();
            }
        }
        Ok(out)
    }
}

fn remove_dc_offset(frame: &mut [f32]) {
    let mean = frame.iter().sum::<f32>() / frame.len().max(1) as f32;
    for v in frame.iter_mut() {
        *v -= mean;
    }
}

fn preemphasize(frame: &mut [f32], coeff: f32) {
    for i in (1..frame.len()).rev() {
        frame[i] -= coeff * frame[i - 1];
    }
    if let Some(first) = frame.first_mut() {
        *first -= coeff * *first;
    }
}

pub(crate) fn povey_window(length: usize) -> Vec<f32> {
    if length <= 1 {
        return vec![1.0_f32; length.max(1)];
    }
    let denom = (length - 1) as f32;
    (0..length)
        .map(|n| {
            (0.5 - 0.5 * (2.0 * PI * n as f32 / denom).cos())
                .max(0.0)
                .powf(POVEY_EXPONENT)
        })
        .collect()
}

/// Triangular filters spaced evenly on the mel scale between 20Hz and Nyquist.
struct MelBank {
    filters: Vec<Vec<(usize, f32)>>,
}

impl MelBank {
    fn new(sample_rate: u32, fft_len: usize, mel_bins: usize) -> Self {
        let num_fft_bins = fft_len / 2;
        let bin_width_hz = sample_rate as f32 / fft_len as f32;
        let mel_low = hz_to_mel(LOW_FREQ_HZ);
        let mel_high = hz_to_mel(sample_rate as f32 * 0.5);
        let mel_delta = (mel_high - mel_low) / (mel_bins + 1) as f32;

        let filters = (0..mel_bins)
            .map(|m| {
                let left = mel_low + m as f32 * mel_delta;
                let center = left + mel_delta;
                let right = center + mel_delta;
                (0..num_fft_bins)
                    .filter_map(|bin| {
                        let mel = hz_to_mel(bin_width_hz * bin as f32);
                        if mel <= left || mel >= right {
                            return None;
                        }
                        let weight = if mel <= center {
                            (mel - left) / (center - left)
                        } else {
                            (right - mel) / (right - center)
                        };
                        Some((bin, weight))
                    })
                    .collect()
            })
            .collect();
        Self { filters }
    }

    fn energies<'a>(&'a self, power: &'a [f32]) -> impl Iterator<Item = f32> + 'a {
        self.filters.iter().map(move |filter| {
            filter
                .iter()
                .map(|&(bin, weight)| power.get(bin).copied().unwrap_or(0.0) * weight)
                .sum::<f32>()
        })
    }
}

fn hz_to_mel(hz: f32) -> f32 {
    1127.0_f32 * (1.0 + hz / 700.0).ln()
}

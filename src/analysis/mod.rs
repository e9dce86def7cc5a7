//! Signal-level processing: decoding, waveform distortion and fbank features.

pub mod audio_decode;
pub mod distortion;
pub mod fbank;

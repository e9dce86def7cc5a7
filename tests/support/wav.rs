use std::f32::consts::TAU;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

pub const SAMPLE_RATE: u32 = 16_000;

/// Write a mono 16-bit WAV holding a quiet sine of `seconds` length.
pub fn write_tone_wav(path: &Path, seconds: f32, freq: f32) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create wav parent dirs");
    }
    let mut writer = hound::WavWriter::create(path, spec).expect("create wav writer");
    let count = (seconds * SAMPLE_RATE as f32).round() as usize;
    for n in 0..count {
        let value = 0.25 * (TAU * freq * n as f32 / SAMPLE_RATE as f32).sin();
        writer
            .write_sample((value * i16::MAX as f32) as i16)
            .expect("write wav sample");
    }
    writer.finalize().expect("finalize wav");
}

/// One manifest entry; `seconds` goes into `feat_shape`.
pub struct Entry<'a> {
    pub key: &'a str,
    pub path: PathBuf,
    pub seconds: f32,
    pub token_ids: &'a [i32],
}

/// Write a seven-field manifest for `entries` with vocabulary size `vocab`.
pub fn write_manifest(path: &Path, entries: &[Entry<'_>], vocab: usize) {
    let mut text = String::new();
    for entry in entries {
        let ids: Vec<String> = entry.token_ids.iter().map(i32::to_string).collect();
        writeln!(
            text,
            "utt:{}\tfeat:{}\tfeat_shape:{}\ttext:x\ttoken:x\ttokenid:{}\ttoken_shape:{},{}",
            entry.key,
            entry.path.display(),
            entry.seconds,
            ids.join(" "),
            ids.len(),
            vocab
        )
        .expect("format manifest line");
    }
    std::fs::write(path, text).expect("write manifest");
}

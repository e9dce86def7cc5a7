use std::fs::File;
use std::path::{Path, PathBuf};

use symphonia::core::{
    audio::SampleBuffer, codecs::DecoderOptions, errors::Error, formats::FormatOptions,
    io::MediaSourceStream, meta::MetadataOptions, probe::Hint,
};

/// Scale applied to normalized samples so features see 16-bit PCM magnitudes.
pub const PCM16_SCALE: f32 = 32_768.0;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Symphonia failed for {path}: {source}")]
    Symphonia { path: PathBuf, source: Error },
    #[error("No default track for {0}")]
    NoTrack(PathBuf),
    #[error("Missing {what} for {path}")]
    MissingParam { path: PathBuf, what: &'static str },
    #[error("Decoded 0 samples for {0}")]
    Empty(PathBuf),
}

/// Mono waveform in 16-bit sample scale.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Source of decoded waveforms for manifest audio paths.
pub trait WaveformLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Waveform, DecodeError>;
}

/// Decodes any container symphonia was built with; keeps the first channel.
#[derive(Debug, Clone, Copy, Default)]
pub struct SymphoniaLoader;

impl WaveformLoader for SymphoniaLoader {
    fn load(&self, path: &Path) -> Result<Waveform, DecodeError> {
        let (samples, sample_rate, channels) = decode_with_symphonia(path)?;
        let samples = samples
            .iter()
            .step_by(channels.max(1) as usize)
            .map(|sample| sample * PCM16_SCALE)
            .collect();
        Ok(Waveform {
            samples,
            sample_rate: sample_rate.max(1),
        })
    }
}

fn decode_with_symphonia(path: &Path) -> Result<(Vec<f32>, u32, u16), DecodeError> {
    let symphonia_err = |source: Error| DecodeError::Symphonia {
        path: path.to_path_buf(),
        source,
    };
    let missing = |what: &'static str| DecodeError::MissingParam {
        path: path.to_path_buf(),
        what,
    };

    let file = File::open(path).map_err(|source| DecodeError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());
    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(symphonia_err)?;
    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| DecodeError::NoTrack(path.to_path_buf()))?;
    let codec_params = &track.codec_params;
    let sample_rate = codec_params
        .sample_rate
        .ok_or_else(|| missing("sample rate"))?;
    let channels = codec_params
        .channels
        .ok_or_else(|| missing("channel count"))?
        .count() as u16;

    let mut decoder = symphonia::default::get_codecs()
        .make(codec_params, &DecoderOptions::default())
        .map_err(symphonia_err)?;

    let mut samples = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(Error::IoError(_)) => break,
            Err(err) => return Err(symphonia_err(err)),
        };
        let audio_buf = match decoder.decode(&packet) {
            Ok(audio_buf) => audio_buf,
            Err(Error::DecodeError(_)) => continue,
            Err(err) => return Err(symphonia_err(err)),
        };
        let spec = *audio_buf.spec();
        let mut sample_buf = SampleBuffer::<f32>::new(audio_buf.capacity() as u64, spec);
        sample_buf.copy_interleaved_ref(audio_buf);
        samples.extend_from_slice(sample_buf.samples());
    }

    if samples.is_empty() {
        return Err(DecodeError::Empty(path.to_path_buf()));
    }

    Ok((samples, sample_rate, channels))
}

//! Parser for the tab-separated utterance manifest.
//!
//! Every line carries seven `name:value` fields in a fixed order:
//! `utt`, `feat`, `feat_shape`, `text`, `token`, `tokenid`, `token_shape`.
//! Lines with any other field count are skipped.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use thiserror::Error;

const FIELD_COUNT: usize = 7;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Failed to open manifest {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to read manifest line {line}: {source}")]
    Read {
        line: usize,
        source: std::io::Error,
    },
    #[error("Invalid {field} on manifest line {line}: {value:?}")]
    InvalidField {
        line: usize,
        field: &'static str,
        value: String,
    },
}

/// One parsed manifest entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UtteranceRecord {
    /// Utterance identifier.
    pub key: String,
    /// Path to the audio file (may itself contain `:`).
    pub audio_path: String,
    /// Duration in milliseconds, rounded from the seconds value in `feat_shape`.
    /// Negative values are kept here and removed by the planner's length filter.
    pub duration_ms: i64,
    /// Target token ids.
    pub label_token_ids: Vec<i32>,
}

/// Records in file order plus the dataset-level vocabulary size.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    pub records: Vec<UtteranceRecord>,
    /// Second component of `token_shape`; the last parsed line wins.
    pub vocab_size: Option<usize>,
}

/// Load and parse a manifest file.
pub fn load_manifest(path: &Path) -> Result<Manifest, ManifestError> {
    let file = File::open(path).map_err(|source| ManifestError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    parse_manifest(BufReader::new(file))
}

/// Parse manifest lines from any buffered reader.
pub fn parse_manifest<R: BufRead>(reader: R) -> Result<Manifest, ManifestError> {
    let mut manifest = Manifest::default();
    for (idx, line) in reader.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.map_err(|source| ManifestError::Read {
            line: line_no,
            source,
        })?;
        let fields: Vec<&str> = line.trim().split('\t').collect();
        if fields.len() != FIELD_COUNT {
            continue;
        }
        let (record, vocab_size) = parse_fields(&fields, line_no)?;
        manifest.records.push(record);
        manifest.vocab_size = Some(vocab_size);
    }
    Ok(manifest)
}

fn parse_fields(
    fields: &[&str],
    line: usize,
) -> Result<(UtteranceRecord, usize), ManifestError> {
    let invalid = |field: &'static str, value: &str| ManifestError::InvalidField {
        line,
        field,
        value: value.to_string(),
    };

    let key = field_value(fields[0]).to_string();
    let audio_path = fields[1]
        .split_once(':')
        .map(|(_, rest)| rest)
        .unwrap_or_default()
        .to_string();

    let shape = field_value(fields[2]);
    let seconds = shape
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|secs| secs.is_finite())
        .ok_or_else(|| invalid("feat_shape", shape))?;
    let duration_ms = (seconds * 1000.0).round() as i64;

    let token_ids = field_value(fields[5]);
    let label_token_ids = token_ids
        .split_whitespace()
        .map(|id| id.parse::<i32>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| invalid("tokenid", token_ids))?;

    let token_shape = field_value(fields[6]);
    let vocab_size = token_shape
        .split(',')
        .nth(1)
        .and_then(|dim| dim.trim().parse::<usize>().ok())
        .ok_or_else(|| invalid("token_shape", token_shape))?;

    Ok((
        UtteranceRecord {
            key,
            audio_path,
            duration_ms,
            label_token_ids,
        },
        vocab_size,
    ))
}

/// Text between the first and second `:` of a `name:value` field.
fn field_value(field: &str) -> &str {
    field.split(':').nth(1).unwrap_or_default()
}

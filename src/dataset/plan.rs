//! Duration-aware batch planning.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::manifest::UtteranceRecord;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("Dynamic batching requires max_frames_in_batch > 0")]
    InvalidMaxFrames,
    #[error("Static batching requires batch_size > 0")]
    InvalidBatchSize,
}

/// Batch sizing policy name as it appears in configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchType {
    #[default]
    Static,
    Dynamic,
}

/// Validated batch sizing policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchPolicy {
    /// Fixed number of utterances per batch.
    Static { batch_size: usize },
    /// Greedy fill until the summed duration (ms) would exceed the limit.
    Dynamic { max_frames_in_batch: u64 },
}

impl BatchPolicy {
    pub fn new(
        batch_type: BatchType,
        batch_size: usize,
        max_frames_in_batch: u64,
    ) -> Result<Self, PlanError> {
        match batch_type {
            BatchType::Static if batch_size == 0 => Err(PlanError::InvalidBatchSize),
            BatchType::Static => Ok(Self::Static { batch_size }),
            BatchType::Dynamic if max_frames_in_batch == 0 => Err(PlanError::InvalidMaxFrames),
            BatchType::Dynamic => Ok(Self::Dynamic {
                max_frames_in_batch,
            }),
        }
    }
}

/// Planning parameters applied once at dataset construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanOptions {
    pub max_length_ms: u64,
    pub min_length_ms: u64,
    pub sort: bool,
    pub policy: BatchPolicy,
}

/// Planned utterance with its duration stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedUtterance {
    pub key: String,
    pub audio_path: String,
    pub label_token_ids: Vec<i32>,
}

impl From<UtteranceRecord> for PlannedUtterance {
    fn from(record: UtteranceRecord) -> Self {
        Self {
            key: record.key,
            audio_path: record.audio_path,
            label_token_ids: record.label_token_ids,
        }
    }
}

/// Immutable, indexable list of batches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchPlan {
    batches: Vec<Vec<PlannedUtterance>>,
}

impl BatchPlan {
    /// Sort, filter and partition `records` into batches.
    pub fn build(mut records: Vec<UtteranceRecord>, options: &PlanOptions) -> Self {
        if options.sort {
            records.sort_by_key(|record| record.duration_ms);
        }
        let total = records.len();
        records.retain(|record| {
            let Ok(duration_ms) = u64::try_from(record.duration_ms) else {
                tracing::debug!(
                    "Dropping {}: negative duration {}ms",
                    record.key,
                    record.duration_ms
                );
                return false;
            };
            (options.min_length_ms..=options.max_length_ms).contains(&duration_ms)
        });
        let batches = match options.policy {
            BatchPolicy::Static { batch_size } => partition_static(records, batch_size),
            BatchPolicy::Dynamic {
                max_frames_in_batch,
            } => partition_dynamic(records, max_frames_in_batch),
        };
        let plan = Self { batches };
        tracing::debug!(
            "Planned {} batches from {} utterances ({} filtered out)",
            plan.len(),
            plan.num_utterances(),
            total - plan.num_utterances()
        );
        plan
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&[PlannedUtterance]> {
        self.batches.get(idx).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = &[PlannedUtterance]> {
        self.batches.iter().map(Vec::as_slice)
    }

    /// Total utterances across all batches.
    pub fn num_utterances(&self) -> usize {
        self.batches.iter().map(Vec::len).sum()
    }
}

fn partition_static(records: Vec<UtteranceRecord>, batch_size: usize) -> Vec<Vec<PlannedUtterance>> {
    let mut batches = Vec::with_capacity(records.len().div_ceil(batch_size));
    let mut current = Vec::with_capacity(batch_size);
    for record in records {
        current.push(PlannedUtterance::from(record));
        if current.len() == batch_size {
            batches.push(std::mem::replace(
                &mut current,
                Vec::with_capacity(batch_size),
            ));
        }
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

fn partition_dynamic(
    records: Vec<UtteranceRecord>,
    max_frames_in_batch: u64,
) -> Vec<Vec<PlannedUtterance>> {
    let mut batches = Vec::new();
    let mut current: Vec<PlannedUtterance> = Vec::new();
    let mut frames_in_batch = 0u64;
    for record in records {
        let length = u64::try_from(record.duration_ms).unwrap_or(0);
        if !current.is_empty() && frames_in_batch.saturating_add(length) > max_frames_in_batch {
            batches.push(std::mem::take(&mut current));
            frames_in_batch = 0;
        }
        frames_in_batch = frames_in_batch.saturating_add(length);
        current.push(record.into());
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(key: &str, duration_ms: i64) -> UtteranceRecord {
        UtteranceRecord {
            key: key.to_string(),
            audio_path: format!("{key}.wav"),
            duration_ms,
            label_token_ids: vec![1],
        }
    }

    fn options(policy: BatchPolicy) -> PlanOptions {
        PlanOptions {
            max_length_ms: 10_240,
            min_length_ms: 0,
            sort: true,
            policy,
        }
    }

    fn keys(plan: &BatchPlan) -> Vec<Vec<String>> {
        plan.iter()
            .map(|batch| batch.iter().map(|utt| utt.key.clone()).collect())
            .collect()
    }

    #[test]
    fn static_batches_are_full_except_last() {
        let records = (0..7).map(|i| record(&format!("u{i}"), 1000 + i)).collect();
        let plan = BatchPlan::build(records, &options(BatchPolicy::Static { batch_size: 3 }));
        let sizes: Vec<usize> = plan.iter().map(<[_]>::len).collect();
        assert_eq!(sizes, vec![3, 3, 1]);
        assert_eq!(plan.num_utterances(), 7);
    }

    #[test]
    fn sort_is_stable_and_ascending() {
        let records = vec![
            record("c", 3000),
            record("a1", 1000),
            record("b", 2000),
            record("a2", 1000),
        ];
        let plan = BatchPlan::build(records, &options(BatchPolicy::Static { batch_size: 10 }));
        assert_eq!(keys(&plan), vec![vec!["a1", "a2", "b", "c"]]);
    }

    #[test]
    fn unsorted_plan_keeps_file_order() {
        let records = vec![record("c", 3000), record("a", 1000)];
        let mut opts = options(BatchPolicy::Static { batch_size: 1 });
        opts.sort = false;
        let plan = BatchPlan::build(records, &opts);
        assert_eq!(keys(&plan), vec![vec!["c"], vec!["a"]]);
    }

    #[test]
    fn filter_drops_out_of_range_durations() {
        let records = vec![
            record("short", 99),
            record("lo", 100),
            record("hi", 500),
            record("long", 501),
        ];
        let mut opts = options(BatchPolicy::Static { batch_size: 10 });
        opts.min_length_ms = 100;
        opts.max_length_ms = 500;
        let plan = BatchPlan::build(records, &opts);
        assert_eq!(keys(&plan), vec![vec!["lo", "hi"]]);
    }

    #[test]
    fn dynamic_splits_long_record_into_singleton() {
        let records = vec![record("a", 1000), record("b", 5000)];
        let plan = BatchPlan::build(
            records,
            &options(BatchPolicy::Dynamic {
                max_frames_in_batch: 4000,
            }),
        );
        assert_eq!(keys(&plan), vec![vec!["a"], vec!["b"]]);
    }

    #[test]
    fn dynamic_running_sum_restarts_at_splitting_record() {
        let records = vec![
            record("a", 1500),
            record("b", 1500),
            record("c", 1500),
            record("d", 1500),
            record("e", 1500),
        ];
        let plan = BatchPlan::build(
            records,
            &options(BatchPolicy::Dynamic {
                max_frames_in_batch: 3000,
            }),
        );
        assert_eq!(keys(&plan), vec![vec!["a", "b"], vec!["c", "d"], vec!["e"]]);
    }

    #[test]
    fn dynamic_oversized_first_record_does_not_emit_empty_batch() {
        let records = vec![record("big", 9000), record("x", 100), record("y", 100)];
        let mut opts = options(BatchPolicy::Dynamic {
            max_frames_in_batch: 4000,
        });
        opts.sort = false;
        let plan = BatchPlan::build(records, &opts);
        assert_eq!(keys(&plan), vec![vec!["big"], vec!["x", "y"]]);
        assert!(plan.iter().all(|batch| !batch.is_empty()));
    }

    #[test]
    fn dynamic_batches_respect_limit_before_last_addition() {
        let durations = [300, 900, 1200, 400, 2500, 700, 100, 3900, 50];
        let records = durations
            .iter()
            .enumerate()
            .map(|(i, d)| record(&format!("u{i}"), *d))
            .collect();
        let limit = 2000;
        let plan = BatchPlan::build(
            records,
            &options(BatchPolicy::Dynamic {
                max_frames_in_batch: limit,
            }),
        );
        let mut sorted = durations.to_vec();
        sorted.sort();
        let mut cursor = 0;
        for batch in plan.iter() {
            let lengths = &sorted[cursor..cursor + batch.len()];
            cursor += batch.len();
            if lengths.len() > 1 {
                assert!(lengths.iter().sum::<i64>() <= limit as i64);
            }
        }
        assert_eq!(cursor, durations.len());
    }

    #[test]
    fn policy_validation_rejects_zero_limits() {
        assert_eq!(
            BatchPolicy::new(BatchType::Dynamic, 1, 0),
            Err(PlanError::InvalidMaxFrames)
        );
        assert_eq!(
            BatchPolicy::new(BatchType::Static, 0, 0),
            Err(PlanError::InvalidBatchSize)
        );
        assert_eq!(
            BatchPolicy::new(BatchType::Dynamic, 0, 10),
            Ok(BatchPolicy::Dynamic {
                max_frames_in_batch: 10
            })
        );
    }

    #[test]
    fn negative_duration_is_filtered_and_rest_kept() {
        let records = vec![record("good", 1000), record("neg", -500), record("ok", 2000)];
        let plan = BatchPlan::build(records, &options(BatchPolicy::Static { batch_size: 10 }));
        assert_eq!(keys(&plan), vec![vec!["good", "ok"]]);
    }
}

mod support;

use support::wav::{Entry, write_manifest, write_tone_wav};
use tempfile::tempdir;
use uttfeed::config::{BatchMode, CollateConfig, DatasetConfig, LoaderConfig};
use uttfeed::dataset::plan::BatchType;
use uttfeed::{BatchLoader, CollateFunc, IGNORE_ID, UtteranceDataset};

#[test]
fn prepares_padded_batches_from_wav_files() {
    let dir = tempdir().unwrap();
    let entries = [
        ("mid", 0.5_f32, vec![3, 4, 5]),
        ("long", 1.0, vec![6]),
        ("short", 0.25, vec![7, 8]),
    ];
    let entries: Vec<Entry<'_>> = entries
        .iter()
        .map(|(key, seconds, ids)| {
            let path = dir.path().join(format!("{key}.wav"));
            write_tone_wav(&path, *seconds, 440.0);
            Entry {
                key: *key,
                path,
                seconds: *seconds,
                token_ids: ids,
            }
        })
        .collect();
    let manifest = dir.path().join("data.list");
    write_manifest(&manifest, &entries, 30);

    let config = DatasetConfig {
        batch_size: 2,
        ..DatasetConfig::default()
    };
    let dataset = UtteranceDataset::open(&manifest, &config).unwrap();
    assert_eq!(dataset.len(), 2);
    assert_eq!(dataset.output_dim(), Some(30));

    let collate = CollateFunc::new(CollateConfig::default());
    let batches = BatchLoader::new(&dataset, &collate, &LoaderConfig::default()).collect();
    assert_eq!(batches.len(), 2);

    let first = &batches[0];
    assert_eq!(first.keys, vec!["mid", "short"]);
    assert_eq!(first.xs_pad.shape(), &[2, 48, 80]);
    assert_eq!(first.xs_lengths.to_vec(), vec![48, 23]);
    assert!(first.xs_pad.iter().all(|v| v.is_finite()));
    assert!(
        first
            .xs_pad
            .slice(ndarray::s![1, 23.., ..])
            .iter()
            .all(|v| *v == 0.0)
    );
    let targets = first.targets.as_ref().unwrap();
    assert_eq!(targets.ys_lengths.to_vec(), vec![3, 2]);
    assert_eq!(targets.ys_pad.row(1).to_vec(), vec![7, 8, IGNORE_ID]);

    let second = &batches[1];
    assert_eq!(second.keys, vec!["long"]);
    assert_eq!(second.xs_pad.shape(), &[1, 98, 80]);
}

#[test]
fn undecodable_utterance_is_dropped_from_its_batch() {
    let dir = tempdir().unwrap();
    let good = dir.path().join("good.wav");
    write_tone_wav(&good, 0.5, 300.0);
    let manifest = dir.path().join("data.list");
    write_manifest(
        &manifest,
        &[
            Entry {
                key: "good",
                path: good,
                seconds: 0.5,
                token_ids: &[1, 2],
            },
            Entry {
                key: "missing",
                path: dir.path().join("missing.wav"),
                seconds: 0.6,
                token_ids: &[3],
            },
        ],
        10,
    );

    let config = DatasetConfig {
        batch_size: 2,
        ..DatasetConfig::default()
    };
    let dataset = UtteranceDataset::open(&manifest, &config).unwrap();
    assert_eq!(dataset.len(), 1);
    let collate = CollateFunc::new(CollateConfig::default());
    let batch = BatchLoader::new(&dataset, &collate, &LoaderConfig::default())
        .fetch(0)
        .unwrap();
    assert_eq!(batch.keys, vec!["good"]);
    assert_eq!(batch.xs_pad.shape()[0], 1);
    assert_eq!(batch.xs_lengths.len(), 1);
    assert_eq!(batch.targets.unwrap().ys_pad.nrows(), 1);
}

#[test]
fn batch_of_only_failures_is_empty() {
    let dir = tempdir().unwrap();
    let manifest = dir.path().join("data.list");
    write_manifest(
        &manifest,
        &[Entry {
            key: "gone",
            path: dir.path().join("gone.wav"),
            seconds: 1.0,
            token_ids: &[1],
        }],
        4,
    );
    let dataset = UtteranceDataset::open(&manifest, &DatasetConfig::default()).unwrap();
    let collate = CollateFunc::new(CollateConfig::default());
    let batch = BatchLoader::new(&dataset, &collate, &LoaderConfig::default())
        .fetch(0)
        .unwrap();
    assert!(batch.is_empty());
    assert_eq!(batch.xs_pad.shape(), &[0, 0, 0]);
}

#[test]
fn splicing_and_subsampling_shape_the_output() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("a.wav");
    write_tone_wav(&path, 1.0, 1000.0);
    let manifest = dir.path().join("data.list");
    write_manifest(
        &manifest,
        &[Entry {
            key: "a",
            path,
            seconds: 1.0,
            token_ids: &[1],
        }],
        4,
    );
    let dataset = UtteranceDataset::open(&manifest, &DatasetConfig::default()).unwrap();
    let collate = CollateFunc::new(CollateConfig {
        left_context: 2,
        right_context: 2,
        subsampling_factor: 4,
        mode: BatchMode::Inference,
        ..CollateConfig::default()
    });
    let batch = BatchLoader::new(&dataset, &collate, &LoaderConfig::default())
        .fetch(0)
        .unwrap();
    assert_eq!(batch.xs_pad.shape(), &[1, 25, 400]);
    assert_eq!(batch.xs_lengths.to_vec(), vec![25]);
    assert!(batch.targets.is_none());
}

#[test]
fn dynamic_plan_splits_on_summed_duration() {
    let dir = tempdir().unwrap();
    let manifest = dir.path().join("data.list");
    let entries: Vec<Entry<'_>> = [("a", 1.0_f32), ("b", 5.0), ("c", 2.0), ("d", 20.0)]
        .iter()
        .map(|(key, seconds)| Entry {
            key: *key,
            path: dir.path().join(format!("{key}.wav")),
            seconds: *seconds,
            token_ids: &[1],
        })
        .collect();
    write_manifest(&manifest, &entries, 4);

    let config = DatasetConfig {
        batch_type: BatchType::Dynamic,
        max_frames_in_batch: 5000,
        ..DatasetConfig::default()
    };
    let dataset = UtteranceDataset::open(&manifest, &config).unwrap();
    let keys: Vec<Vec<&str>> = dataset
        .plan()
        .iter()
        .map(|batch| batch.iter().map(|utt| utt.key.as_str()).collect())
        .collect();
    assert_eq!(keys, vec![vec!["a", "c"], vec!["b"]]);
}

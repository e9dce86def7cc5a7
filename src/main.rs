//! Plan and prepare ASR training batches from a manifest.

use std::ops::ControlFlow;
use std::path::PathBuf;

use uttfeed::config::{PipelineConfig, load_config};
use uttfeed::logging::{self, ConsoleTarget};
use uttfeed::{BatchLoader, CollateFunc, CollatedBatch, UtteranceDataset};

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

struct CliOptions {
    manifest: PathBuf,
    config: Option<PathBuf>,
    batches: Option<usize>,
    seed: Option<u64>,
    workers: Option<usize>,
    plan_only: bool,
    json: bool,
}

fn run() -> Result<(), String> {
    let options = parse_args(std::env::args().skip(1).collect())?;
    // stdout carries JSON only in --json mode.
    let console = if options.json {
        ConsoleTarget::Stderr
    } else {
        ConsoleTarget::Stdout
    };
    if let Err(err) = logging::init(console) {
        eprintln!("Logging disabled: {err}");
    }

    let mut config = match &options.config {
        Some(path) => load_config(path).map_err(|err| err.to_string())?,
        None => PipelineConfig::default(),
    };
    if let Some(seed) = options.seed {
        config.loader.seed = seed;
    }
    if let Some(workers) = options.workers {
        config.loader.num_workers = workers;
    }

    let dataset =
        UtteranceDataset::open(&options.manifest, &config.dataset).map_err(|err| err.to_string())?;
    let plan = dataset.plan();
    if options.json {
        println!(
            "{}",
            serde_json::json!({
                "batches": plan.len(),
                "utterances": plan.num_utterances(),
                "output_dim": dataset.output_dim(),
            })
        );
    } else {
        tracing::info!(
            "Planned {} utterances into {} batches (output dim {:?})",
            plan.num_utterances(),
            plan.len(),
            dataset.output_dim()
        );
    }
    if options.plan_only {
        return Ok(());
    }

    let collate = CollateFunc::new(config.collate);
    let mut loader = BatchLoader::new(&dataset, &collate, &config.loader);
    if let Some(count) = options.batches {
        loader = loader.limit(count);
    }
    let mut dropped = 0usize;
    loader.for_each(|idx, batch| {
        let planned = dataset.get(idx).map_or(0, <[_]>::len);
        dropped += planned.saturating_sub(batch.batch_size());
        report_batch(idx, &batch, options.json);
        ControlFlow::Continue(())
    });
    if dropped > 0 {
        tracing::warn!("{dropped} utterances failed to load");
    }
    Ok(())
}

fn report_batch(idx: usize, batch: &CollatedBatch, json: bool) {
    let label_len = batch.targets.as_ref().map(|t| t.ys_pad.ncols());
    if json {
        println!(
            "{}",
            serde_json::json!({
                "batch": idx,
                "keys": batch.keys,
                "xs_pad": batch.xs_pad.shape(),
                "xs_lengths": batch.xs_lengths.to_vec(),
                "ys_lengths": batch.targets.as_ref().map(|t| t.ys_lengths.to_vec()),
            })
        );
    } else {
        tracing::info!(
            "Batch {idx}: {} utterances, xs_pad {:?}, max label len {:?}",
            batch.batch_size(),
            batch.xs_pad.shape(),
            label_len
        );
    }
}

fn parse_args(args: Vec<String>) -> Result<CliOptions, String> {
    let mut manifest: Option<PathBuf> = None;
    let mut config: Option<PathBuf> = None;
    let mut batches: Option<usize> = None;
    let mut seed: Option<u64> = None;
    let mut workers: Option<usize> = None;
    let mut plan_only = false;
    let mut json = false;

    let mut idx = 0usize;
    while idx < args.len() {
        match args[idx].as_str() {
            "-h" | "--help" => return Err(help_text()),
            "--manifest" => {
                idx += 1;
                manifest = Some(PathBuf::from(value(&args, idx, "--manifest")?));
            }
            "--config" => {
                idx += 1;
                config = Some(PathBuf::from(value(&args, idx, "--config")?));
            }
            "--batches" => {
                idx += 1;
                batches = Some(parse_value(&args, idx, "--batches")?);
            }
            "--seed" => {
                idx += 1;
                seed = Some(parse_value(&args, idx, "--seed")?);
            }
            "--workers" => {
                idx += 1;
                workers = Some(parse_value(&args, idx, "--workers")?);
            }
            "--plan-only" => plan_only = true,
            "--json" => json = true,
            unknown => return Err(format!("Unknown argument: {unknown}\n\n{}", help_text())),
        }
        idx += 1;
    }

    let manifest = manifest.ok_or_else(|| format!("--manifest is required\n\n{}", help_text()))?;
    Ok(CliOptions {
        manifest,
        config,
        batches,
        seed,
        workers,
        plan_only,
        json,
    })
}

fn value<'a>(args: &'a [String], idx: usize, flag: &str) -> Result<&'a str, String> {
    args.get(idx)
        .map(String::as_str)
        .ok_or_else(|| format!("{flag} requires a value"))
}

fn parse_value<T: std::str::FromStr>(args: &[String], idx: usize, flag: &str) -> Result<T, String> {
    let raw = value(args, idx, flag)?;
    raw.parse::<T>()
        .map_err(|_| format!("Invalid {flag} value: {raw}"))
}

fn help_text() -> String {
    [
        "uttfeed",
        "",
        "Plan a manifest into batches and prepare padded fbank batches.",
        "",
        "Usage:",
        "  uttfeed --manifest <file> [--config <pipeline.toml>] [options]",
        "",
        "Options:",
        "  --batches <n>   Only prepare the first n batches.",
        "  --seed <n>      Base seed for per-batch randomness.",
        "  --workers <n>   Worker threads preparing batches.",
        "  --plan-only     Print plan statistics and exit.",
        "  --json          Emit JSON lines on stdout; logs go to stderr.",
    ]
    .join("\n")
}

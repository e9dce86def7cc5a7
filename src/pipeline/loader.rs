//! Ordered batch preparation across worker threads.
//!
//! Every batch gets its own RNG seeded from `(seed, batch index)`, so the
//! produced batches do not depend on the number of workers.

use std::collections::BTreeMap;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;

use rand::SeedableRng;
use rand::rngs::StdRng;

use super::CollateFunc;
use super::collate::CollatedBatch;
use crate::config::LoaderConfig;
use crate::dataset::UtteranceDataset;

const BATCH_SEED_MIX: u64 = 0x9E37_79B9_7F4A_7C15;

/// Deterministic per-batch RNG; neighbouring seeds do not share streams.
pub fn batch_rng(seed: u64, idx: usize) -> StdRng {
    StdRng::seed_from_u64(seed ^ (idx as u64).wrapping_mul(BATCH_SEED_MIX))
}

pub struct BatchLoader<'a> {
    dataset: &'a UtteranceDataset,
    collate: &'a CollateFunc,
    num_workers: usize,
    seed: u64,
    limit: Option<usize>,
}

impl<'a> BatchLoader<'a> {
    pub fn new(dataset: &'a UtteranceDataset, collate: &'a CollateFunc, config: &LoaderConfig) -> Self {
        Self {
            dataset,
            collate,
            num_workers: config.num_workers.max(1),
            seed: config.seed,
            limit: None,
        }
    }

    /// Stop after the first `count` batches of the plan.
    pub fn limit(mut self, count: usize) -> Self {
        self.limit = Some(count);
        self
    }

    pub fn len(&self) -> usize {
        self.limit
            .map_or(self.dataset.len(), |count| count.min(self.dataset.len()))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Prepare batch `idx` on the calling thread.
    pub fn fetch(&self, idx: usize) -> Option<CollatedBatch> {
        let batch = self.dataset.get(idx)?;
        Some(self.collate.collate(batch, &mut batch_rng(self.seed, idx)))
    }

    /// Deliver batches in plan order until exhausted or `on_batch` breaks.
    ///
    /// Returns the number of batches delivered.
    pub fn for_each<F>(&self, mut on_batch: F) -> usize
    where
        F: FnMut(usize, CollatedBatch) -> ControlFlow<()>,
    {
        let total = self.len();
        if self.num_workers <= 1 || total <= 1 {
            let mut delivered = 0;
            for idx in 0..total {
                let Some(batch) = self.fetch(idx) else {
                    break;
                };
                delivered += 1;
                if on_batch(idx, batch).is_break() {
                    break;
                }
            }
            return delivered;
        }

        let workers = self.num_workers.min(total);
        let next = AtomicUsize::new(0);
        thread::scope(|scope| {
            let (tx, rx) = mpsc::sync_channel::<(usize, CollatedBatch)>(workers * 2);
            for _ in 0..workers {
                let tx = tx.clone();
                let next = &next;
                scope.spawn(move || {
                    loop {
                        let idx = next.fetch_add(1, Ordering::Relaxed);
                        if idx >= total {
                            break;
                        }
                        let Some(batch) = self.fetch(idx) else {
                            break;
                        };
                        // Receiver gone: the consumer stopped early.
                        if tx.send((idx, batch)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(tx);

            let mut pending = BTreeMap::new();
            let mut expected = 0;
            let mut delivered = 0;
            for (idx, batch) in rx.iter() {
                pending.insert(idx, batch);
                while let Some(batch) = pending.remove(&expected) {
                    delivered += 1;
                    if on_batch(expected, batch).is_break() {
                        return delivered;
                    }
                    expected += 1;
                }
            }
            delivered
        })
    }

    /// Prepare every batch and return them in plan order.
    pub fn collect(&self) -> Vec<CollatedBatch> {
        let mut out = Vec::with_capacity(self.len());
        self.for_each(|_, batch| {
            out.push(batch);
            ControlFlow::Continue(())
        });
        out
    }
}

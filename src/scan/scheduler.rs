//! Scan scheduler
//!
//! Fans one scanner task out per enumerated object. Two bounds apply:
//! - `concurrency`: scans executing at once (semaphore permits held per task)
//! - `inflight_cap`: tasks submitted but not yet harvested (JoinSet length)
//!
//! Workers only return values. The JoinSet and the ResultIndex live on the
//! driving task, which is the sole writer of results, so neither needs a lock.

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};

use super::enumerator::ObjectEnumerator;
use super::scanner::{scan_object, ScanError};
use crate::backends::{ObjectStore, StoreError};
use crate::core::model::{MatchSet, ObjectHandle, ResultIndex, ScanStats, SearchKeys};

/// Default number of concurrent scans
pub const DEFAULT_CONCURRENCY: usize = 32;

/// In-flight cap as a multiple of concurrency when not set explicitly
pub const INFLIGHT_FACTOR: usize = 4;

type TaskOutput = (ObjectHandle, Result<MatchSet, ScanError>);

/// Concurrency bounds for one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerOptions {
    pub concurrency: usize,
    pub inflight_cap: usize,
}

impl SchedulerOptions {
    /// `inflight_cap` defaults to 4x `concurrency` and is always kept above it
    pub fn new(concurrency: usize, inflight_cap: Option<usize>) -> Self {
        let concurrency = concurrency.max(1);
        let inflight_cap = inflight_cap
            .unwrap_or(concurrency * INFLIGHT_FACTOR)
            .max(concurrency + 1);
        Self {
            concurrency,
            inflight_cap,
        }
    }
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self::new(DEFAULT_CONCURRENCY, None)
    }
}

/// Driving-task state: the only writer of the result index
struct Harvest<'a, F> {
    keys: &'a SearchKeys,
    index: ResultIndex,
    stats: ScanStats,
    on_match: F,
}

impl<F> Harvest<'_, F>
where
    F: FnMut(&str, &ObjectHandle),
{
    fn absorb(&mut self, joined: Result<TaskOutput, JoinError>) {
        match joined {
            Ok((handle, Ok(matched))) => {
                if matched.is_empty() {
                    tracing::debug!(object = %handle, "no match");
                    return;
                }
                self.stats.matched_objects += 1;
                for key in self.keys.iter().filter(|k| matched.contains(*k)) {
                    tracing::info!(key, object = %handle, "match");
                    (self.on_match)(key, &handle);
                }
                self.index.merge(&handle, &matched);
            }
            Ok((handle, Err(err))) => {
                self.stats.failed += 1;
                tracing::debug!(object = %handle, error = %err, "scan failed, counted as no match");
            }
            Err(err) => {
                self.stats.failed += 1;
                tracing::debug!(error = %err, "scan task aborted, counted as no match");
            }
        }
    }
}

/// Fleet-level scanner over one enumerated namespace
pub struct ScanScheduler {
    store: Arc<dyn ObjectStore>,
    keys: Arc<SearchKeys>,
    options: SchedulerOptions,
}

impl ScanScheduler {
    pub fn new(store: Arc<dyn ObjectStore>, keys: SearchKeys, options: SchedulerOptions) -> Self {
        Self {
            store,
            keys: Arc::new(keys),
            options,
        }
    }

    /// Scan every object `objects` yields and collect matches per key.
    ///
    /// Per-object failures are counted in `ScanStats::failed` and never abort
    /// the run. A listing failure does: already-submitted scans are aborted.
    pub async fn run<F>(
        &self,
        objects: &mut ObjectEnumerator,
        on_match: F,
    ) -> Result<(ResultIndex, ScanStats), StoreError>
    where
        F: FnMut(&str, &ObjectHandle),
    {
        let started = Instant::now();
        let permits = Arc::new(Semaphore::new(self.options.concurrency));
        let mut inflight: JoinSet<TaskOutput> = JoinSet::new();
        let mut harvest = Harvest {
            keys: &self.keys,
            index: ResultIndex::new(&self.keys),
            stats: ScanStats::default(),
            on_match,
        };

        while let Some(handle) = objects.next_object().await? {
            harvest.stats.scanned += 1;
            tracing::debug!(object = %handle, inflight = inflight.len(), "submitting scan");

            let store = Arc::clone(&self.store);
            let keys = Arc::clone(&self.keys);
            let permits = Arc::clone(&permits);
            inflight.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                let result = scan_object(store.as_ref(), &handle, &keys).await;
                (handle, result)
            });
            harvest.stats.peak_inflight = harvest.stats.peak_inflight.max(inflight.len());

            // Merge whatever already finished without waiting
            while let Some(joined) = inflight.try_join_next() {
                harvest.absorb(joined);
            }

            // At the cap: block until one scan resolves before submitting more
            if inflight.len() >= self.options.inflight_cap {
                if let Some(joined) = inflight.join_next().await {
                    harvest.absorb(joined);
                }
            }
        }

        while let Some(joined) = inflight.join_next().await {
            harvest.absorb(joined);
        }

        let Harvest {
            mut index,
            mut stats,
            ..
        } = harvest;
        index.finalize();
        stats.elapsed_ms = started.elapsed().as_millis() as u64;

        tracing::info!(
            scanned = stats.scanned,
            matched = stats.matched_objects,
            failed = stats.failed,
            peak_inflight = stats.peak_inflight,
            elapsed_ms = stats.elapsed_ms,
            "scan finished"
        );

        Ok((index, stats))
    }
}

//! Scan module - Streaming search over an object store
//!
//! Provides:
//! - scanner: header/trailer-excluding line scan of one object
//! - enumerator: lazy, paginated object listing with suffix filtering
//! - scheduler: bounded fan-out of scans and per-key aggregation

use std::sync::Arc;

use crate::backends::{ObjectStore, StoreError};
use crate::core::model::{InputError, ObjectHandle, ScanReport, SearchKeys};

pub mod enumerator;
pub mod scanner;
pub mod scheduler;

use enumerator::{ObjectEnumerator, DEFAULT_SUFFIX};
use scheduler::{ScanScheduler, SchedulerOptions};

/// Everything one run needs, validated up front
#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub bucket: String,
    pub prefix: String,
    pub suffix: String,
    pub keys: SearchKeys,
    pub options: SchedulerOptions,
}

impl ScanRequest {
    pub fn new(bucket: &str, prefix: &str, keys: SearchKeys) -> Result<Self, InputError> {
        let bucket = bucket.trim();
        if bucket.is_empty() {
            return Err(InputError::MissingNamespace);
        }
        if keys.is_empty() {
            return Err(InputError::NoSearchKeys);
        }
        Ok(Self {
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
            suffix: DEFAULT_SUFFIX.to_string(),
            keys,
            options: SchedulerOptions::default(),
        })
    }

    pub fn with_suffix(mut self, suffix: &str) -> Self {
        self.suffix = suffix.to_string();
        self
    }

    pub fn with_options(mut self, options: SchedulerOptions) -> Self {
        self.options = options;
        self
    }
}

/// Enumerate, scan and aggregate one namespace into a report
pub async fn run_search<F>(
    store: Arc<dyn ObjectStore>,
    request: ScanRequest,
    on_match: F,
) -> Result<ScanReport, StoreError>
where
    F: FnMut(&str, &ObjectHandle),
{
    let mut objects =
        ObjectEnumerator::new(Arc::clone(&store), &request.bucket, &request.prefix, &request.suffix);
    let prefix = objects.prefix().to_string();

    tracing::info!(
        bucket = %request.bucket,
        prefix = %prefix,
        keys = request.keys.len(),
        concurrency = request.options.concurrency,
        inflight_cap = request.options.inflight_cap,
        "starting scan"
    );

    let scheduler = ScanScheduler::new(store, request.keys, request.options);
    let (index, stats) = scheduler.run(&mut objects, on_match).await?;

    Ok(ScanReport::new(&request.bucket, &prefix, &index, stats))
}

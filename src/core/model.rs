//! Scan data model
//!
//! Search keys and the column range are fixed for a run. Object handles are
//! produced by enumeration and dropped once their result is merged. The
//! result index is grown only by the scheduler's driving task.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use thiserror::Error;

use crate::core::field::normalize_key;

/// Keys observed while scanning one object
pub type MatchSet = HashSet<String>;

/// Errors in caller-supplied input, fatal before any scanning starts
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("bucket is required")]
    MissingNamespace,

    #[error("at least one search key is required")]
    NoSearchKeys,
}

/// Normalized, deduplicated search keys in input order
#[derive(Debug, Clone, Default)]
pub struct SearchKeys {
    ordered: Vec<String>,
    set: HashSet<String>,
}

impl SearchKeys {
    /// Parse a comma and/or newline separated list
    pub fn parse(input: &str) -> Result<Self, InputError> {
        Self::from_values([input])
    }

    /// Build from several raw values, each of which may itself be a list
    pub fn from_values<I, S>(values: I) -> Result<Self, InputError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut keys = SearchKeys::default();
        for value in values {
            for part in value.as_ref().split([',', '\n']) {
                keys.insert(part);
            }
        }

        if keys.is_empty() {
            return Err(InputError::NoSearchKeys);
        }
        Ok(keys)
    }

    fn insert(&mut self, raw: &str) {
        let key = normalize_key(raw);
        if key.is_empty() {
            return;
        }
        if self.set.insert(key.clone()) {
            self.ordered.push(key);
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.set.contains(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ordered.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}

/// Reference to one remote object
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectHandle {
    namespace: String,
    path: String,
}

impl ObjectHandle {
    pub fn new(namespace: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            path: path.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

/// Search key -> matching object paths, iterated in key input order
#[derive(Debug, Clone, Default)]
pub struct ResultIndex {
    keys: Vec<String>,
    hits: HashMap<String, Vec<String>>,
}

impl ResultIndex {
    pub fn new(keys: &SearchKeys) -> Self {
        Self {
            keys: keys.iter().map(str::to_string).collect(),
            hits: keys.iter().map(|k| (k.to_string(), Vec::new())).collect(),
        }
    }

    /// Append `handle` to every key in `matched`
    pub fn merge(&mut self, handle: &ObjectHandle, matched: &MatchSet) {
        for key in matched {
            if let Some(paths) = self.hits.get_mut(key) {
                paths.push(handle.path().to_string());
            }
        }
    }

    /// Sort each key's paths so output does not depend on completion order
    pub fn finalize(&mut self) {
        for paths in self.hits.values_mut() {
            paths.sort();
        }
    }

    #[allow(dead_code)]
    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.hits.get(key).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.keys.iter().map(move |k| {
            let paths = self.hits.get(k).map(Vec::as_slice).unwrap_or(&[]);
            (k.as_str(), paths)
        })
    }

    /// Number of keys with at least one match
    #[allow(dead_code)]
    pub fn matched_keys(&self) -> usize {
        self.hits.values().filter(|p| !p.is_empty()).count()
    }
}

/// Counters collected by the scheduler
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStats {
    /// Objects submitted for scanning, including failed ones
    pub scanned: u64,

    /// Objects with at least one matching key
    pub matched_objects: u64,

    /// Objects whose scan failed and counted as no match
    pub failed: u64,

    /// Highest number of submitted-but-unresolved scans observed
    pub peak_inflight: usize,

    pub elapsed_ms: u64,
}

/// Matches for one search key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyResult {
    pub key: String,
    pub objects: Vec<String>,
}

/// Final report handed to the renderer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    pub bucket: String,
    pub prefix: String,
    pub results: Vec<KeyResult>,
    pub stats: ScanStats,
    pub generated_at: chrono::DateTime<chrono::Utc>,
}

impl ScanReport {
    pub fn new(bucket: &str, prefix: &str, index: &ResultIndex, stats: ScanStats) -> Self {
        Self {
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
            results: index
                .iter()
                .map(|(key, paths)| KeyResult {
                    key: key.to_string(),
                    objects: paths.to_vec(),
                })
                .collect(),
            stats,
            generated_at: chrono::Utc::now(),
        }
    }
}

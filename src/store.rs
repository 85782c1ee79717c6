// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Best-effort storage of raw readings.
//!
//! Samples are integers grouped into buckets and addressed by string keys.
//! Nothing in the live control path depends on a store succeeding.

use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Bucket for per-fan values (PWM, learned bounds).
pub const BUCKET_FANS: &str = "fans";

/// Bucket for raw sensor readings (temperatures, RPM).
pub const BUCKET_SENSORS: &str = "sensors";

type Buckets = HashMap<String, HashMap<String, i64>>;

/// Key/value sample storage.
pub trait SampleStore: Send + Sync {
    fn store_sample(&self, bucket: &str, key: &str, value: i64) -> Result<()>;

    fn read_sample(&self, bucket: &str, key: &str) -> Result<i64>;

    /// Persist buffered samples, if the store buffers at all.
    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

fn missing(bucket: &str, key: &str) -> Error {
    Error::Store {
        reason: format!("no sample for {bucket}/{key}"),
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// A store that lives only as long as the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    buckets: Mutex<Buckets>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SampleStore for MemoryStore {
    fn store_sample(&self, bucket: &str, key: &str, value: i64) -> Result<()> {
        self.buckets
            .lock()
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    fn read_sample(&self, bucket: &str, key: &str) -> Result<i64> {
        self.buckets
            .lock()
            .get(bucket)
            .and_then(|b| b.get(key))
            .copied()
            .ok_or_else(|| missing(bucket, key))
    }
}

// ---------------------------------------------------------------------------
// JSON file store
// ---------------------------------------------------------------------------

/// A store kept in memory and written to a JSON file on [`flush`](SampleStore::flush).
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    buckets: Mutex<Buckets>,
}

impl JsonFileStore {
    /// Open a store, loading existing samples if the file exists.
    pub fn open(path: &Path) -> Result<Self> {
        let buckets = if path.exists() {
            let contents = fs::read_to_string(path).map_err(|source| Error::Read {
                path: path.to_path_buf(),
                source,
            })?;
            serde_json::from_str(&contents)?
        } else {
            Buckets::new()
        };

        log::debug!("Opened sample store at {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            buckets: Mutex::new(buckets),
        })
    }

    /// Sibling file the store is written to before it replaces `path`.
    fn tmp_path(&self) -> PathBuf {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        PathBuf::from(tmp)
    }
}

impl SampleStore for JsonFileStore {
    fn store_sample(&self, bucket: &str, key: &str, value: i64) -> Result<()> {
        self.buckets
            .lock()
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    fn read_sample(&self, bucket: &str, key: &str) -> Result<i64> {
        self.buckets
            .lock()
            .get(bucket)
            .and_then(|b| b.get(key))
            .copied()
            .ok_or_else(|| missing(bucket, key))
    }

    fn flush(&self) -> Result<()> {
        let contents = serde_json::to_string_pretty(&*self.buckets.lock())?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::Store {
                reason: format!("cannot create {}: {e}", parent.display()),
            })?;
        }

        // a crash mid-write must not leave a half-written store behind
        let tmp = self.tmp_path();
        fs::write(&tmp, contents).map_err(|e| Error::Store {
            reason: format!("cannot write {}: {e}", tmp.display()),
        })?;
        fs::rename(&tmp, &self.path).map_err(|e| Error::Store {
            reason: format!("cannot replace {}: {e}", self.path.display()),
        })
    }
}

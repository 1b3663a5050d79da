//! Process-lifetime run statistics
//!
//! Counters are reset at the start of each orchestrated run and snapshotted
//! at the end for reporting. They are never persisted; the backup index is
//! the durable record.

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::ItemClass;

/// Per-collection breakdown of one run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CollectionStats {
    /// Items seen for this collection
    pub total: u64,
    /// Items fetched and written
    pub downloaded: u64,
    /// Items already present
    pub skipped: u64,
    /// Items that exhausted their retries
    pub failed: u64,
}

/// Aggregate counters for one orchestrated run
#[derive(Clone, Debug, Default, Serialize)]
pub struct RunStats {
    /// When the run began, if one has started
    pub started_at: Option<DateTime<Utc>>,
    /// When the run finished, if it has
    pub finished_at: Option<DateTime<Utc>>,
    /// Items seen in total
    pub total: u64,
    /// Items fetched and written
    pub downloaded: u64,
    /// Items already present
    pub skipped: u64,
    /// Items that exhausted their retries
    pub failed: u64,
    /// Per-collection breakdown, keyed by collection id
    pub collections: BTreeMap<String, CollectionStats>,
}

/// Shared recorder the pipeline reports outcomes to
///
/// Cheap to clone behind an `Arc`; the inner mutex is held only for the
/// duration of a counter bump or snapshot.
#[derive(Debug, Default)]
pub struct StatsRecorder {
    inner: Mutex<RunStats>,
}

impl StatsRecorder {
    /// Create a recorder with zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset all counters and stamp the start of a new run
    pub fn begin_run(&self) {
        let mut stats = self.lock();
        *stats = RunStats {
            started_at: Some(Utc::now()),
            ..Default::default()
        };
    }

    /// Stamp the end of the current run
    pub fn finish_run(&self) {
        self.lock().finished_at = Some(Utc::now());
    }

    /// Record one item's classification for the given collection
    pub fn record(&self, collection_id: &str, class: ItemClass) {
        let mut stats = self.lock();
        stats.total += 1;
        match class {
            ItemClass::Downloaded => stats.downloaded += 1,
            ItemClass::Skipped => stats.skipped += 1,
            ItemClass::Failed => stats.failed += 1,
        }
        let per_collection = stats
            .collections
            .entry(collection_id.to_string())
            .or_default();
        per_collection.total += 1;
        match class {
            ItemClass::Downloaded => per_collection.downloaded += 1,
            ItemClass::Skipped => per_collection.skipped += 1,
            ItemClass::Failed => per_collection.failed += 1,
        }
    }

    /// Copy out the current counters
    pub fn snapshot(&self) -> RunStats {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RunStats> {
        // A poisoned stats mutex only means a panicking task died mid-bump;
        // the counters are still usable.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

//! Core types and events for album-mirror

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Media kind recorded alongside each backed-up file
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Still image
    Photo,
    /// Video companion or standalone clip
    Video,
}

/// One remote album, rediscovered on every run and never persisted
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Album {
    /// Service-assigned album identifier
    pub id: String,
    /// Album title as entered by its owner (untrusted text)
    pub title: String,
    /// Number of items the service reports for this album
    pub item_count: usize,
}

/// One media item inside an album
///
/// `name` is the dedup key within its album once sanitized; it may contain
/// path-hostile characters and must never reach the filesystem unsanitized.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaItem {
    /// URL of the best-quality photo asset
    pub primary_url: String,
    /// URL of the paired video asset, when the item has one
    pub video_url: Option<String>,
    /// Service-assigned item name (untrusted text)
    pub name: String,
    /// Upload time reported by the service (Unix seconds)
    pub upload_time: i64,
}

/// Unit of work handed to the download pipeline; immutable once created
#[derive(Clone, Debug)]
pub struct DownloadTask {
    /// The collection the item belongs to
    pub collection_id: String,
    /// Display name of the collection, when configured
    pub collection_name: Option<String>,
    /// Title of the album the item belongs to
    pub album_title: String,
    /// Resolved album directory (also the index location)
    pub album_dir: PathBuf,
    /// The item to back up
    pub item: MediaItem,
}

/// Final classification of one item, used for run statistics
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ItemClass {
    /// At least one asset was fetched and written
    Downloaded,
    /// Every asset was already present (index or disk)
    Skipped,
    /// An asset failed after exhausting its retry budget
    Failed,
}

/// Snapshot of the download pipeline's queue state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct PipelineStatus {
    /// Tasks submitted but not yet started
    pub queued: usize,
    /// Tasks currently executing
    pub in_flight: usize,
    /// Whether draining is paused
    pub paused: bool,
}

/// Events emitted over the broadcast channel during a run
///
/// Consumers subscribe via [`crate::BackupOrchestrator::subscribe`]; events
/// are dropped silently when nobody is listening.
#[derive(Clone, Debug)]
pub enum Event {
    /// An orchestrated run began
    RunStarted {
        /// When the run began
        at: DateTime<Utc>,
    },
    /// An orchestrated run finished (possibly with per-unit failures)
    RunFinished {
        /// Items seen in total
        total: u64,
        /// Items fetched and written
        downloaded: u64,
        /// Items already present
        skipped: u64,
        /// Items that exhausted their retries
        failed: u64,
    },
    /// Enumeration of a collection began
    CollectionStarted {
        /// The collection being walked
        collection_id: String,
    },
    /// An item finished with the given classification
    ItemFinished {
        /// The collection the item belongs to
        collection_id: String,
        /// The album the item belongs to
        album_title: String,
        /// The item's sanitized file stem
        item_name: String,
        /// How the item was classified
        class: ItemClass,
    },
    /// The pipeline stopped starting new tasks
    PipelinePaused,
    /// The pipeline resumed draining
    PipelineResumed,
}

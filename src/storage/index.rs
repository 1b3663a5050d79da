//! Persisted per-album backup index
//!
//! One JSON file per album directory records which item files have already
//! been backed up. The record is the primary dedup authority; the pipeline's
//! on-disk existence check is a secondary guard. The file is human-inspectable
//! and safe to delete — the next run re-checks instead of re-downloading
//! files that still exist on disk.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::Result;
use crate::types::MediaKind;

/// File name of the index within each album directory
pub const INDEX_FILE_NAME: &str = ".backup_index.json";

/// Metadata stored for one backed-up file
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// When the file was written
    pub downloaded_at: DateTime<Utc>,
    /// Size in bytes, when known
    #[serde(default)]
    pub size: Option<u64>,
    /// Whether the file is the photo or the video asset
    pub kind: MediaKind,
}

/// The persisted record for one album directory
///
/// A filename present in `files` is assumed already written to disk.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupIndexRecord {
    /// When this album last completed a recording
    #[serde(default)]
    pub last_backup: Option<DateTime<Utc>>,
    /// Backed-up files keyed by filename
    #[serde(default)]
    pub files: BTreeMap<String, FileEntry>,
}

/// Owner of all index read-modify-write cycles
///
/// Writes for the *same* album directory serialize through a per-directory
/// mutex so two concurrent tasks cannot clobber each other's insertions.
/// Different albums' records are independent.
#[derive(Debug, Default)]
pub struct IndexStore {
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl IndexStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the record for an album directory
    ///
    /// Returns an empty record when no index exists yet or the file is
    /// unreadable or corrupt; corruption is logged, never fatal.
    pub async fn load(&self, album_dir: &Path) -> BackupIndexRecord {
        let index_path = album_dir.join(INDEX_FILE_NAME);
        let contents = match tokio::fs::read_to_string(&index_path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return BackupIndexRecord::default();
            }
            Err(e) => {
                tracing::warn!(path = %index_path.display(), error = %e, "could not read backup index");
                return BackupIndexRecord::default();
            }
        };
        match serde_json::from_str(&contents) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(path = %index_path.display(), error = %e, "backup index is corrupt, starting fresh");
                BackupIndexRecord::default()
            }
        }
    }

    /// Persist the record for an album directory
    ///
    /// Creates the directory if absent and writes via a temp file plus
    /// rename so a reader never observes a half-written record.
    pub async fn save(&self, album_dir: &Path, record: &BackupIndexRecord) -> Result<()> {
        tokio::fs::create_dir_all(album_dir).await?;
        let index_path = album_dir.join(INDEX_FILE_NAME);
        let tmp_path = album_dir.join(format!("{INDEX_FILE_NAME}.tmp"));
        let contents = serde_json::to_vec_pretty(record)?;
        tokio::fs::write(&tmp_path, contents).await?;
        tokio::fs::rename(&tmp_path, &index_path).await?;
        Ok(())
    }

    /// Record one downloaded file: load, insert, stamp, save
    ///
    /// The whole cycle holds the album's lock. A save failure is logged and
    /// swallowed — dedup then degrades to a harmless re-download next run,
    /// and the download itself still counts as a success.
    pub async fn record_download(&self, album_dir: &Path, file_name: &str, entry: FileEntry) {
        let lock = self.album_lock(album_dir).await;
        let _guard = lock.lock().await;

        let mut record = self.load(album_dir).await;
        record.files.insert(file_name.to_string(), entry);
        record.last_backup = Some(Utc::now());

        if let Err(e) = self.save(album_dir, &record).await {
            tracing::error!(
                album_dir = %album_dir.display(),
                file_name,
                error = %e,
                "failed to save backup index"
            );
        }
    }

    /// Whether the index already records the given filename
    pub async fn is_recorded(&self, album_dir: &Path, file_name: &str) -> bool {
        self.load(album_dir).await.files.contains_key(file_name)
    }

    async fn album_lock(&self, album_dir: &Path) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(album_dir.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn entry(kind: MediaKind, size: u64) -> FileEntry {
        FileEntry {
            downloaded_at: Utc::now(),
            size: Some(size),
            kind,
        }
    }

    #[tokio::test]
    async fn load_missing_index_returns_empty_record() {
        let dir = tempdir().unwrap();
        let store = IndexStore::new();
        let record = store.load(dir.path()).await;
        assert!(record.files.is_empty());
        assert!(record.last_backup.is_none());
    }

    #[tokio::test]
    async fn load_corrupt_index_returns_empty_record() {
        let dir = tempdir().unwrap();
        tokio::fs::write(dir.path().join(INDEX_FILE_NAME), b"{not json")
            .await
            .unwrap();
        let store = IndexStore::new();
        let record = store.load(dir.path()).await;
        assert!(record.files.is_empty());
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let album = dir.path().join("album");
        let store = IndexStore::new();

        let mut record = BackupIndexRecord::default();
        record.files.insert("a.jpg".into(), entry(MediaKind::Photo, 100));
        record.last_backup = Some(Utc::now());
        store.save(&album, &record).await.unwrap();

        let loaded = store.load(&album).await;
        assert_eq!(loaded, record);
    }

    #[tokio::test]
    async fn save_creates_album_directory() {
        let dir = tempdir().unwrap();
        let album = dir.path().join("deep").join("album");
        let store = IndexStore::new();
        store.save(&album, &BackupIndexRecord::default()).await.unwrap();
        assert!(album.join(INDEX_FILE_NAME).exists());
    }

    #[tokio::test]
    async fn save_leaves_no_temp_file_behind() {
        let dir = tempdir().unwrap();
        let store = IndexStore::new();
        store
            .save(dir.path(), &BackupIndexRecord::default())
            .await
            .unwrap();
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn record_download_inserts_and_stamps() {
        let dir = tempdir().unwrap();
        let store = IndexStore::new();
        store
            .record_download(dir.path(), "photo.jpg", entry(MediaKind::Photo, 42))
            .await;

        assert!(store.is_recorded(dir.path(), "photo.jpg").await);
        assert!(!store.is_recorded(dir.path(), "other.jpg").await);

        let record = store.load(dir.path()).await;
        assert!(record.last_backup.is_some());
        assert_eq!(record.files["photo.jpg"].size, Some(42));
    }

    #[tokio::test]
    async fn record_download_overwrites_existing_entry() {
        let dir = tempdir().unwrap();
        let store = IndexStore::new();
        store
            .record_download(dir.path(), "photo.jpg", entry(MediaKind::Photo, 1))
            .await;
        store
            .record_download(dir.path(), "photo.jpg", entry(MediaKind::Photo, 2))
            .await;
        let record = store.load(dir.path()).await;
        assert_eq!(record.files.len(), 1);
        assert_eq!(record.files["photo.jpg"].size, Some(2));
    }

    #[tokio::test]
    async fn concurrent_recordings_in_same_album_lose_nothing() {
        let dir = tempdir().unwrap();
        let store = Arc::new(IndexStore::new());

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            let album = dir.path().to_path_buf();
            handles.push(tokio::spawn(async move {
                store
                    .record_download(&album, &format!("item_{i}.jpg"), entry(MediaKind::Photo, i))
                    .await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let record = store.load(dir.path()).await;
        assert_eq!(record.files.len(), 8);
        for i in 0..8u64 {
            assert!(record.files.contains_key(&format!("item_{i}.jpg")));
        }
    }
}

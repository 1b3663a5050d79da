//! Execution of a single download task
//!
//! A task covers one item: its photo asset and, when present, its paired
//! video. The two assets are fetched sequentially and independently — one
//! failing never undoes the other's recorded success — and the item is
//! classified once for run statistics.

use std::path::Path;

use chrono::Utc;
use tokio::io::AsyncWriteExt;

use crate::config::DownloadOptions;
use crate::error::Result;
use crate::retry;
use crate::storage::{FileEntry, IndexStore, StorageLayout};
use crate::types::{DownloadTask, ItemClass, MediaKind};

/// Shared dependencies of every task execution
pub(crate) struct TaskContext {
    /// HTTP client for media fetches
    pub http: reqwest::Client,
    /// Pipeline behavior knobs
    pub options: DownloadOptions,
    /// Path resolution
    pub layout: StorageLayout,
    /// Dedup ledger
    pub index: std::sync::Arc<IndexStore>,
}

/// Per-asset result, aggregated into the item's classification
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AssetOutcome {
    Downloaded,
    Skipped,
    Failed,
}

/// Execute one task end to end and classify the item
pub(crate) async fn execute_task(ctx: &TaskContext, task: &DownloadTask) -> ItemClass {
    let photo = fetch_asset(ctx, task, &task.item.primary_url, "jpg", MediaKind::Photo).await;

    let video = match &task.item.video_url {
        Some(url) => Some(fetch_asset(ctx, task, url, "mp4", MediaKind::Video).await),
        None => None,
    };

    let any_failed = photo == AssetOutcome::Failed || video == Some(AssetOutcome::Failed);
    let any_downloaded =
        photo == AssetOutcome::Downloaded || video == Some(AssetOutcome::Downloaded);
    if any_failed {
        ItemClass::Failed
    } else if any_downloaded {
        ItemClass::Downloaded
    } else {
        ItemClass::Skipped
    }
}

/// Fetch one asset of a task, honoring both dedup guards
///
/// The index is the primary authority; the on-disk existence check is the
/// secondary guard that keeps a deleted index from forcing re-downloads.
async fn fetch_asset(
    ctx: &TaskContext,
    task: &DownloadTask,
    url: &str,
    extension: &str,
    kind: MediaKind,
) -> AssetOutcome {
    let dest = ctx.layout.item_path(
        &task.collection_id,
        task.collection_name.as_deref(),
        &task.album_title,
        &task.item.name,
        extension,
    );
    let file_name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    if ctx.index.is_recorded(&task.album_dir, &file_name).await {
        tracing::debug!(file_name, "already recorded in backup index, skipping");
        return AssetOutcome::Skipped;
    }

    if ctx.options.skip_existing && dest.exists() {
        let size = std::fs::metadata(&dest).map(|m| m.len()).ok();
        tracing::debug!(file_name, ?size, "file already on disk, skipping");
        return AssetOutcome::Skipped;
    }

    let attempt = || fetch_to_file(&ctx.http, url, &dest);
    match retry::with_fixed_delay(ctx.options.retry_attempts, ctx.options.retry_delay, attempt)
        .await
    {
        Ok(size) => {
            tracing::debug!(file_name, size, "downloaded");
            ctx.index
                .record_download(
                    &task.album_dir,
                    &file_name,
                    FileEntry {
                        downloaded_at: Utc::now(),
                        size: Some(size),
                        kind,
                    },
                )
                .await;
            AssetOutcome::Downloaded
        }
        Err(e) => {
            tracing::error!(
                collection_id = %task.collection_id,
                album_title = %task.album_title,
                file_name,
                error = %e,
                "download failed after retries"
            );
            AssetOutcome::Failed
        }
    }
}

/// Stream one URL into its destination file, returning the byte count
///
/// Any failure removes the partially written file before the error
/// propagates, so retries and later runs always start from a clean slate.
async fn fetch_to_file(http: &reqwest::Client, url: &str, dest: &Path) -> Result<u64> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    match stream_body(http, url, dest).await {
        Ok(size) => Ok(size),
        Err(e) => {
            if let Err(cleanup) = tokio::fs::remove_file(dest).await {
                if cleanup.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %dest.display(), error = %cleanup, "could not remove partial file");
                }
            }
            Err(e)
        }
    }
}

async fn stream_body(http: &reqwest::Client, url: &str, dest: &Path) -> Result<u64> {
    let mut response = http.get(url).send().await?.error_for_status()?;
    let mut file = tokio::fs::File::create(dest).await?;
    let mut written: u64 = 0;
    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

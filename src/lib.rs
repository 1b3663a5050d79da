//! # album-mirror
//!
//! Backend library for scheduled mirroring of remote photo album
//! collections to local storage.
//!
//! ## Design Philosophy
//!
//! album-mirror is designed to be:
//! - **Idempotent** - Re-running a backup never duplicates a completed
//!   download; a persisted per-album index plus an on-disk existence check
//!   make repeat runs cheap
//! - **Fault-contained** - One item, page, album, or collection failing
//!   never aborts the rest of the run
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Event-driven** - Consumers subscribe to run events, no polling
//!   required
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use album_mirror::{
//!     AuthContext, BackupOrchestrator, Config, QzoneCatalogClient, run_with_shutdown,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config: Config = serde_json::from_str(&std::fs::read_to_string("config.json")?)?;
//!
//!     let auth = AuthContext::from_env()?;
//!     let client = QzoneCatalogClient::new(
//!         auth,
//!         config.download.timeout,
//!         config.catalog.album_list_limit,
//!     )?;
//!
//!     let orchestrator = Arc::new(BackupOrchestrator::new(config, Arc::new(client))?);
//!
//!     // One manual run...
//!     let stats = orchestrator.execute_backup().await?;
//!     println!("downloaded {}, skipped {}", stats.downloaded, stats.skipped);
//!
//!     // ...or recurring runs until a termination signal arrives.
//!     if orchestrator.start() {
//!         run_with_shutdown(orchestrator).await;
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Credential context consumed by the catalog client
pub mod auth;
/// Remote catalog boundary (client trait, HTTP implementation, walker)
pub mod catalog;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Backup orchestration and the recurring trigger
pub mod orchestrator;
/// Bounded-concurrency download pipeline
pub mod pipeline;
/// Retry logic with a fixed inter-attempt delay
pub mod retry;
/// Cron expression parsing for the recurring trigger
pub mod schedule;
/// Run statistics
pub mod stats;
/// Local storage: paths, backup index, usage reports
pub mod storage;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use auth::AuthContext;
pub use catalog::{AlbumSummary, CatalogClient, CatalogWalker, MediaVariant, QzoneCatalogClient, RawMediaItem};
pub use config::{CatalogOptions, CollectionConfig, Config, DownloadOptions, ScheduleConfig, StorageConfig};
pub use error::{CatalogError, Error, Result};
pub use orchestrator::{BackupOrchestrator, OrchestratorStatus};
pub use pipeline::DownloadPipeline;
pub use schedule::CronExpr;
pub use stats::{CollectionStats, RunStats, StatsRecorder};
pub use storage::{BackupIndexRecord, FileEntry, IndexStore, StorageLayout, UsageReport};
pub use types::{Album, DownloadTask, Event, ItemClass, MediaItem, MediaKind, PipelineStatus};

use std::sync::Arc;

/// Run until a termination signal arrives, then shut down gracefully
///
/// Stops the recurring trigger and pauses the pipeline so in-flight
/// transfers finish on their own; an active run's queue is left intact for
/// the next invocation to pick up via the skip checks.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with a Ctrl+C fallback if
///   signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
pub async fn run_with_shutdown(orchestrator: Arc<BackupOrchestrator>) {
    wait_for_signal().await;
    orchestrator.stop();
    if orchestrator.status().await.running {
        tracing::info!("waiting for in-flight downloads to finish");
        orchestrator.pipeline().pause();
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let sigterm = signal(SignalKind::terminate());
    let sigint = signal(SignalKind::interrupt());
    match (sigterm, sigint) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("received SIGTERM"),
                _ = sigint.recv() => tracing::info!("received SIGINT"),
            }
        }
        _ => {
            // Restricted environments (containers, tests) may refuse signal
            // registration; fall back to the portable handler.
            tracing::warn!("could not register signal handlers, falling back to ctrl_c");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for Ctrl+C");
    }
}

//! Backup orchestration and the recurring trigger
//!
//! One orchestrated run walks every enabled collection, fills the download
//! pipeline, and drains it. Runs never overlap: a time-based trigger (or a
//! manual caller) that fires while a run is active is a logged no-op, not an
//! error. A single collection's or album's enumeration failure is contained;
//! only authentication and configuration problems abort a run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, Utc};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::catalog::{CatalogClient, CatalogWalker};
use crate::config::{CollectionConfig, Config};
use crate::error::{Error, Result};
use crate::pipeline::DownloadPipeline;
use crate::schedule::CronExpr;
use crate::stats::{RunStats, StatsRecorder};
use crate::storage::{IndexStore, StorageLayout};
use crate::types::{DownloadTask, Event, PipelineStatus};

/// How often the trigger loop samples the clock; well under a minute so no
/// cron minute is ever missed
const TRIGGER_POLL_INTERVAL: Duration = Duration::from_secs(20);

/// Combined status of the orchestrator and its pipeline
#[derive(Clone, Debug)]
pub struct OrchestratorStatus {
    /// Whether the recurring trigger is active
    pub scheduled: bool,
    /// Whether a run is currently executing
    pub running: bool,
    /// The pipeline's queue snapshot
    pub pipeline: PipelineStatus,
    /// Counters of the current or most recent run
    pub stats: RunStats,
}

struct Trigger {
    token: CancellationToken,
    handle: tokio::task::JoinHandle<()>,
}

/// Drives recurring backups over a configured set of collections
pub struct BackupOrchestrator {
    config: Config,
    walker: CatalogWalker,
    layout: StorageLayout,
    pipeline: DownloadPipeline,
    stats: Arc<StatsRecorder>,
    is_running: Arc<AtomicBool>,
    event_tx: broadcast::Sender<Event>,
    trigger: std::sync::Mutex<Option<Trigger>>,
}

/// Resets the running flag when a run exits by any path
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl BackupOrchestrator {
    /// Build an orchestrator over the given catalog client
    ///
    /// Validates the configuration up front; an empty or fully disabled
    /// collection set is rejected here rather than discovered mid-run.
    pub fn new(config: Config, client: Arc<dyn CatalogClient>) -> Result<Self> {
        config.validate()?;

        let (event_tx, _rx) = broadcast::channel(1000);
        let layout = StorageLayout::new(config.storage.base_dir.clone());
        let index = Arc::new(IndexStore::new());
        let stats = Arc::new(StatsRecorder::new());
        let walker = CatalogWalker::new(client, config.catalog.clone());
        let pipeline = DownloadPipeline::new(
            config.download.clone(),
            layout.clone(),
            index,
            stats.clone(),
            event_tx.clone(),
        )?;

        Ok(Self {
            config,
            walker,
            layout,
            pipeline,
            stats,
            is_running: Arc::new(AtomicBool::new(false)),
            event_tx,
            trigger: std::sync::Mutex::new(None),
        })
    }

    /// Subscribe to run and pipeline events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// The download pipeline, for pause/resume/clear control
    pub fn pipeline(&self) -> &DownloadPipeline {
        &self.pipeline
    }

    /// Execute one backup run over every enabled collection
    ///
    /// No-ops with a log line when a run is already active, returning the
    /// active run's counters as they stand.
    pub async fn execute_backup(&self) -> Result<RunStats> {
        self.execute_filtered(None).await
    }

    /// Execute one backup run restricted to a single collection
    pub async fn execute_backup_for(&self, collection_id: &str) -> Result<RunStats> {
        self.execute_filtered(Some(collection_id)).await
    }

    async fn execute_filtered(&self, only: Option<&str>) -> Result<RunStats> {
        if let Some(id) = only {
            if !self.config.collections.iter().any(|c| c.id == id) {
                return Err(Error::config(
                    format!("collection {id} is not configured"),
                    "collections",
                ));
            }
        }

        if self
            .is_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::warn!("backup already running, skipping this trigger");
            return Ok(self.stats.snapshot());
        }
        let _guard = RunningGuard(self.is_running.clone());

        self.stats.begin_run();
        self.event_tx
            .send(Event::RunStarted { at: Utc::now() })
            .ok();

        let collections: Vec<&CollectionConfig> = self
            .config
            .enabled_collections()
            .filter(|c| only.map_or(true, |id| c.id == id))
            .collect();
        tracing::info!(collections = collections.len(), "backup run starting");

        for collection in collections {
            self.event_tx
                .send(Event::CollectionStarted {
                    collection_id: collection.id.clone(),
                })
                .ok();
            match self.backup_collection(collection).await {
                Ok(()) => {}
                Err(e @ Error::Authentication(_)) => {
                    tracing::error!(error = %e, "credentials rejected, aborting run");
                    return Err(e);
                }
                Err(e) => {
                    tracing::error!(
                        collection_id = %collection.id,
                        error = %e,
                        "collection enumeration failed, continuing with the rest"
                    );
                }
            }
        }

        self.pipeline.run().await;

        self.stats.finish_run();
        let stats = self.stats.snapshot();
        self.event_tx
            .send(Event::RunFinished {
                total: stats.total,
                downloaded: stats.downloaded,
                skipped: stats.skipped,
                failed: stats.failed,
            })
            .ok();
        tracing::info!(
            total = stats.total,
            downloaded = stats.downloaded,
            skipped = stats.skipped,
            failed = stats.failed,
            "backup run finished"
        );
        Ok(stats)
    }

    /// Enumerate one collection's albums and items into the pipeline
    async fn backup_collection(&self, collection: &CollectionConfig) -> Result<()> {
        let display_name = collection.name.as_deref().unwrap_or(&collection.id);
        tracing::info!(collection_id = %collection.id, name = display_name, "backing up collection");

        let albums = self.walker.list_albums(&collection.id).await?;
        if albums.is_empty() {
            tracing::info!(collection_id = %collection.id, "collection has no albums with items");
            return Ok(());
        }

        for album in albums {
            tracing::info!(
                album_id = %album.id,
                album_title = %album.title,
                item_count = album.item_count,
                "enumerating album"
            );
            let items = self
                .walker
                .list_items(&collection.id, &album.id, album.item_count)
                .await;
            if items.is_empty() {
                tracing::warn!(album_title = %album.title, "album yielded no items");
                continue;
            }

            let album_dir =
                self.layout
                    .album_dir(&collection.id, collection.name.as_deref(), &album.title);
            for item in items {
                self.pipeline
                    .submit(DownloadTask {
                        collection_id: collection.id.clone(),
                        collection_name: collection.name.clone(),
                        album_title: album.title.clone(),
                        album_dir: album_dir.clone(),
                        item,
                    })
                    .await;
            }
        }

        Ok(())
    }

    /// Start the recurring trigger
    ///
    /// Returns false — without scheduling anything — when scheduling is
    /// disabled in configuration or the cron expression does not parse.
    /// Calling it again while a trigger is active is a no-op returning true.
    pub fn start(self: &Arc<Self>) -> bool {
        if !self.config.schedule.enabled {
            tracing::info!("scheduled backups are disabled");
            return false;
        }
        let expr = match CronExpr::parse(&self.config.schedule.cron) {
            Ok(expr) => expr,
            Err(e) => {
                tracing::error!(
                    cron = %self.config.schedule.cron,
                    error = %e,
                    "rejecting schedule"
                );
                return false;
            }
        };

        let mut trigger = self.lock_trigger();
        if trigger.is_some() {
            tracing::warn!("recurring trigger already started");
            return true;
        }

        let describe = self
            .config
            .schedule
            .description
            .clone()
            .unwrap_or_else(|| self.config.schedule.cron.clone());
        tracing::info!(schedule = %describe, "starting recurring backups");

        let token = CancellationToken::new();
        let loop_token = token.clone();
        let orchestrator = self.clone();
        let handle = tokio::spawn(async move {
            orchestrator.trigger_loop(expr, loop_token).await;
        });
        *trigger = Some(Trigger { token, handle });
        true
    }

    /// Stop the recurring trigger; an in-flight run is left to finish
    pub fn stop(&self) {
        if let Some(trigger) = self.lock_trigger().take() {
            trigger.token.cancel();
            trigger.handle.abort();
            tracing::info!("recurring backups stopped");
        }
    }

    /// Snapshot the orchestrator, pipeline, and run counters
    pub async fn status(&self) -> OrchestratorStatus {
        // Taken before the await so the trigger lock is never held across it.
        let scheduled = self.lock_trigger().is_some();
        let pipeline = self.pipeline.status().await;
        OrchestratorStatus {
            scheduled,
            running: self.is_running.load(Ordering::SeqCst),
            pipeline,
            stats: self.stats.snapshot(),
        }
    }

    /// Minute-resolution trigger loop; fires at most once per matching minute
    async fn trigger_loop(self: Arc<Self>, expr: CronExpr, token: CancellationToken) {
        let mut last_fired: Option<String> = None;
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::debug!("trigger loop exiting");
                    break;
                }
                _ = tokio::time::sleep(TRIGGER_POLL_INTERVAL) => {}
            }

            let now = Local::now();
            let minute_key = now.format("%Y-%m-%d %H:%M").to_string();
            if expr.matches(&now) && last_fired.as_ref() != Some(&minute_key) {
                last_fired = Some(minute_key);
                tracing::info!("schedule fired");
                if let Err(e) = self.execute_backup().await {
                    tracing::error!(error = %e, "scheduled backup failed");
                }
            }
        }
    }

    fn lock_trigger(&self) -> std::sync::MutexGuard<'_, Option<Trigger>> {
        match self.trigger.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Drop for BackupOrchestrator {
    fn drop(&mut self) {
        if let Some(trigger) = self.lock_trigger().take() {
            trigger.token.cancel();
            trigger.handle.abort();
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{AlbumSummary, MediaVariant, RawMediaItem};
    use crate::config::{CatalogOptions, CollectionConfig, DownloadOptions, ScheduleConfig, StorageConfig};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;
    use tempfile::tempdir;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Scripted catalog: per-collection albums and per-album item lists
    #[derive(Default)]
    struct ScriptedClient {
        albums: HashMap<String, Vec<AlbumSummary>>,
        items: HashMap<(String, String), Vec<RawMediaItem>>,
        failing_collections: Vec<String>,
        auth_failure: bool,
        list_albums_delay: Duration,
        album_calls: AtomicUsize,
    }

    #[async_trait]
    impl CatalogClient for ScriptedClient {
        async fn list_albums(&self, collection_id: &str) -> Result<Vec<AlbumSummary>> {
            self.album_calls.fetch_add(1, Ordering::SeqCst);
            if !self.list_albums_delay.is_zero() {
                tokio::time::sleep(self.list_albums_delay).await;
            }
            if self.auth_failure {
                return Err(Error::Authentication("session expired".into()));
            }
            if self.failing_collections.iter().any(|c| c == collection_id) {
                return Err(crate::error::CatalogError::Status {
                    code: -1,
                    message: "injected".into(),
                }
                .into());
            }
            Ok(self.albums.get(collection_id).cloned().unwrap_or_default())
        }

        async fn list_items_page(
            &self,
            collection_id: &str,
            album_id: &str,
            offset: usize,
            page_size: usize,
        ) -> Result<Vec<RawMediaItem>> {
            let key = (collection_id.to_string(), album_id.to_string());
            let all = self.items.get(&key).cloned().unwrap_or_default();
            Ok(all.into_iter().skip(offset).take(page_size).collect())
        }
    }

    fn item(name: &str, url: String) -> RawMediaItem {
        RawMediaItem {
            name: name.into(),
            upload_time: 1_700_000_000,
            variants: vec![MediaVariant {
                url,
                width: 0,
                height: 0,
                enlarge_rate: 0,
            }],
            video_url: None,
        }
    }

    fn config_for(dir: &std::path::Path, ids: &[&str]) -> Config {
        Config {
            collections: ids
                .iter()
                .map(|id| CollectionConfig {
                    id: (*id).to_string(),
                    name: None,
                    enabled: true,
                })
                .collect(),
            storage: StorageConfig {
                base_dir: dir.to_path_buf(),
            },
            download: DownloadOptions {
                retry_attempts: 0,
                retry_delay: Duration::ZERO,
                ..Default::default()
            },
            catalog: CatalogOptions {
                page_delay: Duration::ZERO,
                ..Default::default()
            },
            schedule: ScheduleConfig::default(),
        }
    }

    async fn media_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"media".to_vec()))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn run_downloads_everything_once() {
        let server = media_server().await;
        let dir = tempdir().unwrap();

        let mut client = ScriptedClient::default();
        client.albums.insert(
            "g1".into(),
            vec![AlbumSummary {
                id: "a1".into(),
                title: "Trip".into(),
                item_count: 2,
            }],
        );
        client.items.insert(
            ("g1".into(), "a1".into()),
            vec![
                item("one", format!("{}/1", server.uri())),
                item("two", format!("{}/2", server.uri())),
            ],
        );

        let orchestrator = Arc::new(
            BackupOrchestrator::new(config_for(dir.path(), &["g1"]), Arc::new(client)).unwrap(),
        );
        let stats = orchestrator.execute_backup().await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.downloaded, 2);
        assert_eq!(stats.failed, 0);
        assert!(dir.path().join("g1").join("Trip").join("one.jpg").exists());
        assert!(dir.path().join("g1").join("Trip").join("two.jpg").exists());
    }

    #[tokio::test]
    async fn second_invocation_during_run_is_a_no_op() {
        let dir = tempdir().unwrap();
        let mut client = ScriptedClient::default();
        client.list_albums_delay = Duration::from_millis(300);
        client.albums.insert("g1".into(), vec![]);
        let client = Arc::new(client);

        let orchestrator = Arc::new(
            BackupOrchestrator::new(config_for(dir.path(), &["g1"]), client.clone()).unwrap(),
        );

        let first = {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move { orchestrator.execute_backup().await })
        };
        // Give the first run time to take the flag.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let started = std::time::Instant::now();
        orchestrator.execute_backup().await.unwrap();
        assert!(
            started.elapsed() < Duration::from_millis(200),
            "second call should return without enumerating"
        );

        first.await.unwrap().unwrap();
        // Only the first run reached the catalog.
        assert_eq!(client.album_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn one_bad_collection_never_blocks_the_rest() {
        let server = media_server().await;
        let dir = tempdir().unwrap();

        let mut client = ScriptedClient::default();
        client.failing_collections = vec!["bad".into()];
        client.albums.insert(
            "good".into(),
            vec![AlbumSummary {
                id: "a1".into(),
                title: "Album".into(),
                item_count: 1,
            }],
        );
        client.items.insert(
            ("good".into(), "a1".into()),
            vec![item("pic", format!("{}/pic", server.uri()))],
        );

        let orchestrator = Arc::new(
            BackupOrchestrator::new(config_for(dir.path(), &["bad", "good"]), Arc::new(client))
                .unwrap(),
        );
        let stats = orchestrator.execute_backup().await.unwrap();
        assert_eq!(stats.downloaded, 1);
        assert_eq!(stats.collections["good"].downloaded, 1);
        assert!(!stats.collections.contains_key("bad"));
    }

    #[tokio::test]
    async fn authentication_failure_aborts_and_releases_the_flag() {
        let dir = tempdir().unwrap();
        let mut client = ScriptedClient::default();
        client.auth_failure = true;

        let orchestrator = Arc::new(
            BackupOrchestrator::new(config_for(dir.path(), &["g1"]), Arc::new(client)).unwrap(),
        );
        let err = orchestrator.execute_backup().await.unwrap_err();
        assert!(matches!(err, Error::Authentication(_)));

        // The running flag was released; another run may start.
        assert!(!orchestrator.status().await.running);
    }

    #[tokio::test]
    async fn single_collection_run_rejects_unknown_ids() {
        let dir = tempdir().unwrap();
        let orchestrator = Arc::new(
            BackupOrchestrator::new(
                config_for(dir.path(), &["g1"]),
                Arc::new(ScriptedClient::default()),
            )
            .unwrap(),
        );
        assert!(orchestrator.execute_backup_for("nope").await.is_err());
    }

    #[tokio::test]
    async fn single_collection_run_touches_only_that_collection() {
        let server = media_server().await;
        let dir = tempdir().unwrap();

        let mut client = ScriptedClient::default();
        for id in ["g1", "g2"] {
            client.albums.insert(
                id.into(),
                vec![AlbumSummary {
                    id: "a".into(),
                    title: "T".into(),
                    item_count: 1,
                }],
            );
            client.items.insert(
                (id.into(), "a".into()),
                vec![item("p", format!("{}/{id}", server.uri()))],
            );
        }

        let orchestrator = Arc::new(
            BackupOrchestrator::new(config_for(dir.path(), &["g1", "g2"]), Arc::new(client))
                .unwrap(),
        );
        let stats = orchestrator.execute_backup_for("g2").await.unwrap();
        assert_eq!(stats.total, 1);
        assert!(stats.collections.contains_key("g2"));
        assert!(!stats.collections.contains_key("g1"));
    }

    #[tokio::test]
    async fn start_refuses_disabled_or_invalid_schedules() {
        let dir = tempdir().unwrap();
        let mut config = config_for(dir.path(), &["g1"]);

        // Disabled scheduling.
        let orchestrator = Arc::new(
            BackupOrchestrator::new(config.clone(), Arc::new(ScriptedClient::default())).unwrap(),
        );
        assert!(!orchestrator.start());

        // Enabled but invalid expression.
        config.schedule = ScheduleConfig {
            enabled: true,
            cron: "not a cron".into(),
            description: None,
        };
        let orchestrator = Arc::new(
            BackupOrchestrator::new(config, Arc::new(ScriptedClient::default())).unwrap(),
        );
        assert!(!orchestrator.start());
        assert!(!orchestrator.status().await.scheduled);
    }

    #[tokio::test]
    async fn start_and_stop_manage_the_trigger() {
        let dir = tempdir().unwrap();
        let mut config = config_for(dir.path(), &["g1"]);
        config.schedule = ScheduleConfig {
            enabled: true,
            cron: "0 3 * * *".into(),
            description: Some("nightly".into()),
        };

        let orchestrator = Arc::new(
            BackupOrchestrator::new(config, Arc::new(ScriptedClient::default())).unwrap(),
        );
        assert!(orchestrator.start());
        assert!(orchestrator.status().await.scheduled);

        // Starting again is a harmless no-op.
        assert!(orchestrator.start());

        orchestrator.stop();
        assert!(!orchestrator.status().await.scheduled);
    }
}

//! Bounded-concurrency download pipeline
//!
//! Tasks are drained from a FIFO queue by a single driver loop that acquires
//! a semaphore permit before spawning each task, so at most `max_concurrent`
//! transfers run at once. Submission order is the scheduling priority;
//! completion order across workers is unordered. Pausing is cooperative —
//! the driver checks the flag between queue pops, so in-flight transfers
//! always finish or fail on their own.

mod task;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex, Semaphore};
use tokio::task::JoinSet;

use crate::config::DownloadOptions;
use crate::error::Result;
use crate::stats::StatsRecorder;
use crate::storage::{IndexStore, StorageLayout};
use crate::types::{DownloadTask, Event, PipelineStatus};

use task::TaskContext;

/// Worker pool that executes download tasks against arbitrary URLs
pub struct DownloadPipeline {
    queue: Mutex<VecDeque<DownloadTask>>,
    concurrent_limit: Arc<Semaphore>,
    paused: AtomicBool,
    in_flight: Arc<AtomicUsize>,
    ctx: Arc<TaskContext>,
    stats: Arc<StatsRecorder>,
    event_tx: broadcast::Sender<Event>,
}

impl DownloadPipeline {
    /// Create a pipeline over the given storage and stats collaborators
    pub fn new(
        options: DownloadOptions,
        layout: StorageLayout,
        index: Arc<IndexStore>,
        stats: Arc<StatsRecorder>,
        event_tx: broadcast::Sender<Event>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(options.timeout)
            .user_agent(crate::auth::USER_AGENT)
            .build()?;
        let concurrent_limit = Arc::new(Semaphore::new(options.max_concurrent));
        Ok(Self {
            queue: Mutex::new(VecDeque::new()),
            concurrent_limit,
            paused: AtomicBool::new(false),
            in_flight: Arc::new(AtomicUsize::new(0)),
            ctx: Arc::new(TaskContext {
                http,
                options,
                layout,
                index,
            }),
            stats,
            event_tx,
        })
    }

    /// Append a task to the queue; it will run on the next `run()` drain
    pub async fn submit(&self, task: DownloadTask) {
        self.queue.lock().await.push_back(task);
    }

    /// Drain the queue, returning once it is empty or a pause took effect
    ///
    /// In-flight tasks are always joined before returning, so the caller
    /// can rely on every started task having reported its outcome.
    pub async fn run(&self) {
        let mut workers = JoinSet::new();

        loop {
            if self.paused.load(Ordering::Acquire) {
                tracing::info!("pipeline paused, not starting further tasks");
                break;
            }
            // Scoped so the queue lock is released before waiting on a permit.
            let next = { self.queue.lock().await.pop_front() };
            let Some(task) = next else {
                break;
            };

            // Blocks while max_concurrent tasks are outstanding.
            let permit = match self.concurrent_limit.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    self.queue.lock().await.push_front(task);
                    break;
                }
            };

            let ctx = self.ctx.clone();
            let stats = self.stats.clone();
            let in_flight = self.in_flight.clone();
            let event_tx = self.event_tx.clone();
            in_flight.fetch_add(1, Ordering::SeqCst);
            workers.spawn(async move {
                let _permit = permit;
                let class = task::execute_task(&ctx, &task).await;
                stats.record(&task.collection_id, class);
                event_tx
                    .send(Event::ItemFinished {
                        collection_id: task.collection_id.clone(),
                        album_title: task.album_title.clone(),
                        item_name: crate::storage::sanitize_component(&task.item.name),
                        class,
                    })
                    .ok();
                in_flight.fetch_sub(1, Ordering::SeqCst);
            });
        }

        while workers.join_next().await.is_some() {}
    }

    /// Stop starting new tasks; in-flight transfers run to completion
    pub fn pause(&self) {
        if !self.paused.swap(true, Ordering::AcqRel) {
            tracing::info!("pipeline pause requested");
            self.event_tx.send(Event::PipelinePaused).ok();
        }
    }

    /// Clear the pause flag and continue draining the current queue
    pub async fn resume(&self) {
        if !self.paused.swap(false, Ordering::AcqRel) {
            return;
        }
        tracing::info!("pipeline resumed");
        self.event_tx.send(Event::PipelineResumed).ok();
        self.run().await;
    }

    /// Discard queued tasks that have not started; in-flight tasks are kept
    pub async fn clear(&self) {
        let mut queue = self.queue.lock().await;
        let discarded = queue.len();
        queue.clear();
        if discarded > 0 {
            tracing::info!(discarded, "cleared pending queue");
        }
    }

    /// Snapshot of queue depth, in-flight count, and pause state
    pub async fn status(&self) -> PipelineStatus {
        PipelineStatus {
            queued: self.queue.lock().await.len(),
            in_flight: self.in_flight.load(Ordering::SeqCst),
            paused: self.paused.load(Ordering::Acquire),
        }
    }
}

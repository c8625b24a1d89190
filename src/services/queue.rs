//! Task queue and its bounded-concurrency runner.
//!
//! [`TaskQueue`] is the cloneable sink the sync driver (and running tasks)
//! submit to. [`TaskRunner`] drains it: tasks are admitted FIFO, at most
//! `max_concurrency` execute at once, and two tasks for the same object id
//! never execute at the same time. A failing or panicking task is logged and
//! counted; it never stops the runner or its siblings.

use crate::{
    errors::{SyncError, SyncResult},
    models::ObjectId,
    services::tasks::{SyncContext, SyncTask},
};
use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
};
use tokio::{
    sync::{OwnedMutexGuard, Semaphore, mpsc},
    task::{JoinError, JoinSet},
};
use tracing::{debug, error, info};

/// Handle for submitting tasks.
#[derive(Clone)]
pub struct TaskQueue {
    sender: mpsc::UnboundedSender<SyncTask>,
}

impl TaskQueue {
    /// Create a queue and the runner that executes its tasks.
    ///
    /// A `max_concurrency` of 0 is treated as 1.
    pub fn new(max_concurrency: usize, context: Arc<SyncContext>) -> (Self, TaskRunner) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let runner = TaskRunner {
            receiver,
            context,
            concurrency: Arc::new(Semaphore::new(max_concurrency.max(1))),
            locks: Arc::new(ObjectLocks::default()),
            stats: Arc::new(QueueStats::default()),
        };
        (Self { sender }, runner)
    }

    /// Enqueue tasks without waiting for them to run.
    pub fn add(&self, tasks: impl IntoIterator<Item = SyncTask>) -> SyncResult<()> {
        for task in tasks {
            debug!("queued: {}", task.description());
            self.sender.send(task).map_err(|_| SyncError::QueueClosed)?;
        }
        Ok(())
    }
}

/// Outcome counters of one [`TaskRunner::run`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueSummary {
    pub completed: u64,
    pub failed: u64,
    /// Highest number of tasks observed executing at the same instant.
    pub peak_concurrency: usize,
}

#[derive(Default)]
struct QueueStats {
    running: AtomicUsize,
    peak: AtomicUsize,
    completed: AtomicU64,
    failed: AtomicU64,
}

impl QueueStats {
    fn summary(&self) -> QueueSummary {
        QueueSummary {
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            peak_concurrency: self.peak.load(Ordering::Relaxed),
        }
    }
}

/// Decrements the running gauge even if the task panics.
struct RunningGuard(Arc<QueueStats>);

impl RunningGuard {
    fn enter(stats: Arc<QueueStats>) -> Self {
        let running = stats.running.fetch_add(1, Ordering::SeqCst) + 1;
        stats.peak.fetch_max(running, Ordering::SeqCst);
        Self(stats)
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.running.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Executes queued tasks.
pub struct TaskRunner {
    pub(crate) receiver: mpsc::UnboundedReceiver<SyncTask>,
    context: Arc<SyncContext>,
    concurrency: Arc<Semaphore>,
    locks: Arc<ObjectLocks>,
    stats: Arc<QueueStats>,
}

impl TaskRunner {
    /// Run until every [`TaskQueue`] handle is dropped and all admitted tasks
    /// have finished. Handles held by running tasks keep the runner alive, so
    /// follow-up tasks they submit are executed too.
    pub async fn run(mut self) -> QueueSummary {
        info!("sync task runner started");
        let mut in_flight = JoinSet::new();

        while let Some(task) = self.receiver.recv().await {
            while let Some(result) = in_flight.try_join_next() {
                self.reap(result);
            }

            let permit = match self.concurrency.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };

            let context = self.context.clone();
            let locks = self.locks.clone();
            let stats = self.stats.clone();

            in_flight.spawn(async move {
                let _permit = permit;
                let _lock = locks.acquire(task.object_id().clone()).await;
                let _running = RunningGuard::enter(stats.clone());

                let description = task.description();
                debug!("{}", description);

                match task.execute(&context).await {
                    Ok(()) => {
                        stats.completed.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(err) => {
                        stats.failed.fetch_add(1, Ordering::Relaxed);
                        error!(task = %description, error = %err, "sync task failed");
                    }
                }
            });
        }

        while let Some(result) = in_flight.join_next().await {
            self.reap(result);
        }

        let summary = self.stats.summary();
        info!(
            completed = summary.completed,
            failed = summary.failed,
            peak_concurrency = summary.peak_concurrency,
            "sync task runner finished"
        );
        summary
    }

    fn reap(&self, result: Result<(), JoinError>) {
        if let Err(err) = result {
            self.stats.failed.fetch_add(1, Ordering::Relaxed);
            error!(error = %err, "sync task aborted");
        }
    }
}

/// Per-object mutual exclusion. Entries are dropped once nobody holds or
/// waits for them.
#[derive(Default)]
struct ObjectLocks {
    inner: Mutex<HashMap<ObjectId, Arc<tokio::sync::Mutex<()>>>>,
}

impl ObjectLocks {
    async fn acquire(self: &Arc<Self>, id: ObjectId) -> ObjectLockGuard {
        let lock = {
            let mut locks = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(id.clone()).or_default().clone()
        };
        let guard = lock.lock_owned().await;
        ObjectLockGuard {
            id,
            locks: self.clone(),
            guard: Some(guard),
        }
    }
}

struct ObjectLockGuard {
    id: ObjectId,
    locks: Arc<ObjectLocks>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for ObjectLockGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self
            .locks
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let idle = locks
            .get(&self.id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1);
        if idle {
            locks.remove(&self.id);
        }
    }
}

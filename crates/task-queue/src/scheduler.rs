//! Bounded-concurrency task scheduler.
//!
//! # Structure
//!
//! - **Dispatcher:** one async task that takes task ids off the submission
//!   queue in order, waits for a free slot, and admits the task by moving
//!   it from `pending` to `processing`.
//! - **Workers:** one per admitted task, holding a slot permit. The job
//!   itself runs on a blocking thread; the worker records the outcome,
//!   deletes the consumed source file and releases the slot.
//! - **Recovery:** on start, tasks left `processing` by a previous run are
//!   failed and `pending` tasks are queued again.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio::task::{JoinHandle, JoinSet};

use longshot_common::config::QueueConfig;
use longshot_common::error::{LongshotError, LongshotResult};
use longshot_media::remove_outputs;

use crate::page::{PageRequest, TaskPage};
use crate::query::{self, remove_source};
use crate::runner::JobRunner;
use crate::store::TaskStore;
use crate::task::{Submission, TaskRecord, TaskStatus, TaskStatusView, Transition};

/// Error recorded for tasks that were running when the process stopped.
pub const INTERRUPTED_MESSAGE: &str = "interrupted: the service stopped while the task was running";

/// Scheduler settings.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Worker slots; at least 1.
    pub max_concurrency: usize,
    /// Largest accepted source file, in bytes.
    pub max_source_bytes: u64,
    /// Buffered task events per subscriber.
    pub event_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from(&QueueConfig::default())
    }
}

impl From<&QueueConfig> for SchedulerConfig {
    fn from(queue: &QueueConfig) -> Self {
        Self {
            max_concurrency: queue.max_concurrency,
            max_source_bytes: queue.max_source_bytes,
            event_capacity: 256,
        }
    }
}

/// Lifecycle notifications broadcast to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TaskEvent {
    Submitted { task_id: String },
    Started { task_id: String },
    Completed { task_id: String, outputs: usize },
    Failed { task_id: String, message: String },
    Deleted { task_id: String },
}

impl TaskEvent {
    pub fn task_id(&self) -> &str {
        match self {
            Self::Submitted { task_id }
            | Self::Started { task_id }
            | Self::Completed { task_id, .. }
            | Self::Failed { task_id, .. }
            | Self::Deleted { task_id } => task_id,
        }
    }

    /// Whether no further events follow for this task.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            Self::Completed { .. } | Self::Failed { .. } | Self::Deleted { .. }
        )
    }
}

struct Shared {
    store: Arc<dyn TaskStore>,
    runner: Arc<dyn JobRunner>,
    config: SchedulerConfig,
    queue: Mutex<Option<mpsc::UnboundedSender<String>>>,
    events: broadcast::Sender<TaskEvent>,
    running: Mutex<HashMap<String, Arc<AtomicBool>>>,
    stopping: AtomicBool,
}

impl Shared {
    fn emit(&self, event: TaskEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn running(&self) -> LongshotResult<std::sync::MutexGuard<'_, HashMap<String, Arc<AtomicBool>>>> {
        self.running
            .lock()
            .map_err(|_| LongshotError::storage("running task table lock poisoned"))
    }

    /// Record a new task and queue it. Holding the queue lock keeps a
    /// concurrent shutdown from closing the queue between the two, and a
    /// task that cannot be queued is removed again.
    fn submit_new(&self, record: &TaskRecord) -> LongshotResult<()> {
        let queue = self
            .queue
            .lock()
            .map_err(|_| LongshotError::storage("submission queue lock poisoned"))?;
        let Some(tx) = queue.as_ref() else {
            return Err(LongshotError::unsupported("scheduler is shutting down"));
        };

        self.store.create(record)?;
        self.emit(TaskEvent::Submitted {
            task_id: record.task_id.clone(),
        });
        if tx.send(record.task_id.clone()).is_ok() {
            return Ok(());
        }

        if let Err(e) = self.store.delete(&record.task_id, &[]) {
            tracing::error!(task_id = %record.task_id, error = %e, "Failed to remove unqueued task");
        }
        self.emit(TaskEvent::Deleted {
            task_id: record.task_id.clone(),
        });
        Err(LongshotError::unsupported("scheduler is shutting down"))
    }

    fn enqueue(&self, task_id: String) -> LongshotResult<()> {
        let queue = self
            .queue
            .lock()
            .map_err(|_| LongshotError::storage("submission queue lock poisoned"))?;
        match queue.as_ref() {
            Some(tx) if tx.send(task_id).is_ok() => Ok(()),
            _ => Err(LongshotError::unsupported("scheduler is shutting down")),
        }
    }
}

/// Owns the worker slots and the dispatcher.
///
/// Must be started inside a Tokio runtime.
pub struct Scheduler {
    shared: Arc<Shared>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    /// Recover tasks left over by a previous run, then start dispatching.
    pub fn start(
        store: Arc<dyn TaskStore>,
        runner: Arc<dyn JobRunner>,
        config: SchedulerConfig,
    ) -> LongshotResult<Self> {
        if config.max_concurrency == 0 {
            return Err(LongshotError::config("max_concurrency must be at least 1"));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let shared = Arc::new(Shared {
            store,
            runner,
            config,
            queue: Mutex::new(Some(tx)),
            events,
            running: Mutex::new(HashMap::new()),
            stopping: AtomicBool::new(false),
        });

        recover(&shared)?;

        let slots = Arc::new(Semaphore::new(shared.config.max_concurrency));
        let dispatcher = tokio::spawn(dispatch(shared.clone(), rx, slots));

        tracing::info!(
            max_concurrency = shared.config.max_concurrency,
            runner = shared.runner.name(),
            "Scheduler started"
        );

        Ok(Self {
            shared,
            dispatcher: Mutex::new(Some(dispatcher)),
        })
    }

    /// Validate and queue a conversion. The scheduler owns the source file
    /// from here on.
    pub fn submit(&self, submission: Submission) -> LongshotResult<TaskStatusView> {
        if self.shared.stopping.load(Ordering::SeqCst) {
            return Err(LongshotError::unsupported("scheduler is shutting down"));
        }
        submission.config.validate()?;
        let file_size = check_source(&submission.source_path, self.shared.config.max_source_bytes)?;

        let file_name = submission.file_name.clone().unwrap_or_else(|| {
            submission
                .source_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        });
        let record = TaskRecord::pending(
            submission.source_path,
            file_name,
            file_size,
            submission.config,
        );

        self.shared.submit_new(&record)?;

        tracing::info!(
            task_id = %record.task_id,
            file = %record.file_name,
            size = record.file_size,
            "Task submitted"
        );
        Ok(record.status_view())
    }

    pub fn status(&self, task_id: &str) -> LongshotResult<TaskStatusView> {
        Ok(self.record(task_id)?.status_view())
    }

    /// Result files of a completed task, in output order.
    pub fn result(&self, task_id: &str) -> LongshotResult<Vec<PathBuf>> {
        query::completed_outputs(self.shared.store.as_ref(), task_id)
    }

    /// One result file of a completed task, by index.
    pub fn result_part(&self, task_id: &str, index: usize) -> LongshotResult<PathBuf> {
        query::output_part(self.shared.store.as_ref(), task_id, index)
    }

    pub fn list(&self, request: &PageRequest) -> LongshotResult<TaskPage> {
        self.shared.store.list(request)
    }

    /// Delete a task that is not running, with its result files.
    pub fn delete(&self, task_id: &str) -> LongshotResult<TaskRecord> {
        let record = query::delete_task(self.shared.store.as_ref(), task_id)?;
        self.shared.emit(TaskEvent::Deleted {
            task_id: task_id.to_string(),
        });
        Ok(record)
    }

    /// Stop a task early. Returns `false` if it had already finished.
    pub fn cancel(&self, task_id: &str) -> LongshotResult<bool> {
        if let Some(flag) = self.shared.running()?.get(task_id) {
            flag.store(true, Ordering::SeqCst);
            tracing::info!(task_id, "Cancellation requested");
            return Ok(true);
        }

        let record = self.record(task_id)?;
        if record.status == TaskStatus::Pending {
            let failed = self.shared.store.transition(
                task_id,
                TaskStatus::Pending,
                Transition::Fail {
                    message: LongshotError::Cancelled.to_string(),
                },
            )?;
            if failed {
                remove_source(&record.source_path);
                self.shared.emit(TaskEvent::Failed {
                    task_id: task_id.to_string(),
                    message: LongshotError::Cancelled.to_string(),
                });
                return Ok(true);
            }
            // Admitted in the meantime; its flag is registered by now.
            return self.cancel(task_id);
        }
        Ok(false)
    }

    /// Wait until the task reaches a terminal status.
    pub async fn wait(&self, task_id: &str) -> LongshotResult<TaskStatusView> {
        let mut events = self.shared.events.subscribe();
        loop {
            let view = self.status(task_id)?;
            if view.status.is_terminal() {
                return Ok(view);
            }
            loop {
                match events.recv().await {
                    Ok(event) if event.task_id() == task_id && event.is_final() => break,
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(_)) => break,
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(LongshotError::unsupported("scheduler stopped"))
                    }
                }
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.shared.events.subscribe()
    }

    /// Stop admitting tasks and wait for running ones to finish.
    ///
    /// Queued tasks stay `pending` and are picked up by the next start.
    pub async fn shutdown(&self) -> LongshotResult<()> {
        self.shared.stopping.store(true, Ordering::SeqCst);
        self.shared
            .queue
            .lock()
            .map_err(|_| LongshotError::storage("submission queue lock poisoned"))?
            .take();

        let handle = self
            .dispatcher
            .lock()
            .map_err(|_| LongshotError::storage("dispatcher handle lock poisoned"))?
            .take();
        if let Some(handle) = handle {
            handle
                .await
                .map_err(|e| LongshotError::Other(anyhow::anyhow!("dispatcher failed: {e}")))?;
        }
        tracing::info!("Scheduler stopped");
        Ok(())
    }

    fn record(&self, task_id: &str) -> LongshotResult<TaskRecord> {
        query::find(self.shared.store.as_ref(), task_id)
    }
}

/// Size of an acceptable source file.
fn check_source(path: &Path, max_bytes: u64) -> LongshotResult<u64> {
    let meta = std::fs::metadata(path).map_err(|e| {
        LongshotError::invalid_source(format!("cannot read {}: {e}", path.display()))
    })?;
    if !meta.is_file() {
        return Err(LongshotError::invalid_source(format!(
            "{} is not a file",
            path.display()
        )));
    }
    if meta.len() == 0 {
        return Err(LongshotError::invalid_source("file is empty"));
    }
    if meta.len() > max_bytes {
        return Err(LongshotError::invalid_source(format!(
            "file too large: {} bytes, maximum supported {}MB",
            meta.len(),
            max_bytes / (1024 * 1024)
        )));
    }
    Ok(meta.len())
}

fn recover(shared: &Shared) -> LongshotResult<()> {
    for task in shared.store.with_status(TaskStatus::Processing)? {
        let failed = shared.store.transition(
            &task.task_id,
            TaskStatus::Processing,
            Transition::Fail {
                message: INTERRUPTED_MESSAGE.to_string(),
            },
        )?;
        if failed {
            remove_source(&task.source_path);
            tracing::warn!(task_id = %task.task_id, "Marked interrupted task as failed");
        }
    }

    for task in shared.store.with_status(TaskStatus::Pending)? {
        if task.source_path.is_file() {
            shared.enqueue(task.task_id.clone())?;
            tracing::info!(task_id = %task.task_id, "Re-queued pending task");
        } else {
            shared.store.transition(
                &task.task_id,
                TaskStatus::Pending,
                Transition::Fail {
                    message: format!("source file missing: {}", task.source_path.display()),
                },
            )?;
            tracing::warn!(task_id = %task.task_id, "Pending task lost its source file");
        }
    }
    Ok(())
}

async fn dispatch(
    shared: Arc<Shared>,
    mut queue: mpsc::UnboundedReceiver<String>,
    slots: Arc<Semaphore>,
) {
    let mut workers = JoinSet::new();

    loop {
        tokio::select! {
            Some(joined) = workers.join_next(), if !workers.is_empty() => {
                if let Err(e) = joined {
                    tracing::error!(error = %e, "Worker task panicked");
                }
            }
            next = queue.recv() => {
                let Some(task_id) = next else { break };
                let Ok(permit) = slots.clone().acquire_owned().await else { break };
                if shared.stopping.load(Ordering::SeqCst) {
                    break;
                }
                if let Some((task, cancel)) = admit(&shared, &task_id) {
                    workers.spawn(run_worker(shared.clone(), task, cancel, permit));
                }
            }
        }
    }

    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            tracing::error!(error = %e, "Worker task panicked");
        }
    }
}

/// Move a queued task to `processing` and register its cancel flag.
/// `None` if it was deleted or cancelled while queued.
fn admit(shared: &Shared, task_id: &str) -> Option<(TaskRecord, Arc<AtomicBool>)> {
    let cancel = Arc::new(AtomicBool::new(false));
    // A concurrent cancel sees either the pending record or this flag.
    if let Ok(mut running) = shared.running() {
        running.insert(task_id.to_string(), cancel.clone());
    }
    let forget = || {
        if let Ok(mut running) = shared.running() {
            running.remove(task_id);
        }
    };

    match shared
        .store
        .transition(task_id, TaskStatus::Pending, Transition::Start)
    {
        Ok(true) => {}
        Ok(false) => {
            forget();
            tracing::debug!(task_id, "Skipping task that is no longer pending");
            return None;
        }
        Err(e) => {
            forget();
            tracing::error!(task_id, error = %e, "Failed to admit task");
            return None;
        }
    }

    match shared.store.get(task_id) {
        Ok(Some(task)) => {
            shared.emit(TaskEvent::Started {
                task_id: task_id.to_string(),
            });
            tracing::info!(task_id, "Task started");
            Some((task, cancel))
        }
        Ok(None) => {
            forget();
            None
        }
        Err(e) => {
            forget();
            tracing::error!(task_id, error = %e, "Failed to load admitted task");
            None
        }
    }
}

async fn run_worker(
    shared: Arc<Shared>,
    task: TaskRecord,
    cancel: Arc<AtomicBool>,
    _permit: tokio::sync::OwnedSemaphorePermit,
) {
    let task_id = task.task_id.clone();
    let runner = shared.runner.clone();
    let job = task.clone();
    let outcome = tokio::task::spawn_blocking(move || runner.run(&job, &cancel))
        .await
        .unwrap_or_else(|e| Err(LongshotError::Other(anyhow::anyhow!("worker panicked: {e}"))));

    if let Ok(mut running) = shared.running() {
        running.remove(&task_id);
    }
    remove_source(&task.source_path);

    let (transition, event) = match outcome {
        Ok(paths) => {
            let outputs = paths.len();
            (
                Transition::Complete { paths },
                TaskEvent::Completed {
                    task_id: task_id.clone(),
                    outputs,
                },
            )
        }
        Err(e) => {
            let message = e.to_string();
            tracing::warn!(task_id = %task_id, error = %message, "Task failed");
            (
                Transition::Fail {
                    message: message.clone(),
                },
                TaskEvent::Failed {
                    task_id: task_id.clone(),
                    message,
                },
            )
        }
    };

    record_outcome(&shared, &task_id, transition, event);
}

/// Persist the terminal state, retrying once as a failure if the first
/// write does not go through.
fn record_outcome(shared: &Shared, task_id: &str, transition: Transition, event: TaskEvent) {
    let written_paths = match &transition {
        Transition::Complete { paths } => paths.clone(),
        _ => Vec::new(),
    };

    let error = match shared
        .store
        .transition(task_id, TaskStatus::Processing, transition)
    {
        Ok(true) => {
            tracing::info!(task_id, event = ?event, "Task finished");
            shared.emit(event);
            return;
        }
        Ok(false) => {
            tracing::warn!(task_id, "Task left processing before its result was recorded");
            let _ = remove_outputs(&written_paths);
            return;
        }
        Err(e) => e,
    };

    tracing::error!(task_id, error = %error, "Failed to record task result, retrying as failure");
    let _ = remove_outputs(&written_paths);
    let message = format!("failed to record task result: {error}");
    match shared.store.transition(
        task_id,
        TaskStatus::Processing,
        Transition::Fail {
            message: message.clone(),
        },
    ) {
        Ok(true) => shared.emit(TaskEvent::Failed {
            task_id: task_id.to_string(),
            message,
        }),
        Ok(false) => {}
        Err(e) => tracing::error!(task_id, error = %e, "Failed to record task failure"),
    }
}

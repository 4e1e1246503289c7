use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use longshot_common::error::{LongshotError, LongshotResult};
use longshot_media::{FrameSampling, FrameSource, FrameStream};
use longshot_stitch_core::{synthetic, Frame, StitchConfig};
use longshot_task_queue::{
    JobRunner, MemoryTaskStore, PageRequest, Scheduler, SchedulerConfig, SqliteTaskStore,
    StitchRunner, Submission, TaskEvent, TaskRecord, TaskStatus, TaskStore, Transition,
};

const WAIT_LIMIT: Duration = Duration::from_secs(20);

/// Runner that sleeps, tracks concurrency and writes a small result file.
struct ProbeRunner {
    store: Arc<dyn TaskStore>,
    output_dir: PathBuf,
    delay: Duration,
    active: AtomicUsize,
    peak_active: AtomicUsize,
    peak_processing: AtomicUsize,
    started: Mutex<Vec<String>>,
}

impl ProbeRunner {
    fn new(store: Arc<dyn TaskStore>, output_dir: &Path, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            store,
            output_dir: output_dir.to_path_buf(),
            delay,
            active: AtomicUsize::new(0),
            peak_active: AtomicUsize::new(0),
            peak_processing: AtomicUsize::new(0),
            started: Mutex::new(Vec::new()),
        })
    }

    fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }
}

impl JobRunner for ProbeRunner {
    fn run(&self, task: &TaskRecord, cancel: &AtomicBool) -> LongshotResult<Vec<PathBuf>> {
        self.started.lock().unwrap().push(task.task_id.clone());
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_active.fetch_max(now, Ordering::SeqCst);
        let processing = self.store.with_status(TaskStatus::Processing)?.len();
        self.peak_processing.fetch_max(processing, Ordering::SeqCst);

        let mut waited = Duration::ZERO;
        let step = Duration::from_millis(5);
        let outcome = loop {
            if cancel.load(Ordering::SeqCst) {
                break Err(LongshotError::Cancelled);
            }
            if waited >= self.delay {
                break Ok(());
            }
            std::thread::sleep(step);
            waited += step;
        };
        self.active.fetch_sub(1, Ordering::SeqCst);
        outcome?;

        if task.file_name.starts_with("broken") {
            return Err(LongshotError::decode("not a video"));
        }
        let path = self.output_dir.join(format!("{}.jpg", task.task_id));
        std::fs::write(&path, b"jpeg")?;
        Ok(vec![path])
    }

    fn name(&self) -> &str {
        "probe"
    }
}

struct Fixture {
    dir: tempfile::TempDir,
    store: Arc<MemoryTaskStore>,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("uploads")).unwrap();
        std::fs::create_dir_all(dir.path().join("output")).unwrap();
        Self {
            dir,
            store: Arc::new(MemoryTaskStore::new()),
        }
    }

    fn upload(&self, name: &str) -> PathBuf {
        let path = self.dir.path().join("uploads").join(name);
        std::fs::write(&path, b"fake video payload").unwrap();
        path
    }

    fn output_dir(&self) -> PathBuf {
        self.dir.path().join("output")
    }

    fn runner(&self, delay_ms: u64) -> Arc<ProbeRunner> {
        ProbeRunner::new(
            self.store.clone(),
            &self.output_dir(),
            Duration::from_millis(delay_ms),
        )
    }

    fn start(&self, runner: Arc<ProbeRunner>, max_concurrency: usize) -> Scheduler {
        let config = SchedulerConfig {
            max_concurrency,
            ..Default::default()
        };
        Scheduler::start(self.store.clone(), runner, config).unwrap()
    }
}

async fn wait(scheduler: &Scheduler, task_id: &str) -> longshot_task_queue::TaskStatusView {
    tokio::time::timeout(WAIT_LIMIT, scheduler.wait(task_id))
        .await
        .expect("task did not finish in time")
        .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrency_never_exceeds_slot_count() {
    let fx = Fixture::new();
    let runner = fx.runner(80);
    let scheduler = fx.start(runner.clone(), 2);

    let mut ids = Vec::new();
    for i in 0..5 {
        let submission = Submission::new(fx.upload(&format!("{i}.mp4")), StitchConfig::default());
        ids.push(scheduler.submit(submission).unwrap().task_id);
    }
    for id in &ids {
        assert_eq!(wait(&scheduler, id).await.status, TaskStatus::Completed);
    }

    assert!(runner.peak_active.load(Ordering::SeqCst) <= 2);
    assert!(runner.peak_processing.load(Ordering::SeqCst) <= 2);
    assert_eq!(runner.started().len(), 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn tasks_are_admitted_in_submission_order() {
    let fx = Fixture::new();
    let runner = fx.runner(10);
    let scheduler = fx.start(runner.clone(), 1);

    let mut ids = Vec::new();
    for i in 0..4 {
        let submission = Submission::new(fx.upload(&format!("{i}.mp4")), StitchConfig::default());
        ids.push(scheduler.submit(submission).unwrap().task_id);
    }
    wait(&scheduler, &ids[3]).await;

    assert_eq!(runner.started(), ids);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn source_is_removed_whatever_the_outcome() {
    let fx = Fixture::new();
    let scheduler = fx.start(fx.runner(0), 2);

    let good = fx.upload("good.mp4");
    let bad = fx.upload("broken.mp4");
    let ok_id = scheduler
        .submit(Submission::new(&good, StitchConfig::default()))
        .unwrap()
        .task_id;
    let bad_id = scheduler
        .submit(Submission::new(&bad, StitchConfig::default()))
        .unwrap()
        .task_id;

    assert_eq!(wait(&scheduler, &ok_id).await.status, TaskStatus::Completed);
    let failed = wait(&scheduler, &bad_id).await;
    assert_eq!(failed.status, TaskStatus::Failed);
    assert!(failed.error_message.unwrap().contains("not a video"));
    assert!(failed.completed_at.is_some());

    assert!(!good.exists());
    assert!(!bad.exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn result_is_available_only_after_completion() {
    let fx = Fixture::new();
    let scheduler = fx.start(fx.runner(150), 1);

    let id = scheduler
        .submit(Submission::new(fx.upload("a.mp4"), StitchConfig::default()))
        .unwrap()
        .task_id;

    match scheduler.result(&id) {
        Err(LongshotError::TaskNotReady { status, .. }) => {
            assert!(status == "pending" || status == "processing")
        }
        other => panic!("expected not ready, got {other:?}"),
    }

    let view = wait(&scheduler, &id).await;
    assert_eq!(view.status, TaskStatus::Completed);
    let paths = scheduler.result(&id).unwrap();
    assert_eq!(paths, vec![fx.output_dir().join(format!("{id}.jpg"))]);
    assert!(paths[0].is_file());
    assert_eq!(scheduler.result_part(&id, 0).unwrap(), paths[0]);
    assert!(matches!(
        scheduler.result_part(&id, 3),
        Err(LongshotError::ResultMissing { .. })
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn deleting_a_completed_task_removes_its_files() {
    let fx = Fixture::new();
    let scheduler = fx.start(fx.runner(0), 1);

    let id = scheduler
        .submit(Submission::new(fx.upload("a.mp4"), StitchConfig::default()))
        .unwrap()
        .task_id;
    wait(&scheduler, &id).await;
    let paths = scheduler.result(&id).unwrap();

    let removed = scheduler.delete(&id).unwrap();
    assert_eq!(removed.status, TaskStatus::Completed);
    assert!(!paths[0].exists());

    assert!(scheduler.result(&id).unwrap_err().is_not_found());
    assert!(matches!(
        scheduler.delete(&id),
        Err(LongshotError::TaskNotFound { .. })
    ));
    assert!(matches!(
        scheduler.status(&id),
        Err(LongshotError::TaskNotFound { .. })
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn running_task_cannot_be_deleted_but_can_be_cancelled() {
    let fx = Fixture::new();
    let scheduler = fx.start(fx.runner(10_000), 1);
    let mut events = scheduler.subscribe();

    let id = scheduler
        .submit(Submission::new(fx.upload("long.mp4"), StitchConfig::default()))
        .unwrap()
        .task_id;
    loop {
        let event = tokio::time::timeout(WAIT_LIMIT, events.recv())
            .await
            .unwrap()
            .unwrap();
        if matches!(event, TaskEvent::Started { .. }) {
            break;
        }
    }

    assert!(matches!(
        scheduler.delete(&id),
        Err(LongshotError::TaskBusy { .. })
    ));
    assert!(scheduler.cancel(&id).unwrap());

    let view = wait(&scheduler, &id).await;
    assert_eq!(view.status, TaskStatus::Failed);
    assert!(view.error_message.unwrap().contains("cancelled"));
    assert!(!scheduler.cancel(&id).unwrap());
    scheduler.delete(&id).unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn queued_task_can_be_deleted_before_admission() {
    let fx = Fixture::new();
    let runner = fx.runner(300);
    let scheduler = fx.start(runner.clone(), 1);

    let first = scheduler
        .submit(Submission::new(fx.upload("a.mp4"), StitchConfig::default()))
        .unwrap()
        .task_id;
    let queued_source = fx.upload("b.mp4");
    let queued = scheduler
        .submit(Submission::new(&queued_source, StitchConfig::default()))
        .unwrap()
        .task_id;

    let removed = scheduler.delete(&queued).unwrap();
    assert_eq!(removed.status, TaskStatus::Pending);
    assert!(!queued_source.exists());

    wait(&scheduler, &first).await;
    scheduler.shutdown().await.unwrap();
    assert_eq!(runner.started(), vec![first]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn events_follow_the_lifecycle() {
    let fx = Fixture::new();
    let scheduler = fx.start(fx.runner(0), 1);
    let mut events = scheduler.subscribe();

    let id = scheduler
        .submit(Submission::new(fx.upload("a.mp4"), StitchConfig::default()))
        .unwrap()
        .task_id;

    let mut seen = Vec::new();
    while seen.len() < 3 {
        let event = tokio::time::timeout(WAIT_LIMIT, events.recv())
            .await
            .unwrap()
            .unwrap();
        seen.push(event);
    }
    assert_eq!(
        seen,
        vec![
            TaskEvent::Submitted {
                task_id: id.clone()
            },
            TaskEvent::Started {
                task_id: id.clone()
            },
            TaskEvent::Completed {
                task_id: id,
                outputs: 1
            },
        ]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn invalid_submissions_create_no_task() {
    let fx = Fixture::new();
    let config = SchedulerConfig {
        max_source_bytes: 10,
        ..Default::default()
    };
    let scheduler = Scheduler::start(fx.store.clone(), fx.runner(0), config).unwrap();

    let bad_config = StitchConfig {
        approx_diff: -1.0,
        ..Default::default()
    };
    assert!(matches!(
        scheduler.submit(Submission::new(fx.upload("a.mp4"), bad_config)),
        Err(LongshotError::Config { .. })
    ));

    let empty = fx.dir.path().join("uploads").join("empty.mp4");
    std::fs::write(&empty, b"").unwrap();
    let err = scheduler
        .submit(Submission::new(&empty, StitchConfig::default()))
        .unwrap_err();
    assert!(err.to_string().contains("empty"));

    let err = scheduler
        .submit(Submission::new(fx.upload("big.mp4"), StitchConfig::default()))
        .unwrap_err();
    assert!(matches!(err, LongshotError::InvalidSource { .. }));

    let err = scheduler
        .submit(Submission::new(fx.dir.path().join("nope.mp4"), StitchConfig::default()))
        .unwrap_err();
    assert!(matches!(err, LongshotError::InvalidSource { .. }));

    let listing = scheduler.list(&PageRequest::default()).unwrap();
    assert_eq!(listing.total_count, 0);
    assert_eq!(listing.total_pages, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn zero_slots_is_rejected() {
    let fx = Fixture::new();
    let config = SchedulerConfig {
        max_concurrency: 0,
        ..Default::default()
    };
    assert!(matches!(
        Scheduler::start(fx.store.clone(), fx.runner(0), config),
        Err(LongshotError::Config { .. })
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn restart_recovers_leftover_tasks() {
    let fx = Fixture::new();

    let interrupted_source = fx.upload("interrupted.mp4");
    let interrupted = TaskRecord::pending(
        interrupted_source.clone(),
        "interrupted.mp4".into(),
        18,
        StitchConfig::default(),
    );
    fx.store.create(&interrupted).unwrap();
    fx.store
        .transition(&interrupted.task_id, TaskStatus::Pending, Transition::Start)
        .unwrap();

    let waiting = TaskRecord::pending(
        fx.upload("waiting.mp4"),
        "waiting.mp4".into(),
        18,
        StitchConfig::default(),
    );
    fx.store.create(&waiting).unwrap();

    let orphan = TaskRecord::pending(
        fx.dir.path().join("uploads").join("gone.mp4"),
        "gone.mp4".into(),
        18,
        StitchConfig::default(),
    );
    fx.store.create(&orphan).unwrap();

    let scheduler = fx.start(fx.runner(0), 2);

    let view = scheduler.status(&interrupted.task_id).unwrap();
    assert_eq!(view.status, TaskStatus::Failed);
    assert!(view.error_message.unwrap().starts_with("interrupted"));
    assert!(!interrupted_source.exists());

    let view = scheduler.status(&orphan.task_id).unwrap();
    assert_eq!(view.status, TaskStatus::Failed);

    assert_eq!(
        wait(&scheduler, &waiting.task_id).await.status,
        TaskStatus::Completed
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_leaves_queued_tasks_pending() {
    let fx = Fixture::new();
    let scheduler = fx.start(fx.runner(200), 1);
    let mut events = scheduler.subscribe();

    let ids: Vec<String> = (0..3)
        .map(|i| {
            let submission =
                Submission::new(fx.upload(&format!("{i}.mp4")), StitchConfig::default());
            scheduler.submit(submission).unwrap().task_id
        })
        .collect();
    loop {
        let event = tokio::time::timeout(WAIT_LIMIT, events.recv())
            .await
            .unwrap()
            .unwrap();
        if matches!(event, TaskEvent::Started { .. }) {
            break;
        }
    }

    tokio::time::timeout(WAIT_LIMIT, scheduler.shutdown())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(scheduler.status(&ids[0]).unwrap().status, TaskStatus::Completed);
    assert_eq!(scheduler.status(&ids[1]).unwrap().status, TaskStatus::Pending);
    assert_eq!(scheduler.status(&ids[2]).unwrap().status, TaskStatus::Pending);
    assert!(scheduler
        .submit(Submission::new(fx.upload("late.mp4"), StitchConfig::default()))
        .is_err());
}

/// Serves a fixed synthetic recording for any path.
struct ScriptedSource {
    frames: Vec<Frame>,
}

impl FrameSource for ScriptedSource {
    fn frames(&self, _path: &Path, _sampling: &FrameSampling) -> LongshotResult<FrameStream> {
        Ok(Box::new(self.frames.clone().into_iter().map(Ok)))
    }

    fn is_available(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stitch_runner_persists_across_restart() {
    let fx = Fixture::new();
    let db_path = fx.dir.path().join("tasks.db");
    let page = synthetic::document(32, 600, 8);
    let source = Arc::new(ScriptedSource {
        frames: synthetic::vertical_recording(&page, 100, &[0, 30, 60, 90]),
    });

    let id = {
        let store = Arc::new(SqliteTaskStore::open(&db_path).unwrap());
        let runner = Arc::new(StitchRunner::new(source.clone(), fx.output_dir()));
        let scheduler = Scheduler::start(store, runner, SchedulerConfig::default()).unwrap();
        let id = scheduler
            .submit(
                Submission::new(fx.upload("page.mp4"), StitchConfig::default())
                    .with_file_name("page recording.mp4"),
            )
            .unwrap()
            .task_id;
        assert_eq!(wait(&scheduler, &id).await.status, TaskStatus::Completed);
        scheduler.shutdown().await.unwrap();
        id
    };

    let store = Arc::new(SqliteTaskStore::open(&db_path).unwrap());
    let runner = Arc::new(StitchRunner::new(source, fx.output_dir()));
    let scheduler = Scheduler::start(store, runner, SchedulerConfig::default()).unwrap();

    let paths = scheduler.result(&id).unwrap();
    assert_eq!(paths, vec![fx.output_dir().join(format!("{id}.jpg"))]);
    let image = image::open(&paths[0]).unwrap();
    assert_eq!(image.width(), 32);

    let listing = scheduler.list(&PageRequest::default()).unwrap();
    assert_eq!(listing.tasks.len(), 1);
    assert_eq!(listing.tasks[0].file_name, "page recording.mp4");
}

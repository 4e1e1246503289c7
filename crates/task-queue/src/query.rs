//! Store-level task operations shared by the scheduler and offline tools.
//!
//! None of these touch running workers, so they are safe to call from a
//! process that does not own the queue.

use std::path::{Path, PathBuf};

use longshot_common::error::{LongshotError, LongshotResult};
use longshot_media::{output_paths, remove_outputs};

use crate::store::{Deletion, TaskStore};
use crate::task::{TaskRecord, TaskStatus};

/// The task's record, or `TaskNotFound`.
pub fn find(store: &dyn TaskStore, task_id: &str) -> LongshotResult<TaskRecord> {
    store
        .get(task_id)?
        .ok_or_else(|| LongshotError::not_found(task_id))
}

/// Result files of a completed task, in output order.
pub fn completed_outputs(store: &dyn TaskStore, task_id: &str) -> LongshotResult<Vec<PathBuf>> {
    let record = find(store, task_id)?;
    if record.status != TaskStatus::Completed {
        return Err(LongshotError::TaskNotReady {
            task_id: task_id.to_string(),
            status: record.status.to_string(),
        });
    }
    if let Some(missing) = record.result_paths.iter().find(|p| !p.is_file()) {
        return Err(LongshotError::ResultMissing {
            path: missing.clone(),
        });
    }
    Ok(record.result_paths)
}

/// One result file of a completed task, by index.
pub fn output_part(store: &dyn TaskStore, task_id: &str, index: usize) -> LongshotResult<PathBuf> {
    let paths = completed_outputs(store, task_id)?;
    if let Some(path) = paths.get(index) {
        return Ok(path.clone());
    }
    let path = paths
        .first()
        .and_then(|first| output_paths(first, index + 1).pop())
        .unwrap_or_else(|| PathBuf::from(format!("{task_id}#{index}")));
    Err(LongshotError::ResultMissing { path })
}

/// Delete a task that is not running, with its result files. A pending
/// task's staged source goes too.
pub fn delete_task(store: &dyn TaskStore, task_id: &str) -> LongshotResult<TaskRecord> {
    let record = match store.delete(task_id, &[TaskStatus::Processing])? {
        Deletion::Removed(record) => record,
        Deletion::NotFound => return Err(LongshotError::not_found(task_id)),
        Deletion::Refused(_) => {
            return Err(LongshotError::TaskBusy {
                task_id: task_id.to_string(),
            })
        }
    };

    if let Err(e) = remove_outputs(&record.result_paths) {
        tracing::warn!(task_id, error = %e, "Failed to remove result files");
    }
    if record.status == TaskStatus::Pending {
        remove_source(&record.source_path);
    }
    tracing::info!(task_id, status = %record.status, "Task deleted");
    Ok(record)
}

pub(crate) fn remove_source(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!(path = %path.display(), "Removed source file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to remove source file"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryTaskStore;
    use crate::task::Transition;
    use longshot_stitch_core::StitchConfig;

    fn seeded(store: &MemoryTaskStore, source: PathBuf) -> TaskRecord {
        let record = TaskRecord::pending(source, "clip.mp4".into(), 4, StitchConfig::default());
        store.create(&record).unwrap();
        record
    }

    #[test]
    fn test_missing_task_is_not_found() {
        let store = MemoryTaskStore::new();
        assert!(find(&store, "nope").unwrap_err().is_not_found());
        assert!(delete_task(&store, "nope").unwrap_err().is_not_found());
    }

    #[test]
    fn test_outputs_require_completion_and_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryTaskStore::new();
        let record = seeded(&store, dir.path().join("clip.mp4"));

        let err = completed_outputs(&store, &record.task_id).unwrap_err();
        assert!(err.to_string().contains("pending"));

        let out = dir.path().join("out.jpg");
        store
            .transition(&record.task_id, TaskStatus::Pending, Transition::Start)
            .unwrap();
        store
            .transition(
                &record.task_id,
                TaskStatus::Processing,
                Transition::Complete {
                    paths: vec![out.clone()],
                },
            )
            .unwrap();
        assert!(matches!(
            completed_outputs(&store, &record.task_id),
            Err(LongshotError::ResultMissing { .. })
        ));

        std::fs::write(&out, b"jpeg").unwrap();
        assert_eq!(output_part(&store, &record.task_id, 0).unwrap(), out);
        match output_part(&store, &record.task_id, 2) {
            Err(LongshotError::ResultMissing { path }) => {
                assert_eq!(path, dir.path().join("out_2.jpg"))
            }
            other => panic!("expected missing part, got {other:?}"),
        }
    }

    #[test]
    fn test_delete_pending_removes_source() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("clip.mp4");
        std::fs::write(&source, b"data").unwrap();
        let store = MemoryTaskStore::new();
        let record = seeded(&store, source.clone());

        let removed = delete_task(&store, &record.task_id).unwrap();
        assert_eq!(removed.task_id, record.task_id);
        assert!(!source.exists());
        assert!(store.get(&record.task_id).unwrap().is_none());
    }

    #[test]
    fn test_delete_processing_is_refused() {
        let store = MemoryTaskStore::new();
        let record = seeded(&store, PathBuf::from("/nonexistent/clip.mp4"));
        store
            .transition(&record.task_id, TaskStatus::Pending, Transition::Start)
            .unwrap();

        assert!(matches!(
            delete_task(&store, &record.task_id),
            Err(LongshotError::TaskBusy { .. })
        ));
        assert!(store.get(&record.task_id).unwrap().is_some());
    }
}

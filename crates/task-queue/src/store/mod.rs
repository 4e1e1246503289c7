//! Durable task storage.
//!
//! Status changes are compare-and-set: the caller names the status it
//! expects the task to be in, and the update only applies if it still is.
//! Status and result fields therefore always change together.

mod memory;
mod sqlite;

pub use memory::MemoryTaskStore;
pub use sqlite::SqliteTaskStore;

use longshot_common::error::LongshotResult;

use crate::page::{PageRequest, TaskPage};
use crate::task::{TaskRecord, TaskStatus, Transition};

/// Outcome of a delete request.
#[derive(Debug, Clone, PartialEq)]
pub enum Deletion {
    /// The record was removed; this is its last state.
    Removed(TaskRecord),
    NotFound,
    /// Left in place because it was in a refused status.
    Refused(TaskStatus),
}

/// Storage for task records.
pub trait TaskStore: Send + Sync {
    /// Insert a new record. Fails if the id already exists.
    fn create(&self, record: &TaskRecord) -> LongshotResult<()>;

    fn get(&self, task_id: &str) -> LongshotResult<Option<TaskRecord>>;

    /// Apply `transition` if the task is currently in `from`.
    ///
    /// Returns `false` when the task is missing or in another status.
    fn transition(
        &self,
        task_id: &str,
        from: TaskStatus,
        transition: Transition,
    ) -> LongshotResult<bool>;

    /// Remove a record unless its status is in `refuse`.
    fn delete(&self, task_id: &str, refuse: &[TaskStatus]) -> LongshotResult<Deletion>;

    /// A page of tasks, newest first.
    fn list(&self, request: &PageRequest) -> LongshotResult<TaskPage>;

    /// Every task in `status`, oldest first.
    fn with_status(&self, status: TaskStatus) -> LongshotResult<Vec<TaskRecord>>;
}

#[cfg(test)]
pub(crate) mod contract {
    //! Behavior every store must share, run against each implementation.

    use std::path::PathBuf;

    use chrono::{Duration, Utc};

    use longshot_stitch_core::StitchConfig;

    use super::*;

    pub fn record_at(name: &str, seconds: i64) -> TaskRecord {
        let mut record = TaskRecord::pending(
            PathBuf::from(format!("/uploads/{name}")),
            name.to_string(),
            2048,
            StitchConfig::default(),
        );
        record.created_at = Utc::now() - Duration::seconds(1_000) + Duration::seconds(seconds);
        record
    }

    pub fn create_get_roundtrip(store: &dyn TaskStore) {
        let record = record_at("a.mp4", 0);
        store.create(&record).unwrap();
        let loaded = store.get(&record.task_id).unwrap().unwrap();
        assert_eq!(loaded.task_id, record.task_id);
        assert_eq!(loaded.status, TaskStatus::Pending);
        assert_eq!(loaded.file_name, "a.mp4");
        assert_eq!(loaded.config, record.config);
        assert!(store.get("missing").unwrap().is_none());
        assert!(store.create(&record).is_err());
    }

    pub fn transitions_are_compare_and_set(store: &dyn TaskStore) {
        let record = record_at("b.mp4", 0);
        store.create(&record).unwrap();
        let id = record.task_id.as_str();

        assert!(!store
            .transition(id, TaskStatus::Processing, Transition::Start)
            .unwrap());
        assert!(store.transition(id, TaskStatus::Pending, Transition::Start).unwrap());
        assert!(!store.transition(id, TaskStatus::Pending, Transition::Start).unwrap());

        let paths = vec![PathBuf::from("/out/b.jpg"), PathBuf::from("/out/b_1.jpg")];
        assert!(store
            .transition(
                id,
                TaskStatus::Processing,
                Transition::Complete {
                    paths: paths.clone()
                }
            )
            .unwrap());

        let done = store.get(id).unwrap().unwrap();
        assert_eq!(done.status, TaskStatus::Completed);
        assert_eq!(done.result_paths, paths);
        assert!(done.completed_at.is_some());
        assert!(!store
            .transition(
                id,
                TaskStatus::Processing,
                Transition::Fail {
                    message: "late".into()
                }
            )
            .unwrap());
        assert!(!store.transition("missing", TaskStatus::Pending, Transition::Start).unwrap());
    }

    pub fn delete_respects_refusals(store: &dyn TaskStore) {
        let record = record_at("c.mp4", 0);
        store.create(&record).unwrap();
        let id = record.task_id.as_str();
        store.transition(id, TaskStatus::Pending, Transition::Start).unwrap();

        assert_eq!(
            store.delete(id, &[TaskStatus::Processing]).unwrap(),
            Deletion::Refused(TaskStatus::Processing)
        );
        match store.delete(id, &[]).unwrap() {
            Deletion::Removed(last) => assert_eq!(last.status, TaskStatus::Processing),
            other => panic!("expected removal, got {other:?}"),
        }
        assert_eq!(store.delete(id, &[]).unwrap(), Deletion::NotFound);
    }

    pub fn list_pages_newest_first(store: &dyn TaskStore) {
        let mut ids = Vec::new();
        for i in 0..50 {
            let record = record_at(&format!("{i}.mp4"), i);
            store.create(&record).unwrap();
            ids.push(record.task_id);
        }
        ids.reverse();

        let mut seen = Vec::new();
        for page in 1..=3 {
            let listing = store.list(&PageRequest::new(page, 20).unwrap()).unwrap();
            assert_eq!(listing.total_count, 50);
            assert_eq!(listing.total_pages, 3);
            assert_eq!(listing.page, page);
            let expected = if page == 3 { 10 } else { 20 };
            assert_eq!(listing.tasks.len(), expected);
            seen.extend(listing.tasks.into_iter().map(|t| t.task_id));
        }
        assert_eq!(seen, ids);

        let beyond = store.list(&PageRequest::new(4, 20).unwrap()).unwrap();
        assert!(beyond.tasks.is_empty());
    }

    pub fn equal_timestamps_keep_insertion_order(store: &dyn TaskStore) {
        let first = record_at("x.mp4", 5);
        let mut second = record_at("y.mp4", 5);
        second.created_at = first.created_at;
        store.create(&first).unwrap();
        store.create(&second).unwrap();

        let listing = store.list(&PageRequest::default()).unwrap();
        assert_eq!(listing.tasks[0].task_id, second.task_id);
        assert_eq!(listing.tasks[1].task_id, first.task_id);

        let pending = store.with_status(TaskStatus::Pending).unwrap();
        assert_eq!(pending[0].task_id, first.task_id);
    }

    pub fn empty_listing_has_one_page(store: &dyn TaskStore) {
        let listing = store.list(&PageRequest::default()).unwrap();
        assert_eq!(listing.total_count, 0);
        assert_eq!(listing.total_pages, 1);
    }
}

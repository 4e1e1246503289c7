use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;

use longshot_common::error::{LongshotError, LongshotResult};

use super::{Deletion, TaskStore};
use crate::page::{PageRequest, TaskPage};
use crate::task::{TaskRecord, TaskStatus, Transition};

/// In-process task store. Contents are lost when it is dropped.
#[derive(Debug, Default)]
pub struct MemoryTaskStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    /// Records keyed by id, with their insertion sequence number.
    tasks: HashMap<String, (u64, TaskRecord)>,
    next_seq: u64,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> LongshotResult<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| LongshotError::storage("task store lock poisoned"))
    }
}

impl Inner {
    /// Records ordered by creation time, ties by insertion order.
    fn ordered(&self) -> Vec<&(u64, TaskRecord)> {
        let mut rows: Vec<_> = self.tasks.values().collect();
        rows.sort_by(|(sa, a), (sb, b)| a.created_at.cmp(&b.created_at).then(sa.cmp(sb)));
        rows
    }
}

impl TaskStore for MemoryTaskStore {
    fn create(&self, record: &TaskRecord) -> LongshotResult<()> {
        let mut inner = self.lock()?;
        if inner.tasks.contains_key(&record.task_id) {
            return Err(LongshotError::storage(format!(
                "task {} already exists",
                record.task_id
            )));
        }
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner
            .tasks
            .insert(record.task_id.clone(), (seq, record.clone()));
        Ok(())
    }

    fn get(&self, task_id: &str) -> LongshotResult<Option<TaskRecord>> {
        Ok(self.lock()?.tasks.get(task_id).map(|(_, r)| r.clone()))
    }

    fn transition(
        &self,
        task_id: &str,
        from: TaskStatus,
        transition: Transition,
    ) -> LongshotResult<bool> {
        let mut inner = self.lock()?;
        match inner.tasks.get_mut(task_id) {
            Some((_, record)) if record.status == from => {
                record.apply(transition, Utc::now())?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn delete(&self, task_id: &str, refuse: &[TaskStatus]) -> LongshotResult<Deletion> {
        let mut inner = self.lock()?;
        let Some((_, record)) = inner.tasks.get(task_id) else {
            return Ok(Deletion::NotFound);
        };
        if refuse.contains(&record.status) {
            return Ok(Deletion::Refused(record.status));
        }
        Ok(inner
            .tasks
            .remove(task_id)
            .map(|(_, record)| Deletion::Removed(record))
            .unwrap_or(Deletion::NotFound))
    }

    fn list(&self, request: &PageRequest) -> LongshotResult<TaskPage> {
        let inner = self.lock()?;
        let total = inner.tasks.len() as u64;
        let tasks = inner
            .ordered()
            .into_iter()
            .rev()
            .skip(request.offset() as usize)
            .take(request.page_size() as usize)
            .map(|(_, record)| record.summary())
            .collect();
        Ok(TaskPage::new(tasks, total, request))
    }

    fn with_status(&self, status: TaskStatus) -> LongshotResult<Vec<TaskRecord>> {
        let inner = self.lock()?;
        Ok(inner
            .ordered()
            .into_iter()
            .filter(|(_, record)| record.status == status)
            .map(|(_, record)| record.clone())
            .collect())
    }
}

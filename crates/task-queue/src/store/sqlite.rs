use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use longshot_common::error::{LongshotError, LongshotResult};

use super::{Deletion, TaskStore};
use crate::page::{PageRequest, TaskPage};
use crate::task::{TaskRecord, TaskStatus, Transition};

const COLUMNS: &str = "task_id, status, created_at, completed_at, result_paths, \
                       error_message, file_name, file_size, source_path, config";

/// Task store backed by a single SQLite table.
///
/// Timestamps are stored as RFC 3339 UTC strings with microseconds, so
/// ordering by the text column is chronological; ties fall back to the
/// insertion rowid.
pub struct SqliteTaskStore {
    conn: Mutex<Connection>,
}

fn db_err(err: rusqlite::Error) -> LongshotError {
    LongshotError::storage(err.to_string())
}

fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> LongshotResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| LongshotError::storage(format!("corrupt timestamp '{raw}': {e}")))
}

/// Raw column values of one row, decoded outside the rusqlite callback.
struct RawTask {
    task_id: String,
    status: String,
    created_at: String,
    completed_at: Option<String>,
    result_paths: String,
    error_message: Option<String>,
    file_name: String,
    file_size: i64,
    source_path: String,
    config: String,
}

impl RawTask {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            task_id: row.get(0)?,
            status: row.get(1)?,
            created_at: row.get(2)?,
            completed_at: row.get(3)?,
            result_paths: row.get(4)?,
            error_message: row.get(5)?,
            file_name: row.get(6)?,
            file_size: row.get(7)?,
            source_path: row.get(8)?,
            config: row.get(9)?,
        })
    }

    fn decode(self) -> LongshotResult<TaskRecord> {
        Ok(TaskRecord {
            status: self.status.parse()?,
            created_at: parse_timestamp(&self.created_at)?,
            completed_at: self
                .completed_at
                .as_deref()
                .map(parse_timestamp)
                .transpose()?,
            result_paths: serde_json::from_str(&self.result_paths)?,
            error_message: self.error_message,
            file_name: self.file_name,
            file_size: u64::try_from(self.file_size).unwrap_or_default(),
            source_path: PathBuf::from(self.source_path),
            config: serde_json::from_str(&self.config)?,
            task_id: self.task_id,
        })
    }
}

impl SqliteTaskStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: &Path) -> LongshotResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(db_err)?;
        Self::with_connection(conn)
    }

    /// A private in-memory database.
    pub fn open_in_memory() -> LongshotResult<Self> {
        Self::with_connection(Connection::open_in_memory().map_err(db_err)?)
    }

    fn with_connection(conn: Connection) -> LongshotResult<Self> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.ensure_schema()?;
        Ok(store)
    }

    fn lock(&self) -> LongshotResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| LongshotError::storage("task database lock poisoned"))
    }

    fn ensure_schema(&self) -> LongshotResult<()> {
        self.lock()?
            .execute_batch(
                r#"
                PRAGMA journal_mode=WAL;
                PRAGMA busy_timeout=5000;

                CREATE TABLE IF NOT EXISTS tasks (
                  id INTEGER PRIMARY KEY AUTOINCREMENT,
                  task_id TEXT NOT NULL UNIQUE,
                  status TEXT NOT NULL,
                  created_at TEXT NOT NULL,
                  completed_at TEXT,
                  result_paths TEXT NOT NULL DEFAULT '[]',
                  error_message TEXT,
                  file_name TEXT NOT NULL,
                  file_size INTEGER NOT NULL,
                  source_path TEXT NOT NULL,
                  config TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_tasks_created ON tasks(created_at);
                CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);
                "#,
            )
            .map_err(db_err)
    }

    fn fetch(conn: &Connection, task_id: &str) -> LongshotResult<Option<TaskRecord>> {
        conn.query_row(
            &format!("SELECT {COLUMNS} FROM tasks WHERE task_id = ?1"),
            params![task_id],
            RawTask::from_row,
        )
        .optional()
        .map_err(db_err)?
        .map(RawTask::decode)
        .transpose()
    }
}

impl TaskStore for SqliteTaskStore {
    fn create(&self, record: &TaskRecord) -> LongshotResult<()> {
        let result_paths = serde_json::to_string(&record.result_paths)?;
        let config = serde_json::to_string(&record.config)?;
        let file_size = i64::try_from(record.file_size)
            .map_err(|_| LongshotError::storage("file size exceeds i64 range"))?;

        self.lock()?
            .execute(
                &format!(
                    "INSERT INTO tasks ({COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
                ),
                params![
                    record.task_id,
                    record.status.as_str(),
                    timestamp(&record.created_at),
                    record.completed_at.as_ref().map(timestamp),
                    result_paths,
                    record.error_message,
                    record.file_name,
                    file_size,
                    record.source_path.to_string_lossy().into_owned(),
                    config,
                ],
            )
            .map_err(db_err)?;
        Ok(())
    }

    fn get(&self, task_id: &str) -> LongshotResult<Option<TaskRecord>> {
        let conn = self.lock()?;
        Self::fetch(&conn, task_id)
    }

    fn transition(
        &self,
        task_id: &str,
        from: TaskStatus,
        transition: Transition,
    ) -> LongshotResult<bool> {
        let to = transition.target();
        if !from.can_transition_to(to) {
            return Err(LongshotError::storage(format!(
                "task {task_id} cannot move from {from} to {to}"
            )));
        }

        let conn = self.lock()?;
        let now = timestamp(&Utc::now());
        let changed = match transition {
            Transition::Start => conn.execute(
                "UPDATE tasks SET status = ?1 WHERE task_id = ?2 AND status = ?3",
                params![to.as_str(), task_id, from.as_str()],
            ),
            Transition::Complete { paths } => conn.execute(
                "UPDATE tasks SET status = ?1, completed_at = ?2, result_paths = ?3 \
                 WHERE task_id = ?4 AND status = ?5",
                params![
                    to.as_str(),
                    now,
                    serde_json::to_string(&paths)?,
                    task_id,
                    from.as_str()
                ],
            ),
            Transition::Fail { message } => conn.execute(
                "UPDATE tasks SET status = ?1, completed_at = ?2, error_message = ?3 \
                 WHERE task_id = ?4 AND status = ?5",
                params![to.as_str(), now, message, task_id, from.as_str()],
            ),
        }
        .map_err(db_err)?;
        Ok(changed == 1)
    }

    fn delete(&self, task_id: &str, refuse: &[TaskStatus]) -> LongshotResult<Deletion> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(db_err)?;

        let Some(record) = Self::fetch(&tx, task_id)? else {
            return Ok(Deletion::NotFound);
        };
        if refuse.contains(&record.status) {
            return Ok(Deletion::Refused(record.status));
        }
        tx.execute("DELETE FROM tasks WHERE task_id = ?1", params![task_id])
            .map_err(db_err)?;
        tx.commit().map_err(db_err)?;
        Ok(Deletion::Removed(record))
    }

    fn list(&self, request: &PageRequest) -> LongshotResult<TaskPage> {
        let conn = self.lock()?;
        let total: i64 = conn
            .query_row("SELECT COUNT(*) FROM tasks", [], |row| row.get(0))
            .map_err(db_err)?;

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {COLUMNS} FROM tasks \
                 ORDER BY created_at DESC, id DESC LIMIT ?1 OFFSET ?2"
            ))
            .map_err(db_err)?;
        let rows = stmt
            .query_map(
                params![request.page_size() as i64, request.offset() as i64],
                RawTask::from_row,
            )
            .map_err(db_err)?;

        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(row.map_err(db_err)?.decode()?.summary());
        }
        Ok(TaskPage::new(tasks, total.max(0) as u64, request))
    }

    fn with_status(&self, status: TaskStatus) -> LongshotResult<Vec<TaskRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {COLUMNS} FROM tasks WHERE status = ?1 ORDER BY created_at ASC, id ASC"
            ))
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![status.as_str()], RawTask::from_row)
            .map_err(db_err)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row.map_err(db_err)?.decode()?);
        }
        Ok(records)
    }
}

//! Task records and their lifecycle.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use longshot_common::error::{LongshotError, LongshotResult};
use longshot_stitch_core::StitchConfig;

/// Lifecycle state of a conversion task.
///
/// `pending -> processing -> {completed, failed}`. A pending task may also
/// fail directly, when it is cancelled or its source disappears before it
/// is admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Pending, Self::Failed)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Failed)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = LongshotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(LongshotError::storage(format!("unknown task status '{other}'"))),
        }
    }
}

/// A state change applied to a task record.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Admitted to a worker slot.
    Start,
    /// Finished with the written outputs.
    Complete { paths: Vec<PathBuf> },
    /// Finished with an error.
    Fail { message: String },
}

impl Transition {
    pub fn target(&self) -> TaskStatus {
        match self {
            Self::Start => TaskStatus::Processing,
            Self::Complete { .. } => TaskStatus::Completed,
            Self::Fail { .. } => TaskStatus::Failed,
        }
    }
}

/// Everything persisted about one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result_paths: Vec<PathBuf>,
    pub error_message: Option<String>,
    pub file_name: String,
    pub file_size: u64,
    /// Uploaded video; removed once the task has run.
    pub source_path: PathBuf,
    pub config: StitchConfig,
}

impl TaskRecord {
    /// A new pending task with a fresh v4 id.
    pub fn pending(
        source_path: PathBuf,
        file_name: String,
        file_size: u64,
        config: StitchConfig,
    ) -> Self {
        Self {
            task_id: uuid::Uuid::new_v4().to_string(),
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            completed_at: None,
            result_paths: Vec::new(),
            error_message: None,
            file_name,
            file_size,
            source_path,
            config,
        }
    }

    /// Apply `transition` in place, stamping `completed_at` on terminal
    /// states.
    pub fn apply(&mut self, transition: Transition, at: DateTime<Utc>) -> LongshotResult<()> {
        let next = transition.target();
        if !self.status.can_transition_to(next) {
            return Err(LongshotError::storage(format!(
                "task {} cannot move from {} to {next}",
                self.task_id, self.status
            )));
        }
        self.status = next;
        match transition {
            Transition::Start => {}
            Transition::Complete { paths } => {
                self.result_paths = paths;
                self.completed_at = Some(at);
            }
            Transition::Fail { message } => {
                self.error_message = Some(message);
                self.completed_at = Some(at);
            }
        }
        Ok(())
    }

    pub fn status_view(&self) -> TaskStatusView {
        TaskStatusView {
            task_id: self.task_id.clone(),
            status: self.status,
            created_at: self.created_at,
            completed_at: self.completed_at,
            error_message: self.error_message.clone(),
        }
    }

    pub fn summary(&self) -> TaskSummary {
        TaskSummary {
            task_id: self.task_id.clone(),
            status: self.status,
            created_at: self.created_at,
            completed_at: self.completed_at,
            file_name: self.file_name.clone(),
            file_size: self.file_size,
        }
    }
}

/// What a status query returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatusView {
    pub task_id: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

/// One row of a task listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub task_id: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub file_name: String,
    pub file_size: u64,
}

/// A request to convert one video.
#[derive(Debug, Clone)]
pub struct Submission {
    /// Video to convert. The scheduler takes ownership and deletes it
    /// after the task runs.
    pub source_path: PathBuf,
    /// Display name; defaults to the source file name.
    pub file_name: Option<String>,
    pub config: StitchConfig,
}

impl Submission {
    pub fn new(source_path: impl Into<PathBuf>, config: StitchConfig) -> Self {
        Self {
            source_path: source_path.into(),
            file_name: None,
            config,
        }
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> TaskRecord {
        TaskRecord::pending(
            PathBuf::from("/tmp/in.mp4"),
            "in.mp4".into(),
            1024,
            StitchConfig::default(),
        )
    }

    #[test]
    fn test_lifecycle_transitions() {
        use TaskStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Pending.can_transition_to(Failed));
        assert!(!Pending.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Completed));
        for terminal in [Completed, Failed] {
            assert!(terminal.is_terminal());
            for next in [Pending, Processing, Completed, Failed] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_apply_complete_sets_paths_and_time() {
        let mut task = record();
        let now = Utc::now();
        task.apply(Transition::Start, now).unwrap();
        assert_eq!(task.completed_at, None);

        task.apply(
            Transition::Complete {
                paths: vec![PathBuf::from("/out/a.jpg")],
            },
            now,
        )
        .unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.completed_at, Some(now));
        assert_eq!(task.result_paths.len(), 1);
    }

    #[test]
    fn test_apply_rejects_leaving_terminal_state() {
        let mut task = record();
        task.apply(
            Transition::Fail {
                message: "cancelled".into(),
            },
            Utc::now(),
        )
        .unwrap();
        assert!(task.apply(Transition::Start, Utc::now()).is_err());
        assert_eq!(task.status, TaskStatus::Failed);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&TaskStatus::Processing).unwrap(),
            "\"processing\""
        );
        assert_eq!("completed".parse::<TaskStatus>().unwrap(), TaskStatus::Completed);
        assert!("done".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn test_ids_are_unique_v4() {
        let a = record();
        let b = record();
        assert_ne!(a.task_id, b.task_id);
        let id = uuid::Uuid::parse_str(&a.task_id).unwrap();
        assert_eq!(id.get_version_num(), 4);
    }
}

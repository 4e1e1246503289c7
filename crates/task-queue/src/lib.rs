//! Longshot Task Queue: durable conversion tasks
//!
//! Conversions submitted here are recorded in a [`store::TaskStore`] and run
//! by a [`scheduler::Scheduler`] with a fixed number of worker slots. Task
//! state survives restarts when the SQLite store is used.

pub mod page;
pub mod query;
pub mod runner;
pub mod scheduler;
pub mod store;
pub mod task;

pub use page::{PageRequest, TaskPage, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use runner::{JobRunner, StitchRunner};
pub use scheduler::{Scheduler, SchedulerConfig, TaskEvent};
pub use store::{Deletion, MemoryTaskStore, SqliteTaskStore, TaskStore};
pub use task::{Submission, TaskRecord, TaskStatus, TaskStatusView, TaskSummary, Transition};

pub mod batch;
pub mod check;
pub mod convert;
pub mod delete;
pub mod list;
pub mod result;
pub mod status;

use anyhow::Context;

use longshot_common::config::AppConfig;
use longshot_task_queue::SqliteTaskStore;

/// Open the task database without starting a scheduler.
pub(crate) fn open_store(config: &AppConfig) -> anyhow::Result<SqliteTaskStore> {
    let path = config.database_path();
    SqliteTaskStore::open(&path)
        .with_context(|| format!("Failed to open task database at {}", path.display()))
}

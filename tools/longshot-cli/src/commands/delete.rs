//! Delete a task and its images.

use longshot_common::config::AppConfig;
use longshot_task_queue::query;

pub fn run(config: &AppConfig, task_id: &str) -> anyhow::Result<()> {
    let store = super::open_store(config)?;
    let record = query::delete_task(&store, task_id)?;
    println!(
        "Deleted task {} ({}, {} image(s))",
        record.task_id,
        record.status,
        record.result_paths.len()
    );
    Ok(())
}

//! Show the status of a task.

use longshot_common::config::AppConfig;
use longshot_task_queue::query;

pub fn run(config: &AppConfig, task_id: &str, json: bool) -> anyhow::Result<()> {
    let store = super::open_store(config)?;
    let view = query::find(&store, task_id)?.status_view();

    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    println!("Task: {}", view.task_id);
    println!("  Status: {}", view.status);
    println!("  Created: {}", view.created_at.to_rfc3339());
    match view.completed_at {
        Some(at) => println!("  Completed: {}", at.to_rfc3339()),
        None => println!("  Completed: -"),
    }
    if let Some(message) = &view.error_message {
        println!("  Error: {message}");
    }
    Ok(())
}

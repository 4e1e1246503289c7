//! List tasks, newest first.

use longshot_common::config::AppConfig;
use longshot_task_queue::{PageRequest, TaskStore};

pub fn run(config: &AppConfig, page: u32, page_size: u32, json: bool) -> anyhow::Result<()> {
    let request = PageRequest::new(page, page_size)?;
    let listing = super::open_store(config)?.list(&request)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    if listing.tasks.is_empty() {
        println!("No tasks.");
    }
    for task in &listing.tasks {
        println!(
            "{}  {:<10}  {}  {} ({} bytes)",
            task.task_id,
            task.status.as_str(),
            task.created_at.format("%Y-%m-%d %H:%M:%S"),
            task.file_name,
            task.file_size
        );
    }
    println!(
        "\nPage {}/{} ({} task(s) total)",
        listing.page, listing.total_pages, listing.total_count
    );
    Ok(())
}

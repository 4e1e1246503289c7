//! Show or copy the images of a completed task.

use std::path::{Path, PathBuf};

use anyhow::Context;

use longshot_common::config::AppConfig;
use longshot_media::output_paths;
use longshot_task_queue::query;

pub fn run(
    config: &AppConfig,
    task_id: &str,
    index: Option<usize>,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let store = super::open_store(config)?;
    let paths = match index {
        Some(i) => vec![query::output_part(&store, task_id, i)?],
        None => query::completed_outputs(&store, task_id)?,
    };

    let Some(output) = output else {
        for path in &paths {
            println!("{}", path.display());
        }
        return Ok(());
    };

    for (from, to) in paths.iter().zip(output_paths(&output, paths.len())) {
        copy(from, &to)?;
        println!("{} -> {}", from.display(), to.display());
    }
    Ok(())
}

fn copy(from: &Path, to: &Path) -> anyhow::Result<()> {
    if let Some(parent) = to.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::copy(from, to)
        .with_context(|| format!("Failed to copy {} to {}", from.display(), to.display()))?;
    Ok(())
}

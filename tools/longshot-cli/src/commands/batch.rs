//! Queue several recordings and run them through the scheduler.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;

use longshot_common::config::AppConfig;
use longshot_media::{FfmpegFrameSource, FrameSource};
use longshot_task_queue::{Scheduler, SchedulerConfig, StitchRunner, Submission, TaskStatus};

use crate::args::StitchArgs;

pub async fn run(
    config: &AppConfig,
    inputs: Vec<PathBuf>,
    stitch: &StitchArgs,
    verbose: bool,
    concurrency: Option<usize>,
) -> anyhow::Result<()> {
    let stitch_config = stitch.to_config(verbose);
    stitch_config.validate()?;
    let sampling = stitch.sampling();
    sampling.validate()?;

    let source = Arc::new(FfmpegFrameSource::new());
    if !source.is_available() {
        anyhow::bail!("ffmpeg and ffprobe are required; run `longshot check` for details");
    }

    let uploads = config.uploads_dir();
    std::fs::create_dir_all(&uploads)
        .with_context(|| format!("Failed to create {}", uploads.display()))?;

    let store = Arc::new(super::open_store(config)?);
    let runner = Arc::new(StitchRunner::new(source, config.output_dir()).with_sampling(sampling));
    let mut scheduler_config = SchedulerConfig::from(&config.queue);
    if let Some(n) = concurrency {
        scheduler_config.max_concurrency = n;
    }
    let scheduler = Scheduler::start(store, runner, scheduler_config)?;

    let mut submitted = Vec::new();
    let mut rejected = 0usize;
    for input in &inputs {
        match submit(&scheduler, &uploads, input, &stitch_config) {
            Ok(task_id) => {
                println!("Queued {} as {task_id}", input.display());
                submitted.push((input.clone(), task_id));
            }
            Err(e) => {
                eprintln!("Skipping {}: {e:#}", input.display());
                rejected += 1;
            }
        }
    }

    let waiting = async {
        for (_, task_id) in &submitted {
            scheduler.wait(task_id).await?;
        }
        anyhow::Ok(())
    };
    tokio::select! {
        waited = waiting => waited?,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("Interrupted, cancelling queued tasks...");
            for (_, task_id) in &submitted {
                if let Err(e) = scheduler.cancel(task_id) {
                    tracing::warn!(task_id = %task_id, error = %e, "Failed to cancel task");
                }
            }
        }
    }
    scheduler.shutdown().await?;

    println!();
    let mut failed = rejected;
    for (input, task_id) in &submitted {
        let view = scheduler.status(task_id)?;
        match view.status {
            TaskStatus::Completed => {
                let paths = scheduler.result(task_id)?;
                println!("[OK]   {} -> {}", input.display(), join_paths(&paths));
            }
            TaskStatus::Failed => {
                failed += 1;
                println!(
                    "[FAIL] {}: {}",
                    input.display(),
                    view.error_message.unwrap_or_default()
                );
            }
            status => {
                failed += 1;
                println!("[{status}] {} ({task_id})", input.display());
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} conversion(s) did not complete", inputs.len());
    }
    Ok(())
}

/// Stage a copy of `input` in the uploads directory and submit it. The
/// scheduler deletes the copy once the task is done.
fn submit(
    scheduler: &Scheduler,
    uploads: &Path,
    input: &Path,
    config: &longshot_stitch_core::StitchConfig,
) -> anyhow::Result<String> {
    let file_name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .with_context(|| format!("{} is not a file", input.display()))?;
    let staged = uploads.join(staged_name(input));
    std::fs::copy(input, &staged)
        .with_context(|| format!("Failed to copy {}", input.display()))?;

    let submission = Submission::new(&staged, config.clone()).with_file_name(file_name);
    match scheduler.submit(submission) {
        Ok(view) => Ok(view.task_id),
        Err(e) => {
            let _ = std::fs::remove_file(&staged);
            Err(e.into())
        }
    }
}

fn staged_name(input: &Path) -> String {
    let id = uuid::Uuid::new_v4();
    match input.extension() {
        Some(ext) => format!("{id}.{}", ext.to_string_lossy()),
        None => id.to_string(),
    }
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staged_name_keeps_extension() {
        let name = staged_name(Path::new("/tmp/My Recording.mov"));
        assert!(name.ends_with(".mov"));
        assert_eq!(name.len(), 36 + 4);
        assert_ne!(name, staged_name(Path::new("/tmp/My Recording.mov")));
    }
}

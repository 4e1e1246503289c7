//! Job runners: the work a scheduler slot performs for one task.

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use longshot_common::error::LongshotResult;
use longshot_media::{convert_video, FrameSampling, FrameSource};

use crate::task::TaskRecord;

/// Executes one task to completion on a blocking thread.
pub trait JobRunner: Send + Sync {
    /// Convert the task's source and return the written result paths.
    ///
    /// `cancel` is raised when the task should stop early.
    fn run(&self, task: &TaskRecord, cancel: &AtomicBool) -> LongshotResult<Vec<PathBuf>>;

    /// Runner name.
    fn name(&self) -> &str;
}

/// Decodes the task's video and stitches it into
/// `<output_dir>/<task_id>.jpg` (plus `_1`, `_2`, ... parts).
pub struct StitchRunner {
    source: Arc<dyn FrameSource>,
    output_dir: PathBuf,
    sampling: FrameSampling,
}

impl StitchRunner {
    pub fn new(source: Arc<dyn FrameSource>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            source,
            output_dir: output_dir.into(),
            sampling: FrameSampling::default(),
        }
    }

    pub fn with_sampling(mut self, sampling: FrameSampling) -> Self {
        self.sampling = sampling;
        self
    }

    pub fn output_path(&self, task: &TaskRecord) -> PathBuf {
        self.output_dir.join(format!("{}.jpg", task.task_id))
    }
}

impl JobRunner for StitchRunner {
    fn run(&self, task: &TaskRecord, cancel: &AtomicBool) -> LongshotResult<Vec<PathBuf>> {
        let conversion = convert_video(
            self.source.as_ref(),
            &task.source_path,
            &self.output_path(task),
            &task.config,
            &self.sampling,
            Some(cancel),
        )?;
        tracing::debug!(
            task_id = %task.task_id,
            report = ?conversion.report,
            "Stitch runner finished"
        );
        Ok(conversion.paths)
    }

    fn name(&self) -> &str {
        "stitch"
    }
}

//! One-shot video to long-screenshot conversion.

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::time::Instant;

use serde::Serialize;

use longshot_common::error::LongshotResult;
use longshot_stitch_core::{stitch_frames, StitchConfig, StitchReport};

use crate::output::write_canvases;
use crate::source::{FrameSampling, FrameSource};

/// Files written by a conversion and what the stitcher saw.
#[derive(Debug, Clone, Serialize)]
pub struct Conversion {
    pub paths: Vec<PathBuf>,
    pub report: StitchReport,
}

/// Decode `input`, stitch its frames and write the canvases next to
/// `output`.
///
/// Nothing is written unless stitching succeeds.
pub fn convert_video(
    source: &dyn FrameSource,
    input: &Path,
    output: &Path,
    config: &StitchConfig,
    sampling: &FrameSampling,
    cancel: Option<&AtomicBool>,
) -> LongshotResult<Conversion> {
    config.validate()?;
    sampling.validate()?;

    let start = Instant::now();
    tracing::info!(
        input = %input.display(),
        output = %output.display(),
        source = source.name(),
        "Starting conversion"
    );

    let frames = source.frames(input, sampling)?;
    let stitched = stitch_frames(frames, config, cancel)?;
    let paths = write_canvases(&stitched.canvases, output)?;

    tracing::info!(
        outputs = paths.len(),
        frames = stitched.report.frames_seen,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Conversion complete"
    );

    Ok(Conversion {
        paths,
        report: stitched.report,
    })
}

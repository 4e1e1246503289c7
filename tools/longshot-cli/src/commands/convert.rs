//! Stitch one recording in the foreground.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use longshot_media::{convert_video, FfmpegFrameSource, FrameSource};

use crate::args::StitchArgs;

pub async fn run(
    input: PathBuf,
    output: Option<PathBuf>,
    stitch: &StitchArgs,
    verbose: bool,
    json: bool,
) -> anyhow::Result<()> {
    let config = stitch.to_config(verbose);
    let sampling = stitch.sampling();
    config.validate()?;
    sampling.validate()?;

    let source = FfmpegFrameSource::new();
    if !source.is_available() {
        anyhow::bail!("ffmpeg and ffprobe are required; run `longshot check` for details");
    }

    let output = output.unwrap_or_else(|| default_output(&input));
    if !json {
        println!("Converting {}", input.display());
        println!("  Output: {}", output.display());
    }

    let cancel = Arc::new(AtomicBool::new(false));
    let mut job = {
        let cancel = cancel.clone();
        let input = input.clone();
        tokio::task::spawn_blocking(move || {
            convert_video(&source, &input, &output, &config, &sampling, Some(cancel.as_ref()))
        })
    };

    let joined = tokio::select! {
        joined = &mut job => joined,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("Interrupted, stopping...");
            cancel.store(true, Ordering::SeqCst);
            job.await
        }
    };
    let conversion = joined?
        .map_err(|e| anyhow::anyhow!("Failed to convert {}: {e}", input.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&conversion)?);
        return Ok(());
    }

    let report = &conversion.report;
    println!(
        "  Frames: {} seen, {} placed, {} stationary, {} skipped",
        report.frames_seen, report.frames_placed, report.stationary_frames, report.skipped_frames
    );
    if report.segment_breaks > 0 {
        println!("  Segment breaks: {}", report.segment_breaks);
    }
    for path in &conversion.paths {
        println!("  Wrote {}", path.display());
    }
    Ok(())
}

/// `<input stem>.jpg` next to the input.
fn default_output(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "longshot".to_string());
    input.with_file_name(format!("{stem}.jpg"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_output_sits_next_to_input() {
        assert_eq!(
            default_output(Path::new("/videos/page.mp4")),
            PathBuf::from("/videos/page.jpg")
        );
        assert_eq!(default_output(Path::new("clip")), PathBuf::from("clip.jpg"));
    }
}

//! Writing sealed canvases to image files.

use std::fs::File;
use std::io::{BufWriter, ErrorKind};
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::ImageFormat;

use longshot_common::error::{LongshotError, LongshotResult};
use longshot_stitch_core::canvas::SealedCanvas;

/// Extension used when the output path has none.
pub const DEFAULT_EXTENSION: &str = "jpg";

/// JPEG quality for written canvases.
pub const JPEG_QUALITY: u8 = 95;

/// File paths for `count` outputs of `output`: the first keeps the name,
/// later ones get `_1`, `_2`, ... appended to the stem.
pub fn output_paths(output: &Path, count: usize) -> Vec<PathBuf> {
    let ext = output
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string());
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "longshot".to_string());
    let parent = output.parent().unwrap_or_else(|| Path::new(""));

    (0..count)
        .map(|i| {
            if i == 0 {
                parent.join(format!("{stem}.{ext}"))
            } else {
                parent.join(format!("{stem}_{i}.{ext}"))
            }
        })
        .collect()
}

/// Write every canvas and return the paths in output order.
///
/// Each image is encoded to a hidden sibling file first and renamed into
/// place, so a reader never sees a partially written output. If any part
/// fails, the parts already written are removed again.
pub fn write_canvases(canvases: &[SealedCanvas], output: &Path) -> LongshotResult<Vec<PathBuf>> {
    let paths = output_paths(output, canvases.len());
    let Some(first) = paths.first() else {
        return Ok(paths);
    };

    let format = first
        .extension()
        .and_then(ImageFormat::from_extension)
        .ok_or_else(|| {
            LongshotError::unsupported(format!(
                "Unknown image format for output {}",
                first.display()
            ))
        })?;

    if let Some(parent) = first.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    for (i, (canvas, path)) in canvases.iter().zip(&paths).enumerate() {
        if let Err(e) = write_canvas(canvas, path, format) {
            if let Err(cleanup) = remove_outputs(&paths[..i]) {
                tracing::warn!(error = %cleanup, "Failed to remove partial outputs");
            }
            return Err(e);
        }
        tracing::debug!(
            path = %path.display(),
            width = canvas.image.width(),
            height = canvas.image.height(),
            "Wrote canvas"
        );
    }
    Ok(paths)
}

fn write_canvas(canvas: &SealedCanvas, path: &Path, format: ImageFormat) -> LongshotResult<()> {
    let tmp = temp_sibling(path);
    let result = encode(canvas, &tmp, format).and_then(|()| Ok(std::fs::rename(&tmp, path)?));
    if result.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    result
}

fn encode(canvas: &SealedCanvas, path: &Path, format: ImageFormat) -> LongshotResult<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    let encoded = match format {
        ImageFormat::Jpeg => {
            JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY).encode_image(&canvas.image)
        }
        other => canvas.image.write_to(&mut writer, other),
    };
    encoded.map_err(|e| {
        LongshotError::storage(format!("Failed to encode {}: {e}", path.display()))
    })?;
    writer
        .into_inner()
        .map_err(|e| LongshotError::storage(format!("Failed to flush {}: {e}", path.display())))?
        .sync_all()?;
    Ok(())
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.tmp"))
}

/// Remove output files, ignoring ones that are already gone.
pub fn remove_outputs(paths: &[PathBuf]) -> LongshotResult<()> {
    for path in paths {
        match std::fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

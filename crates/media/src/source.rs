//! Frame sources: turn a video file into a stream of decoded frames.
//!
//! The ffmpeg backend pipes raw `rgb24` frames out of an `ffmpeg` child
//! process, so frames are decoded lazily and only one is held at a time.

use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;
use std::process::{Child, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;

use serde::{Deserialize, Serialize};

use longshot_common::error::{LongshotError, LongshotResult};
use longshot_stitch_core::frame::{Frame, CHANNELS};

/// Frames in decode order. The stream ends after the first error.
pub type FrameStream = Box<dyn Iterator<Item = LongshotResult<Frame>> + Send>;

/// How frames are sampled from the video.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameSampling {
    /// Resample to a fixed rate instead of decoding every frame.
    #[serde(default)]
    pub fps: Option<f64>,
}

impl FrameSampling {
    pub fn every_frame() -> Self {
        Self::default()
    }

    pub fn at_fps(fps: f64) -> Self {
        Self { fps: Some(fps) }
    }

    pub fn validate(&self) -> LongshotResult<()> {
        match self.fps {
            Some(fps) if !fps.is_finite() || fps <= 0.0 => Err(LongshotError::config(format!(
                "sample fps must be a positive number (got {fps})"
            ))),
            _ => Ok(()),
        }
    }
}

/// Trait for video decoders.
pub trait FrameSource: Send + Sync {
    /// Open `path` and stream its frames.
    fn frames(&self, path: &Path, sampling: &FrameSampling) -> LongshotResult<FrameStream>;

    /// Check if this source can run on the system.
    fn is_available(&self) -> bool;

    /// Source name.
    fn name(&self) -> &str;
}

/// Decodes videos with the `ffmpeg` and `ffprobe` command-line tools.
#[derive(Debug, Clone)]
pub struct FfmpegFrameSource {
    ffmpeg: String,
    ffprobe: String,
}

impl Default for FfmpegFrameSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegFrameSource {
    pub fn new() -> Self {
        Self::with_binaries("ffmpeg", "ffprobe")
    }

    /// Use specific `ffmpeg` and `ffprobe` executables.
    pub fn with_binaries(ffmpeg: impl Into<String>, ffprobe: impl Into<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    fn decode_args(path: &Path, sampling: &FrameSampling) -> Vec<String> {
        let mut args = vec![
            "-v".to_string(),
            "error".to_string(),
            "-nostdin".to_string(),
            // Frames must keep the coded size that ffprobe reports.
            "-noautorotate".to_string(),
            "-i".to_string(),
            path.to_string_lossy().into_owned(),
        ];
        if let Some(fps) = sampling.fps {
            args.push("-vf".to_string());
            args.push(format!("fps={fps}"));
        }
        args.extend(
            ["-f", "rawvideo", "-pix_fmt", "rgb24", "pipe:1"]
                .into_iter()
                .map(String::from),
        );
        args
    }
}

impl FrameSource for FfmpegFrameSource {
    fn frames(&self, path: &Path, sampling: &FrameSampling) -> LongshotResult<FrameStream> {
        sampling.validate()?;
        if !path.is_file() {
            return Err(LongshotError::decode(format!(
                "Video file does not exist: {}",
                path.display()
            )));
        }

        let (width, height) = probe_video_dimensions(&self.ffprobe, path).ok_or_else(|| {
            LongshotError::decode(format!(
                "Could not read video dimensions of {} (not a video, or no video stream)",
                path.display()
            ))
        })?;

        let args = Self::decode_args(path, sampling);
        tracing::debug!(args = ?args, "Running ffmpeg");
        let mut child = Command::new(&self.ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| LongshotError::decode(format!("Failed to start ffmpeg: {e}")))?;

        tracing::info!(
            pid = child.id(),
            input = %path.display(),
            width,
            height,
            fps = ?sampling.fps,
            "ffmpeg decoder started"
        );

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| LongshotError::decode("Failed to capture ffmpeg stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| LongshotError::decode("Failed to capture ffmpeg stderr"))?;

        // Drain stderr concurrently so ffmpeg never blocks on a full pipe.
        let stderr_task = std::thread::spawn(move || -> String {
            let mut reader = BufReader::new(stderr);
            let mut output = String::new();
            match reader.read_to_string(&mut output) {
                Ok(_) => output,
                Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
            }
        });

        Ok(Box::new(FfmpegStream {
            child,
            frames: RawFrameReader::new(BufReader::new(stdout), width, height),
            stderr_task: Some(stderr_task),
            done: false,
        }))
    }

    fn is_available(&self) -> bool {
        command_exists(&self.ffmpeg) && command_exists(&self.ffprobe)
    }

    fn name(&self) -> &str {
        "ffmpeg"
    }
}

/// Splits a byte stream of packed `rgb24` pixels into frames.
pub struct RawFrameReader<R> {
    reader: R,
    width: u32,
    height: u32,
    next_index: usize,
}

impl<R: Read> RawFrameReader<R> {
    pub fn new(reader: R, width: u32, height: u32) -> Self {
        Self {
            reader,
            width,
            height,
            next_index: 0,
        }
    }

    fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * CHANNELS
    }

    /// Read one frame. `Ok(None)` on a clean end of stream.
    pub fn read_frame(&mut self) -> LongshotResult<Option<Frame>> {
        let mut buf = vec![0u8; self.frame_len()];
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(LongshotError::decode(format!(
                        "Failed reading frame {}: {e}",
                        self.next_index
                    )))
                }
            }
        }

        if filled == 0 {
            return Ok(None);
        }
        if filled < buf.len() {
            return Err(LongshotError::decode(format!(
                "Truncated frame {}: got {filled} of {} bytes",
                self.next_index,
                buf.len()
            )));
        }

        let index = self.next_index;
        self.next_index += 1;
        Frame::from_rgb24(index, self.width, self.height, buf)
            .map(Some)
            .ok_or_else(|| LongshotError::decode(format!("Frame {index} has an invalid size")))
    }
}

impl<R: Read> Iterator for RawFrameReader<R> {
    type Item = LongshotResult<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_frame().transpose()
    }
}

struct FfmpegStream {
    child: Child,
    frames: RawFrameReader<BufReader<ChildStdout>>,
    stderr_task: Option<JoinHandle<String>>,
    done: bool,
}

impl FfmpegStream {
    fn stderr_output(&mut self) -> String {
        self.stderr_task
            .take()
            .and_then(|task| task.join().ok())
            .unwrap_or_default()
    }

    fn finish(&mut self) -> LongshotResult<()> {
        let status = self.child.wait()?;
        let stderr = self.stderr_output();
        if status.success() {
            tracing::debug!(frames = self.frames.next_index, "ffmpeg decoder finished");
            return Ok(());
        }
        Err(LongshotError::decode(format!(
            "ffmpeg exited with {status}: {}",
            stderr.trim()
        )))
    }

    fn abort(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl Iterator for FfmpegStream {
    type Item = LongshotResult<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.frames.read_frame() {
            Ok(Some(frame)) => Some(Ok(frame)),
            Ok(None) => {
                self.done = true;
                self.finish().err().map(Err)
            }
            Err(err) => {
                self.done = true;
                self.abort();
                let stderr = self.stderr_output();
                if stderr.trim().is_empty() {
                    Some(Err(err))
                } else {
                    Some(Err(LongshotError::decode(format!("{err}; ffmpeg: {}", stderr.trim()))))
                }
            }
        }
    }
}

impl Drop for FfmpegStream {
    fn drop(&mut self) {
        if !self.done {
            tracing::debug!(pid = self.child.id(), "Stopping ffmpeg decoder early");
            self.abort();
        }
    }
}

/// Check whether `binary` can be found on `PATH`.
pub fn command_exists(binary: &str) -> bool {
    Command::new("sh")
        .arg("-c")
        .arg(format!("command -v {binary} >/dev/null 2>&1"))
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Width and height of the first video stream, via `ffprobe`.
pub fn probe_video_dimensions(ffprobe: &str, path: &Path) -> Option<(u32, u32)> {
    let output = Command::new(ffprobe)
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height",
            "-of",
            "csv=p=0:s=x",
        ])
        .arg(path)
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    let raw = String::from_utf8(output.stdout).ok()?;
    parse_dimensions(&raw)
}

fn parse_dimensions(raw: &str) -> Option<(u32, u32)> {
    let line = raw.lines().next()?.trim();
    let (w, h) = line.split_once('x')?;
    let width = w.parse::<u32>().ok()?;
    let height = h.trim_end_matches('x').parse::<u32>().ok()?;
    if width == 0 || height == 0 {
        return None;
    }
    Some((width, height))
}

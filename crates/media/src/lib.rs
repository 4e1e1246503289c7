//! Longshot Media: the boundary between video files and the stitcher
//!
//! - [`source`]: decode videos into frame streams (ffmpeg backend)
//! - [`output`]: write sealed canvases as image files
//! - [`convert`]: the two joined around the stitching engine

pub mod convert;
pub mod output;
pub mod source;

pub use convert::{convert_video, Conversion};
pub use output::{output_paths, remove_outputs, write_canvases};
pub use source::{FfmpegFrameSource, FrameSampling, FrameSource, FrameStream, RawFrameReader};

//! Stitching flags shared by `convert` and `batch`.

use clap::Args;

use longshot_media::FrameSampling;
use longshot_stitch_core::{StitchConfig, UnmatchedPolicy};

/// Unset flags keep the [`StitchConfig`] defaults.
#[derive(Debug, Clone, Default, Args)]
pub struct StitchArgs {
    /// Fraction of each frame cut from the top before matching
    #[arg(long, value_name = "FRACTION")]
    pub crop_top: Option<f64>,

    /// Fraction of each frame cut from the bottom before matching
    #[arg(long, value_name = "FRACTION")]
    pub crop_bottom: Option<f64>,

    /// Expected scroll per frame, as a fraction of the cropped height
    #[arg(long, value_name = "FRACTION")]
    pub expect_offset: Option<f64>,

    /// Smallest overlap accepted between consecutive frames
    #[arg(long, value_name = "FRACTION")]
    pub min_overlap: Option<f64>,

    /// Largest mean per-channel difference that still counts as a match
    #[arg(long, value_name = "DIFF")]
    pub approx_diff: Option<f64>,

    /// Recording scrolls horizontally
    #[arg(long)]
    pub transpose: bool,

    /// Draw a red seam of this many pixels between stitched frames
    #[arg(long, value_name = "PIXELS")]
    pub seam_width: Option<u32>,

    /// Half-width of the offset search window, as a fraction of the cropped height
    #[arg(long, value_name = "FRACTION")]
    pub search_radius: Option<f64>,

    /// What to do with a frame that matches nothing: skip or split
    #[arg(long, value_name = "POLICY")]
    pub on_unmatched: Option<UnmatchedPolicy>,

    /// Longest output image along the scroll axis before splitting
    #[arg(long, value_name = "PIXELS")]
    pub max_extent: Option<u32>,

    /// Keep the cropped header and footer in the output
    #[arg(long)]
    pub keep_margins: bool,

    /// Decode at a fixed rate instead of every frame
    #[arg(long, value_name = "FPS")]
    pub sample_fps: Option<f64>,
}

impl StitchArgs {
    /// Overlay the given flags on the defaults. `verbose` turns on
    /// per-frame alignment logging.
    pub fn to_config(&self, verbose: bool) -> StitchConfig {
        let defaults = StitchConfig::default();
        StitchConfig {
            crop_top: self.crop_top.unwrap_or(defaults.crop_top),
            crop_bottom: self.crop_bottom.unwrap_or(defaults.crop_bottom),
            expect_offset: self.expect_offset.unwrap_or(defaults.expect_offset),
            min_overlap: self.min_overlap.unwrap_or(defaults.min_overlap),
            approx_diff: self.approx_diff.unwrap_or(defaults.approx_diff),
            transpose: self.transpose,
            seam_width: self.seam_width.unwrap_or(defaults.seam_width),
            verbose,
            search_radius: self.search_radius.unwrap_or(defaults.search_radius),
            unmatched_policy: self.on_unmatched.unwrap_or_default(),
            max_canvas_extent: self.max_extent.unwrap_or(defaults.max_canvas_extent),
            keep_margins: self.keep_margins,
        }
    }

    pub fn sampling(&self) -> FrameSampling {
        match self.sample_fps {
            Some(fps) => FrameSampling::at_fps(fps),
            None => FrameSampling::every_frame(),
        }
    }
}

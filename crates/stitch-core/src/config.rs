//! Stitching configuration.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use longshot_common::error::{LongshotError, LongshotResult};

/// Largest canvas extent the default output format can hold, with margin
/// below the 65535-pixel JPEG dimension limit.
pub const DEFAULT_MAX_CANVAS_EXTENT: u32 = 65_000;

/// What the stitcher does with a frame that cannot be aligned against the
/// last placed frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnmatchedPolicy {
    /// Drop the frame and keep comparing against the last placed one.
    #[default]
    Skip,
    /// Seal the current canvas and start a new segment from the frame.
    Split,
}

impl fmt::Display for UnmatchedPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skip => f.write_str("skip"),
            Self::Split => f.write_str("split"),
        }
    }
}

impl FromStr for UnmatchedPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "split" => Ok(Self::Split),
            other => Err(format!("unknown unmatched policy '{other}' (use skip or split)")),
        }
    }
}

/// Per-job stitching configuration. Immutable once a job is submitted.
///
/// Fractions are relative to the frame's extent along the scroll axis:
/// the crops to the full extent, everything else to the cropped extent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StitchConfig {
    /// Fraction discarded at the start of the scroll axis (fixed headers).
    pub crop_top: f64,

    /// Fraction discarded at the end of the scroll axis (fixed footers).
    pub crop_bottom: f64,

    /// Expected scroll distance between consecutive frames; centers the
    /// offset search.
    pub expect_offset: f64,

    /// Minimum overlap two frames must keep for a match to count.
    pub min_overlap: f64,

    /// Largest mean absolute difference (0-255 scale) still treated as equal.
    pub approx_diff: f64,

    /// Horizontal scrolling instead of vertical.
    pub transpose: bool,

    /// Thickness of the debug marker painted at every seam; 0 disables it.
    pub seam_width: u32,

    /// Emit per-frame alignment diagnostics at info level.
    pub verbose: bool,

    /// Half-width of the offset search window around the expectation.
    pub search_radius: f64,

    /// Handling of frames that do not align.
    pub unmatched_policy: UnmatchedPolicy,

    /// Maximum extent of one output image along the scroll axis, in pixels.
    pub max_canvas_extent: u32,

    /// Re-attach the cropped header and footer to the output.
    pub keep_margins: bool,
}

impl Default for StitchConfig {
    fn default() -> Self {
        Self {
            crop_top: 0.15,
            crop_bottom: 0.15,
            expect_offset: 0.3,
            min_overlap: 0.15,
            approx_diff: 1.0,
            transpose: false,
            seam_width: 0,
            verbose: false,
            search_radius: 0.5,
            unmatched_policy: UnmatchedPolicy::Skip,
            max_canvas_extent: DEFAULT_MAX_CANVAS_EXTENT,
            keep_margins: false,
        }
    }
}

impl StitchConfig {
    /// Check every field against its valid domain.
    pub fn validate(&self) -> LongshotResult<()> {
        check_fraction("crop_top", self.crop_top, Bound::Closed, Bound::Open)?;
        check_fraction("crop_bottom", self.crop_bottom, Bound::Closed, Bound::Open)?;
        if self.crop_top + self.crop_bottom >= 1.0 {
            return Err(LongshotError::config(format!(
                "crop_top + crop_bottom must be below 1 (got {})",
                self.crop_top + self.crop_bottom
            )));
        }
        check_fraction("expect_offset", self.expect_offset, Bound::Closed, Bound::Open)?;
        check_fraction("min_overlap", self.min_overlap, Bound::Open, Bound::Closed)?;
        check_fraction("search_radius", self.search_radius, Bound::Open, Bound::Closed)?;

        if !self.approx_diff.is_finite() || self.approx_diff < 0.0 {
            return Err(LongshotError::config(format!(
                "approx_diff must be a non-negative number (got {})",
                self.approx_diff
            )));
        }
        if self.max_canvas_extent == 0 {
            return Err(LongshotError::config("max_canvas_extent must be at least 1"));
        }
        Ok(())
    }
}

#[derive(Clone, Copy)]
enum Bound {
    Open,
    Closed,
}

fn check_fraction(name: &str, value: f64, lower: Bound, upper: Bound) -> LongshotResult<()> {
    let above = match lower {
        Bound::Open => value > 0.0,
        Bound::Closed => value >= 0.0,
    };
    let below = match upper {
        Bound::Open => value < 1.0,
        Bound::Closed => value <= 1.0,
    };
    if value.is_finite() && above && below {
        return Ok(());
    }

    let lo = match lower {
        Bound::Open => "(0",
        Bound::Closed => "[0",
    };
    let hi = match upper {
        Bound::Open => "1)",
        Bound::Closed => "1]",
    };
    Err(LongshotError::config(format!(
        "{name} must be in {lo}, {hi} (got {value})"
    )))
}

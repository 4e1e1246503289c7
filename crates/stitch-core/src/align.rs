//! Frame alignment: the offset search between two adjacent frames.
//!
//! # Algorithm
//!
//! 1. **Profile** each cropped frame once: every line along the scroll axis
//!    is reduced to the per-channel averages of three sampled column bands.
//! 2. **Window** the candidate offsets: centered on the expected scroll
//!    distance, clipped so at least `min_overlap` of the frame still overlaps.
//! 3. **Score** each candidate by the mean absolute difference between the
//!    tail of the previous frame and the head of the current one.
//! 4. **Accept** the lowest score if it is within `approx_diff`.
//!
//! Averaging can only shrink differences, so a profile score never exceeds
//! the mean absolute difference of the full pixels it summarizes.

use longshot_common::error::{LongshotError, LongshotResult};

use crate::config::StitchConfig;
use crate::frame::{Frame, FrameGeometry, FrameView};

/// Fractions of the breadth spanned by the three sampled bands.
const SAMPLE_BANDS: [(f64, f64); 3] = [(0.02, 0.25), (0.5, 0.625), (0.75, 0.875)];

/// Sampled positions per band.
const SAMPLES_PER_BAND: usize = 3;

/// Profile values per line: one average per band and channel.
pub const PROFILE_WIDTH: usize = SAMPLE_BANDS.len() * 3;

/// One scored offset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    /// Scroll distance in lines between the previous and current frame.
    pub offset: u32,
    /// Mean absolute difference over the overlap (0-255 scale).
    pub score: f64,
}

/// Outcome of aligning one frame pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Alignment {
    /// The frames overlap at `offset` within tolerance.
    Matched { offset: u32, score: f64 },
    /// No candidate met the tolerance. `best` is the lowest-scoring
    /// candidate, if the window had any.
    Unmatched { best: Option<Candidate> },
}

impl Alignment {
    pub fn is_matched(&self) -> bool {
        matches!(self, Self::Matched { .. })
    }

    pub fn offset(&self) -> Option<u32> {
        match self {
            Self::Matched { offset, .. } => Some(*offset),
            Self::Unmatched { .. } => None,
        }
    }
}

/// Per-line summary of a cropped frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanProfile {
    lines: u32,
    values: Vec<f32>,
}

impl ScanProfile {
    /// Profile every line of `view`.
    pub fn of(view: &FrameView<'_>) -> Self {
        let positions = sample_positions(view.breadth());
        let mut values = Vec::with_capacity(view.extent() as usize * PROFILE_WIDTH);

        for along in 0..view.extent() {
            for band in &positions {
                let mut sums = [0u32; 3];
                for &across in band {
                    let px = view.pixel(along, across);
                    for (sum, v) in sums.iter_mut().zip(px) {
                        *sum += v as u32;
                    }
                }
                for sum in sums {
                    values.push(sum as f32 / SAMPLES_PER_BAND as f32);
                }
            }
        }

        Self {
            lines: view.extent(),
            values,
        }
    }

    pub fn lines(&self) -> u32 {
        self.lines
    }

    fn line_range(&self, start: u32, end: u32) -> &[f32] {
        &self.values[start as usize * PROFILE_WIDTH..end as usize * PROFILE_WIDTH]
    }
}

/// Across-axis positions of the sampled columns, per band.
fn sample_positions(breadth: u32) -> [[u32; SAMPLES_PER_BAND]; 3] {
    let last = breadth.saturating_sub(1) as f64;
    SAMPLE_BANDS.map(|(lo, hi)| {
        let mut band = [0u32; SAMPLES_PER_BAND];
        for (k, slot) in band.iter_mut().enumerate() {
            let t = k as f64 / (SAMPLES_PER_BAND - 1) as f64;
            *slot = ((lo + (hi - lo) * t) * last).round() as u32;
        }
        band
    })
}

/// Mean absolute difference between the tail of `previous` starting at
/// `offset` and the head of `current` of the same length.
///
/// `offset` must leave at least one overlapping line.
pub fn profile_difference(previous: &ScanProfile, current: &ScanProfile, offset: u32) -> f64 {
    let overlap = previous.lines - offset;
    let tail = previous.line_range(offset, previous.lines);
    let head = current.line_range(0, overlap);

    let total: f64 = tail
        .iter()
        .zip(head)
        .map(|(a, b)| (a - b).abs() as f64)
        .sum();
    total / tail.len() as f64
}

/// Inclusive range of offsets searched for one recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchWindow {
    /// Expected offset; ties resolve toward it.
    pub center: u32,
    pub lo: u32,
    pub hi: u32,
}

impl SearchWindow {
    /// Window for frames with `extent` cropped lines. `None` when no offset
    /// leaves the required overlap inside the window.
    pub fn new(extent: u32, config: &StitchConfig) -> Option<Self> {
        let e = extent as f64;
        let min_overlap = ((config.min_overlap * e).round() as u32).max(1);
        let max_offset = extent.checked_sub(min_overlap)?;

        let center = (config.expect_offset * e).round() as u32;
        let radius = (config.search_radius * e).round() as u32;
        let lo = center.saturating_sub(radius);
        let hi = center.saturating_add(radius).min(max_offset);

        (lo <= hi).then_some(Self { center, lo, hi })
    }

    /// Offsets in search order: nearest to the center first, the smaller
    /// offset first at equal distance.
    pub fn candidates(&self) -> impl Iterator<Item = u32> + '_ {
        let reach = self.center.abs_diff(self.lo).max(self.center.abs_diff(self.hi));
        (0..=reach).flat_map(move |d| {
            let below = self.center.checked_sub(d);
            let above = if d == 0 {
                None
            } else {
                self.center.checked_add(d)
            };
            below
                .into_iter()
                .chain(above)
                .filter(move |o| (self.lo..=self.hi).contains(o))
        })
    }

    /// Number of offsets searched.
    pub fn size(&self) -> u32 {
        self.hi - self.lo + 1
    }
}

/// Offset search for one recording's frame geometry.
#[derive(Debug, Clone)]
pub struct Aligner {
    window: Option<SearchWindow>,
    approx_diff: f64,
}

impl Aligner {
    pub fn new(extent: u32, config: &StitchConfig) -> Self {
        Self {
            window: SearchWindow::new(extent, config),
            approx_diff: config.approx_diff,
        }
    }

    pub fn window(&self) -> Option<&SearchWindow> {
        self.window.as_ref()
    }

    /// Align `current` against `previous`.
    ///
    /// Profiles that are identical at offset 0 are a stationary frame and
    /// match at 0 regardless of the window.
    pub fn align(&self, previous: &ScanProfile, current: &ScanProfile) -> Alignment {
        if previous.lines == 0 || previous.lines != current.lines {
            return Alignment::Unmatched { best: None };
        }
        if previous.values == current.values {
            return Alignment::Matched {
                offset: 0,
                score: 0.0,
            };
        }

        let Some(window) = &self.window else {
            return Alignment::Unmatched { best: None };
        };

        let mut best: Option<Candidate> = None;
        for offset in window.candidates() {
            let score = profile_difference(previous, current, offset);
            if best.map_or(true, |b| score < b.score) {
                best = Some(Candidate { offset, score });
            }
        }

        match best {
            Some(c) if c.score <= self.approx_diff => Alignment::Matched {
                offset: c.offset,
                score: c.score,
            },
            best => Alignment::Unmatched { best },
        }
    }
}

/// Align two frames directly.
///
/// Convenience over [`Aligner`] for one-off pairs; the stitcher reuses
/// profiles across pairs instead.
pub fn align(previous: &Frame, current: &Frame, config: &StitchConfig) -> LongshotResult<Alignment> {
    config.validate()?;
    let geometry = FrameGeometry::new(previous.width(), previous.height(), config)?;
    if !geometry.fits(current) {
        return Err(LongshotError::decode(format!(
            "cannot align a {}x{} frame against a {}x{} frame",
            current.width(),
            current.height(),
            previous.width(),
            previous.height()
        )));
    }

    let aligner = Aligner::new(geometry.extent, config);
    let prev_profile = ScanProfile::of(&geometry.cropped(previous));
    let cur_profile = ScanProfile::of(&geometry.cropped(current));
    Ok(aligner.align(&prev_profile, &cur_profile))
}

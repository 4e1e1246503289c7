//! The stitcher: folds a frame sequence into sealed canvases.
//!
//! # Algorithm
//!
//! 1. **Seed** the canvas with the first cropped frame in full.
//! 2. **Align** every following frame against the last placed frame.
//! 3. **Append** the newly revealed slice (the last `offset` lines) of each
//!    matched frame; unmatched frames follow the configured policy.
//! 4. **Seal** canvases as they reach the maximum extent, and the last one
//!    when the sequence ends.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;

use longshot_common::error::{LongshotError, LongshotResult};

use crate::align::{Aligner, Alignment, Candidate, ScanProfile};
use crate::canvas::{CanvasAssembler, SealedCanvas};
use crate::config::{StitchConfig, UnmatchedPolicy};
use crate::frame::{Frame, FrameGeometry};

/// What happened to one pushed frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Placement {
    /// First frame of the sequence.
    Seeded,
    /// New content appended after a scroll of `offset` lines.
    Appended { offset: u32, score: f64 },
    /// Matched at offset 0: nothing new on screen.
    Stationary { score: f64 },
    /// Could not be aligned and was dropped.
    Skipped { best: Option<Candidate> },
    /// Could not be aligned and started a new segment.
    SegmentBreak { best: Option<Candidate> },
}

/// Counters describing one stitching run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StitchReport {
    pub frames_seen: usize,
    pub frames_placed: usize,
    pub stationary_frames: usize,
    pub skipped_frames: usize,
    pub segment_breaks: usize,
    pub matched_pairs: usize,
    pub unmatched_pairs: usize,
    /// Lines along the scroll axis across all outputs.
    pub total_extent: u64,
    pub canvases: usize,
}

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct StitchOutput {
    pub canvases: Vec<SealedCanvas>,
    pub report: StitchReport,
}

struct Reference {
    frame: Frame,
    profile: ScanProfile,
}

/// State established by the first frame.
struct Session {
    geometry: FrameGeometry,
    aligner: Aligner,
    assembler: CanvasAssembler,
    reference: Reference,
}

/// Incremental stitcher. Frames must be pushed in capture order.
pub struct Stitcher {
    config: StitchConfig,
    session: Option<Session>,
    report: StitchReport,
}

impl Stitcher {
    /// Create a stitcher after validating `config`.
    pub fn new(config: StitchConfig) -> LongshotResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            session: None,
            report: StitchReport::default(),
        })
    }

    pub fn config(&self) -> &StitchConfig {
        &self.config
    }

    pub fn report(&self) -> &StitchReport {
        &self.report
    }

    /// Place the next frame.
    pub fn push(&mut self, frame: Frame) -> LongshotResult<Placement> {
        self.report.frames_seen += 1;

        let Some(session) = self.session.as_mut() else {
            self.seed(frame)?;
            self.report.frames_placed += 1;
            return Ok(Placement::Seeded);
        };

        let geometry = session.geometry;
        if !geometry.fits(&frame) {
            return Err(LongshotError::decode(format!(
                "frame {} is {}x{}, expected {}x{}",
                frame.index(),
                frame.width(),
                frame.height(),
                geometry.width,
                geometry.height
            )));
        }

        let profile = ScanProfile::of(&geometry.cropped(&frame));
        let alignment = session.aligner.align(&session.reference.profile, &profile);
        log_alignment(self.config.verbose, &frame, &alignment);

        let placement = match alignment {
            Alignment::Matched { offset: 0, score } => {
                self.report.matched_pairs += 1;
                self.report.stationary_frames += 1;
                Placement::Stationary { score }
            }
            Alignment::Matched { offset, score } => {
                let view = geometry.cropped(&frame);
                session
                    .assembler
                    .append(&view, geometry.extent - offset..geometry.extent, true)?;
                self.report.matched_pairs += 1;
                self.report.frames_placed += 1;
                Placement::Appended { offset, score }
            }
            Alignment::Unmatched { best } => {
                self.report.unmatched_pairs += 1;
                match self.config.unmatched_policy {
                    UnmatchedPolicy::Skip => {
                        self.report.skipped_frames += 1;
                        return Ok(Placement::Skipped { best });
                    }
                    UnmatchedPolicy::Split => {
                        session.assembler.break_segment()?;
                        let view = geometry.cropped(&frame);
                        session.assembler.append(&view, 0..geometry.extent, false)?;
                        self.report.segment_breaks += 1;
                        self.report.frames_placed += 1;
                        Placement::SegmentBreak { best }
                    }
                }
            }
        };

        session.reference = Reference { frame, profile };
        Ok(placement)
    }

    /// Seal the remaining canvas and return all outputs.
    pub fn finish(mut self) -> LongshotResult<StitchOutput> {
        let Some(mut session) = self.session.take() else {
            return Err(LongshotError::NoFrames);
        };
        if self.report.frames_seen > 1 && self.report.matched_pairs == 0 {
            return Err(LongshotError::AllFramesUnmatched {
                pairs: self.report.unmatched_pairs,
            });
        }

        let geometry = session.geometry;
        if self.config.keep_margins && geometry.crop_end > 0 {
            let full = geometry.full(&session.reference.frame);
            session.assembler.append(
                &full,
                geometry.full_extent - geometry.crop_end..geometry.full_extent,
                false,
            )?;
        }

        self.report.total_extent = session.assembler.total_extent();
        let canvases = session.assembler.finish()?;
        self.report.canvases = canvases.len();

        tracing::info!(
            frames = self.report.frames_seen,
            placed = self.report.frames_placed,
            skipped = self.report.skipped_frames,
            canvases = self.report.canvases,
            extent = self.report.total_extent,
            "Stitching finished"
        );

        Ok(StitchOutput {
            canvases,
            report: self.report,
        })
    }

    fn seed(&mut self, frame: Frame) -> LongshotResult<()> {
        let geometry = FrameGeometry::new(frame.width(), frame.height(), &self.config)?;
        let aligner = Aligner::new(geometry.extent, &self.config);
        let mut assembler = CanvasAssembler::new(
            geometry.axis,
            geometry.breadth,
            self.config.max_canvas_extent,
            self.config.seam_width,
        );

        if self.config.keep_margins && geometry.crop_start > 0 {
            assembler.append(&geometry.full(&frame), 0..geometry.crop_start, false)?;
        }
        let view = geometry.cropped(&frame);
        assembler.append(&view, 0..geometry.extent, false)?;
        let profile = ScanProfile::of(&view);

        tracing::debug!(
            width = geometry.width,
            height = geometry.height,
            axis = ?geometry.axis,
            extent = geometry.extent,
            window = ?aligner.window(),
            "Seeded stitcher"
        );

        self.session = Some(Session {
            geometry,
            aligner,
            assembler,
            reference: Reference { frame, profile },
        });
        Ok(())
    }
}

fn log_alignment(verbose: bool, frame: &Frame, alignment: &Alignment) {
    let (offset, score, matched) = match alignment {
        Alignment::Matched { offset, score } => (Some(*offset), Some(*score), true),
        Alignment::Unmatched { best } => (best.map(|c| c.offset), best.map(|c| c.score), false),
    };
    if verbose {
        tracing::info!(frame = frame.index(), ?offset, ?score, matched, "Aligned frame");
    } else {
        tracing::trace!(frame = frame.index(), ?offset, ?score, matched, "Aligned frame");
    }
}

/// Stitch an in-memory frame sequence.
pub fn stitch<I>(frames: I, config: &StitchConfig) -> LongshotResult<StitchOutput>
where
    I: IntoIterator<Item = Frame>,
{
    stitch_frames(frames.into_iter().map(Ok), config, None)
}

/// Stitch a fallible frame stream, such as one being decoded.
///
/// The first decode error aborts the run. `cancel` is checked before each
/// frame is pulled from the stream.
pub fn stitch_frames<I>(
    frames: I,
    config: &StitchConfig,
    cancel: Option<&AtomicBool>,
) -> LongshotResult<StitchOutput>
where
    I: IntoIterator<Item = LongshotResult<Frame>>,
{
    let mut stitcher = Stitcher::new(config.clone())?;
    let mut frames = frames.into_iter();
    loop {
        if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
            return Err(LongshotError::Cancelled);
        }
        let Some(frame) = frames.next() else { break };
        stitcher.push(frame?)?;
    }
    stitcher.finish()
}

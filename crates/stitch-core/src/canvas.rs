//! Canvas assembly and splitting.
//!
//! Canvases store pixels line by line along the scroll axis, so appending a
//! slice is a plain buffer extension for either orientation. Only sealing
//! converts the lines back into an image of the right shape.

use std::ops::Range;

use image::{Rgb, RgbImage};

use longshot_common::error::{LongshotError, LongshotResult};

use crate::frame::{FrameView, ScrollAxis, CHANNELS};

/// Color of the debug marker painted at seams.
pub const SEAM_COLOR: [u8; 3] = [255, 0, 0];

/// A finished output image.
#[derive(Debug, Clone, PartialEq)]
pub struct SealedCanvas {
    /// Position in the output sequence, starting at 0.
    pub index: usize,

    /// The assembled pixels.
    pub image: RgbImage,

    /// Line positions (along the scroll axis) where a new frame slice
    /// begins inside this canvas.
    pub seams: Vec<u32>,
}

impl SealedCanvas {
    /// Extent along the scroll axis.
    pub fn extent(&self, axis: ScrollAxis) -> u32 {
        axis.extent(self.image.width(), self.image.height())
    }
}

/// An output buffer under construction.
#[derive(Debug)]
struct Canvas {
    index: usize,
    data: Vec<u8>,
    extent: u32,
    seams: Vec<u32>,
    /// Leading lines that continue a seam from the previous canvas.
    seam_carry: u32,
}

impl Canvas {
    fn new(index: usize) -> Self {
        Self {
            index,
            data: Vec::new(),
            extent: 0,
            seams: Vec::new(),
            seam_carry: 0,
        }
    }

    /// Seam lines that run past the end of this canvas.
    fn seam_overhang(&self, seam_width: u32) -> u32 {
        if seam_width == 0 {
            return 0;
        }
        self.seams
            .iter()
            .map(|&seam| seam.saturating_add(seam_width))
            .chain(std::iter::once(self.seam_carry))
            .max()
            .unwrap_or(0)
            .saturating_sub(self.extent)
    }

    fn push_line(&mut self, view: &FrameView<'_>, along: u32) {
        view.copy_line(along, &mut self.data);
        self.extent += 1;
    }

    fn seal(
        mut self,
        axis: ScrollAxis,
        breadth: u32,
        seam_width: u32,
    ) -> LongshotResult<SealedCanvas> {
        let line_len = breadth as usize * CHANNELS;
        if seam_width > 0 {
            let carried = (self.seam_carry > 0).then_some((0, self.seam_carry));
            let own = self.seams.iter().map(|&seam| (seam, seam.saturating_add(seam_width)));
            for (start, end) in carried.into_iter().chain(own) {
                let end = end.min(self.extent);
                let bytes = &mut self.data[start as usize * line_len..end as usize * line_len];
                for px in bytes.chunks_exact_mut(CHANNELS) {
                    px.copy_from_slice(&SEAM_COLOR);
                }
            }
        }

        let image = match axis {
            ScrollAxis::Vertical => RgbImage::from_raw(breadth, self.extent, self.data),
            ScrollAxis::Horizontal => {
                let data = self.data;
                Some(RgbImage::from_fn(self.extent, breadth, |x, y| {
                    let at = x as usize * line_len + y as usize * CHANNELS;
                    Rgb([data[at], data[at + 1], data[at + 2]])
                }))
            }
        }
        .ok_or_else(|| {
            LongshotError::storage(format!(
                "canvas {} buffer does not match {breadth}x{} lines",
                self.index, self.extent
            ))
        })?;

        Ok(SealedCanvas {
            index: self.index,
            image,
            seams: self.seams,
        })
    }
}

/// Grows canvases slice by slice, sealing each one when it reaches the
/// maximum extent.
#[derive(Debug)]
pub struct CanvasAssembler {
    axis: ScrollAxis,
    breadth: u32,
    max_extent: u32,
    seam_width: u32,
    current: Canvas,
    sealed: Vec<SealedCanvas>,
    pending_seam: bool,
    total_extent: u64,
}

impl CanvasAssembler {
    pub fn new(axis: ScrollAxis, breadth: u32, max_extent: u32, seam_width: u32) -> Self {
        Self {
            axis,
            breadth,
            max_extent: max_extent.max(1),
            seam_width,
            current: Canvas::new(0),
            sealed: Vec::new(),
            pending_seam: false,
            total_extent: 0,
        }
    }

    /// Append `lines` of `view`. With `seam`, the first appended line is
    /// recorded as a seam in whichever canvas receives it.
    pub fn append(
        &mut self,
        view: &FrameView<'_>,
        lines: Range<u32>,
        seam: bool,
    ) -> LongshotResult<()> {
        if lines.is_empty() {
            return Ok(());
        }
        self.pending_seam = seam;

        for along in lines {
            if self.current.extent >= self.max_extent {
                self.seal_current(true)?;
            }
            if self.pending_seam {
                self.current.seams.push(self.current.extent);
                self.pending_seam = false;
            }
            self.current.push_line(view, along);
            self.total_extent += 1;
        }
        Ok(())
    }

    /// Seal the current canvas early, so the next append starts a new one.
    pub fn break_segment(&mut self) -> LongshotResult<()> {
        if self.current.extent > 0 {
            self.seal_current(false)?;
        }
        Ok(())
    }

    /// Lines appended so far across all canvases.
    pub fn total_extent(&self) -> u64 {
        self.total_extent
    }

    /// Canvases sealed so far, not counting the open one.
    pub fn sealed_count(&self) -> usize {
        self.sealed.len()
    }

    /// Seal the open canvas and return every output in order.
    pub fn finish(mut self) -> LongshotResult<Vec<SealedCanvas>> {
        self.break_segment()?;
        Ok(self.sealed)
    }

    /// With `continues`, a seam cut off at the end of the sealed canvas
    /// carries on at the start of the next one.
    fn seal_current(&mut self, continues: bool) -> LongshotResult<()> {
        let mut next = Canvas::new(self.current.index + 1);
        if continues {
            next.seam_carry = self.current.seam_overhang(self.seam_width);
        }
        let full = std::mem::replace(&mut self.current, next);
        tracing::debug!(
            canvas = full.index,
            extent = full.extent,
            seams = full.seams.len(),
            "Sealing canvas"
        );
        self.sealed
            .push(full.seal(self.axis, self.breadth, self.seam_width)?);
        Ok(())
    }
}

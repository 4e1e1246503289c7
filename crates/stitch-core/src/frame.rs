//! Decoded frames and scroll-axis geometry.
//!
//! Everything downstream of this module talks in terms of the scroll axis:
//! *along* is the direction content moves while scrolling, *across* is the
//! perpendicular one. A transposed (horizontal) capture is the same
//! algorithm with the two image axes swapped.

use image::RgbImage;

use longshot_common::error::{LongshotError, LongshotResult};

use crate::config::StitchConfig;

/// Bytes per RGB pixel.
pub const CHANNELS: usize = 3;

/// A single decoded frame of the recording.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    index: usize,
    image: RgbImage,
}

impl Frame {
    /// Wrap a decoded image; `index` is its position in capture order.
    pub fn new(index: usize, image: RgbImage) -> Self {
        Self { index, image }
    }

    /// Build a frame from packed `rgb24` bytes. Returns `None` when the
    /// buffer length does not match `width * height * 3`.
    pub fn from_rgb24(index: usize, width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        RgbImage::from_raw(width, height, data).map(|image| Self { index, image })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }
}

/// The image axis along which consecutive frames overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScrollAxis {
    /// Content scrolls up/down; lines are image rows.
    Vertical,
    /// Content scrolls left/right; lines are image columns.
    Horizontal,
}

impl ScrollAxis {
    pub fn from_transpose(transpose: bool) -> Self {
        if transpose {
            Self::Horizontal
        } else {
            Self::Vertical
        }
    }

    /// Size of a `width` x `height` image along the scroll axis.
    pub fn extent(self, width: u32, height: u32) -> u32 {
        match self {
            Self::Vertical => height,
            Self::Horizontal => width,
        }
    }

    /// Size of a `width` x `height` image across the scroll axis.
    pub fn breadth(self, width: u32, height: u32) -> u32 {
        match self {
            Self::Vertical => width,
            Self::Horizontal => height,
        }
    }

    /// Image `(x, y)` of the pixel at `along`/`across`.
    pub fn to_xy(self, along: u32, across: u32) -> (u32, u32) {
        match self {
            Self::Vertical => (across, along),
            Self::Horizontal => (along, across),
        }
    }
}

/// Pixel geometry shared by every frame of one recording, resolved from
/// the first frame and the configured fractions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameGeometry {
    pub width: u32,
    pub height: u32,
    pub axis: ScrollAxis,
    /// Uncropped extent along the scroll axis.
    pub full_extent: u32,
    /// Size across the scroll axis.
    pub breadth: u32,
    /// Lines discarded at the start of the scroll axis.
    pub crop_start: u32,
    /// Lines discarded at the end of the scroll axis.
    pub crop_end: u32,
    /// Extent left after cropping; always at least 1.
    pub extent: u32,
}

impl FrameGeometry {
    /// Resolve the geometry for `width` x `height` frames.
    ///
    /// Crop fractions truncate toward zero. A validated config keeps
    /// `crop_top + crop_bottom < 1`, which leaves at least one line.
    pub fn new(width: u32, height: u32, config: &StitchConfig) -> LongshotResult<Self> {
        if width == 0 || height == 0 {
            return Err(LongshotError::decode(format!(
                "frame has empty dimensions {width}x{height}"
            )));
        }

        let axis = ScrollAxis::from_transpose(config.transpose);
        let full_extent = axis.extent(width, height);
        let crop_start = (config.crop_top * full_extent as f64) as u32;
        let crop_end = (config.crop_bottom * full_extent as f64) as u32;
        let extent = full_extent
            .checked_sub(crop_start + crop_end)
            .filter(|e| *e > 0)
            .ok_or_else(|| {
                LongshotError::config(format!(
                    "crop of {crop_start}+{crop_end} lines leaves nothing of a {full_extent}-line frame"
                ))
            })?;

        Ok(Self {
            width,
            height,
            axis,
            full_extent,
            breadth: axis.breadth(width, height),
            crop_start,
            crop_end,
            extent,
        })
    }

    /// Whether `frame` has the dimensions this geometry was resolved for.
    pub fn fits(&self, frame: &Frame) -> bool {
        frame.width() == self.width && frame.height() == self.height
    }

    /// The cropped region of `frame` used for alignment and assembly.
    pub fn cropped<'a>(&self, frame: &'a Frame) -> FrameView<'a> {
        FrameView {
            frame,
            axis: self.axis,
            start: self.crop_start,
            extent: self.extent,
        }
    }

    /// The whole of `frame`, including cropped margins.
    pub fn full<'a>(&self, frame: &'a Frame) -> FrameView<'a> {
        FrameView {
            frame,
            axis: self.axis,
            start: 0,
            extent: self.full_extent,
        }
    }
}

/// A borrowed range of lines of a frame along the scroll axis.
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    frame: &'a Frame,
    axis: ScrollAxis,
    start: u32,
    extent: u32,
}

impl<'a> FrameView<'a> {
    pub fn frame(&self) -> &'a Frame {
        self.frame
    }

    pub fn axis(&self) -> ScrollAxis {
        self.axis
    }

    /// Number of lines in the view.
    pub fn extent(&self) -> u32 {
        self.extent
    }

    /// Pixels per line.
    pub fn breadth(&self) -> u32 {
        self.axis.breadth(self.frame.width(), self.frame.height())
    }

    /// RGB value at `along` (relative to the view start) and `across`.
    pub fn pixel(&self, along: u32, across: u32) -> [u8; 3] {
        let (x, y) = self.axis.to_xy(self.start + along, across);
        self.frame.image.get_pixel(x, y).0
    }

    /// Append line `along` (relative to the view start) to `out` as packed
    /// RGB, `breadth * 3` bytes.
    pub fn copy_line(&self, along: u32, out: &mut Vec<u8>) {
        let line = (self.start + along) as usize;
        match self.axis {
            ScrollAxis::Vertical => {
                let stride = self.frame.width() as usize * CHANNELS;
                let raw = self.frame.image.as_raw();
                out.extend_from_slice(&raw[line * stride..(line + 1) * stride]);
            }
            ScrollAxis::Horizontal => {
                let x = line as u32;
                for y in 0..self.frame.height() {
                    out.extend_from_slice(&self.frame.image.get_pixel(x, y).0);
                }
            }
        }
    }
}

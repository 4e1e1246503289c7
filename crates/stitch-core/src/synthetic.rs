//! Synthetic scrolling recordings.
//!
//! Deterministic pages and the frames a screen recorder would capture while
//! scrolling them, for tests and benchmarks.

use image::{Rgb, RgbImage};

use crate::frame::Frame;

/// Width in pixels of one texture cell.
const CELL: u32 = 4;

fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// A `width` x `height` page whose rows never repeat: every row is a
/// different sequence of colored cells.
pub fn document(width: u32, height: u32, seed: u64) -> RgbImage {
    let base = splitmix64(seed);
    RgbImage::from_fn(width, height, |x, y| {
        let h = splitmix64(base ^ ((y as u64) << 20) ^ (x / CELL) as u64);
        Rgb([h as u8, (h >> 8) as u8, (h >> 16) as u8])
    })
}

/// A page of a single color.
pub fn flat(width: u32, height: u32, color: [u8; 3]) -> RgbImage {
    RgbImage::from_pixel(width, height, Rgb(color))
}

/// Frames of `frame_height` rows cut from `page` at the given top rows, in
/// order. Panics if a frame would extend past the page.
pub fn vertical_recording(page: &RgbImage, frame_height: u32, tops: &[u32]) -> Vec<Frame> {
    tops.iter()
        .enumerate()
        .map(|(index, &top)| {
            assert!(
                top + frame_height <= page.height(),
                "frame at row {top} runs past a {}-row page",
                page.height()
            );
            let image =
                image::imageops::crop_imm(page, 0, top, page.width(), frame_height).to_image();
            Frame::new(index, image)
        })
        .collect()
}

/// Copy of `frame` with one pixel recolored.
pub fn with_dot(frame: &Frame, x: u32, y: u32, color: [u8; 3]) -> Frame {
    let mut image = frame.image().clone();
    image.put_pixel(x, y, Rgb(color));
    Frame::new(frame.index(), image)
}

/// `frame` with rows and columns swapped, turning a vertical scroll into a
/// horizontal one.
pub fn transpose_frame(frame: &Frame) -> Frame {
    let source = frame.image();
    let image = RgbImage::from_fn(source.height(), source.width(), |x, y| *source.get_pixel(y, x));
    Frame::new(frame.index(), image)
}

/// Overlay a fixed header of `top` rows and footer of `bottom` rows on
/// every frame, like a toolbar that stays put while the content scrolls.
pub fn with_static_bars(frames: &[Frame], top: u32, bottom: u32, color: [u8; 3]) -> Vec<Frame> {
    frames
        .iter()
        .map(|frame| {
            let mut image = frame.image().clone();
            let height = image.height();
            for y in (0..top.min(height)).chain(height.saturating_sub(bottom)..height) {
                for x in 0..image.width() {
                    image.put_pixel(x, y, Rgb(color));
                }
            }
            Frame::new(frame.index(), image)
        })
        .collect()
}

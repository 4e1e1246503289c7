//! Longshot Stitch Core: the scrolling-capture stitching engine
//!
//! Turns an ordered sequence of screen-recording frames into one or more
//! long screenshots:
//! - **Alignment:** find the scroll offset between two adjacent frames
//! - **Canvas assembly:** append the newly revealed slice of every frame
//! - **Splitting:** seal a canvas once it reaches the maximum output extent
//!
//! This crate is pure computation with no I/O and no process spawning.
//! Inputs are frames and outputs are in-memory images.

pub mod align;
pub mod canvas;
pub mod config;
pub mod frame;
pub mod stitcher;
pub mod synthetic;

pub use align::{align, Aligner, Alignment, Candidate};
pub use canvas::SealedCanvas;
pub use config::{StitchConfig, UnmatchedPolicy};
pub use frame::{Frame, ScrollAxis};
pub use stitcher::{stitch, stitch_frames, Placement, StitchOutput, StitchReport, Stitcher};

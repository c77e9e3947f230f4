//! Frame composition for the capture pipeline.
//!
//! Crops each captured frame down to the selected region on the GPU.

pub mod compositor;

pub use compositor::{ComposedFrame, FrameCompositor};

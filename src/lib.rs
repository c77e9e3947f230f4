//! Screen region to animated GIF capture core.
//!
//! A [`CaptureController`] drives one capture session at a time: frames from a
//! [`FrameSource`] are cropped to the selected region by a
//! [`FrameCompositor`] and handed to an [`EncodingSink`] such as [`GifSink`].

pub mod capture;
pub mod config;
pub mod encoder;
pub mod error;
pub mod gpu;
pub mod recording;
pub mod rendering;
pub mod timestamp;

pub use capture::{CaptureBackend, FrameSource, ManualBackend, PatternBackend, SourceFrame};
pub use capture_targets::{
    CaptureTarget, Display, DisplayId, DisplayLayout, Point, Rect, ResolvedCapture, Size,
    TargetKind,
};
pub use config::CaptureConfig;
pub use encoder::{EncodingSink, GifSink};
pub use error::{GifSnapError, GifSnapResult};
pub use gpu::{GpuDevice, SoftwareDevice, WgpuDevice};
pub use recording::{CadenceDriver, CaptureController, CaptureState, SessionStats};
pub use rendering::{ComposedFrame, FrameCompositor};
pub use timestamp::Timestamp;

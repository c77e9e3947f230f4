//! Encoding sinks for composed frames.

pub mod gif_encoder;

pub use gif_encoder::{bgra_to_rgba, GifSink};

use crate::error::GifSnapResult;
use crate::rendering::ComposedFrame;

/// Consumer of composed frames.
///
/// `process` receives a borrowed frame that is only valid for the duration
/// of the call. `finish_and_flush` is called once when the session ends and
/// must not return before the output is complete.
pub trait EncodingSink<S>: Send {
    fn process(&mut self, frame: &ComposedFrame<'_, S>) -> GifSnapResult<()>;

    fn finish_and_flush(&mut self) -> GifSnapResult<()>;
}

impl<S, T: EncodingSink<S> + ?Sized> EncodingSink<S> for Box<T> {
    fn process(&mut self, frame: &ComposedFrame<'_, S>) -> GifSnapResult<()> {
        (**self).process(frame)
    }

    fn finish_and_flush(&mut self) -> GifSnapResult<()> {
        (**self).finish_and_flush()
    }
}

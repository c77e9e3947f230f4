//! Capture source contract.
//!
//! A capture backend opens a [`FrameSource`] against a target. The source
//! owns a bounded [`FramePool`] of GPU surfaces, calls a registered arrival
//! handler on its own delivery thread whenever a frame lands, and hands out
//! the newest frame on request. Older undelivered frames are dropped, never
//! reordered.

pub mod pool;
pub mod synthetic;

pub use pool::{FramePool, Subscription};
pub use synthetic::{ManualBackend, ManualSource, PatternBackend, PatternSource};

use std::sync::Arc;

use capture_targets::{CaptureTarget, Size};

use crate::error::GifSnapResult;
use crate::timestamp::Timestamp;

/// Callback invoked on the delivery context when a frame arrives.
pub type ArrivalHandler = Arc<dyn Fn() + Send + Sync>;

/// A captured frame resident on the GPU.
///
/// The surface is shared with the source so that it can recycle it once
/// every consumer has let go.
pub struct SourceFrame<S> {
    pub surface: Arc<S>,
    pub size: Size,
    pub timestamp: Timestamp,
}

impl<S> SourceFrame<S> {
    pub fn new(surface: Arc<S>, size: Size, timestamp: Timestamp) -> Self {
        Self {
            surface,
            size,
            timestamp,
        }
    }
}

impl<S> std::fmt::Debug for SourceFrame<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceFrame")
            .field("size", &self.size)
            .field("timestamp", &self.timestamp)
            .finish()
    }
}

/// Opens capture sources whose frames live in surfaces of type `S`.
pub trait CaptureBackend<S>: Send + Sync + 'static {
    type Source: FrameSource<S>;

    /// Open a source for `target` delivering frames of `frame_size`, holding
    /// at most `pool_depth` undelivered frames.
    fn open(
        &self,
        target: &CaptureTarget,
        frame_size: Size,
        pool_depth: usize,
    ) -> GifSnapResult<Self::Source>;
}

/// An opened capture source.
///
/// `unsubscribe` and `close` must not wait for an arrival handler that is
/// currently running: the handler may itself be waiting on the caller.
pub trait FrameSource<S>: Send + 'static {
    fn subscribe(&mut self, handler: ArrivalHandler) -> Subscription;

    fn unsubscribe(&mut self, subscription: Subscription);

    /// Begin delivering frames.
    fn start_capture(&mut self) -> GifSnapResult<()>;

    /// Newest available frame, discarding older ones.
    fn try_get_latest_frame(&mut self) -> Option<SourceFrame<S>>;

    /// Stop delivery and release the pool. Idempotent.
    fn close(&mut self);
}

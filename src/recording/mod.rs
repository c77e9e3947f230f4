//! Capture session lifecycle.
//!
//! [`CaptureController`] owns at most one session. `start`, `stop` and the
//! arrival callback run under one exclusive lock, so a frame is never
//! composed while the session is being torn down and a callback that lost the
//! race to `stop` sees an idle controller and does nothing.
//!
//! ## Flow
//! ```text
//! start(target, region, sink)
//!   -> FrameCompositor::new(region)
//!   -> backend.open(target) -> subscribe(arrival) -> start_capture()
//! arrival (source delivery thread)
//!   -> try_get_latest_frame() -> compositor.process() -> sink.process()
//! stop()
//!   -> unsubscribe -> close -> sink.finish_and_flush()
//! ```

pub mod cadence;
pub mod state;


pub use cadence::CadenceDriver;
pub use state::{CaptureState, SessionStats};

use std::sync::{Arc, Weak};
use std::time::Duration;

use capture_targets::{CaptureTarget, Rect};
use parking_lot::Mutex;

use crate::capture::{CaptureBackend, FrameSource};
use crate::config::{get_frame_pool_depth, CaptureConfig};
use crate::encoder::EncodingSink;
use crate::error::{GifSnapError, GifSnapResult};
use crate::gpu::GpuDevice;
use crate::rendering::FrameCompositor;
use crate::timestamp::Timestamp;

use state::{ActiveSession, DeliveryError, SessionState};

struct ControllerInner<D: GpuDevice, B: CaptureBackend<D::Surface>> {
    device: Arc<D>,
    backend: B,
    pool_depth: usize,
    state: Mutex<SessionState<D, B::Source>>,
}

impl<D: GpuDevice, B: CaptureBackend<D::Surface>> ControllerInner<D, B> {
    fn on_frame_arrived(&self) -> GifSnapResult<bool> {
        let mut state = self.state.lock();
        let outcome = match &mut *state {
            SessionState::Active(session) => session.deliver_latest(),
            // Late callback after stop
            SessionState::Idle => return Ok(false),
        };
        Self::settle(&mut state, outcome)
    }

    /// Turn a delivery outcome into the caller's result. A fatal error tears
    /// the session down before it is returned.
    fn settle(
        state: &mut SessionState<D, B::Source>,
        outcome: Result<bool, DeliveryError>,
    ) -> GifSnapResult<bool> {
        match outcome {
            Ok(delivered) => Ok(delivered),
            Err(DeliveryError::Sink(e)) => {
                log::warn!("[CAPTURE] Sink rejected frame: {}", e);
                Err(e)
            }
            Err(DeliveryError::Fatal(e)) => {
                log::error!("[CAPTURE] Frame processing failed, stopping session: {}", e);
                if let Some(session) = state.take() {
                    if let Err(flush) = session.teardown() {
                        log::error!("[CAPTURE] Flush after failure also failed: {}", flush);
                    }
                }
                Err(e)
            }
        }
    }
}

impl<D: GpuDevice, B: CaptureBackend<D::Surface>> Drop for ControllerInner<D, B> {
    fn drop(&mut self) {
        if let Some(session) = self.state.get_mut().take() {
            log::warn!("[CAPTURE] Controller dropped during capture, stopping");
            if let Err(e) = session.teardown() {
                log::error!("[CAPTURE] Flush on drop failed: {}", e);
            }
        }
    }
}

/// Single-session capture lifecycle controller.
///
/// Cheap to clone; clones share the same session.
pub struct CaptureController<D: GpuDevice, B: CaptureBackend<D::Surface>> {
    inner: Arc<ControllerInner<D, B>>,
}

impl<D: GpuDevice, B: CaptureBackend<D::Surface>> Clone for CaptureController<D, B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<D: GpuDevice, B: CaptureBackend<D::Surface>> CaptureController<D, B> {
    /// Create a controller using the global capture config.
    pub fn new(device: Arc<D>, backend: B) -> Self {
        Self::with_pool_depth(device, backend, get_frame_pool_depth())
    }

    pub fn with_config(device: Arc<D>, backend: B, config: &CaptureConfig) -> Self {
        Self::with_pool_depth(device, backend, config.frame_pool_depth)
    }

    fn with_pool_depth(device: Arc<D>, backend: B, pool_depth: usize) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                device,
                backend,
                pool_depth: pool_depth.max(1),
                state: Mutex::new(SessionState::Idle),
            }),
        }
    }

    pub fn device(&self) -> &Arc<D> {
        &self.inner.device
    }

    /// Begin capturing `region` of `target` into `sink`.
    ///
    /// Returns `Ok(false)` without touching `sink` if a session is already
    /// active. On error the controller stays idle and everything acquired so
    /// far is released.
    pub fn start<K>(&self, target: &CaptureTarget, region: Rect, sink: K) -> GifSnapResult<bool>
    where
        K: EncodingSink<D::Surface> + 'static,
    {
        let mut state = self.inner.state.lock();
        if state.is_active() {
            log::warn!("[CAPTURE] Start ignored, a session is already active");
            return Ok(false);
        }

        if region.is_empty() {
            return Err(GifSnapError::InvalidRegion(format!(
                "Region {:?} has no pixels",
                region
            )));
        }
        let frame_size = target.size();
        if frame_size.is_empty() {
            return Err(GifSnapError::TargetUnavailable(format!(
                "Target {:?} has no pixels",
                target.kind()
            )));
        }

        let compositor = FrameCompositor::new(Arc::clone(&self.inner.device), frame_size, region)?;
        let mut source = self
            .inner
            .backend
            .open(target, frame_size, self.inner.pool_depth)?;

        let weak: Weak<ControllerInner<D, B>> = Arc::downgrade(&self.inner);
        let subscription = source.subscribe(Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                if let Err(e) = inner.on_frame_arrived() {
                    log::debug!("[CAPTURE] Arrival handling failed: {}", e);
                }
            }
        }));

        if let Err(e) = source.start_capture() {
            log::error!("[CAPTURE] Failed to start capture: {}", e);
            source.unsubscribe(subscription);
            source.close();
            return Err(e);
        }

        *state = SessionState::Active(Box::new(ActiveSession::new(
            *target,
            source,
            subscription,
            compositor,
            Box::new(sink),
        )));

        log::info!(
            "[CAPTURE] Started: {:?} {} region {}x{} at ({}, {})",
            target.kind(),
            frame_size,
            region.width,
            region.height,
            region.x,
            region.y
        );
        Ok(true)
    }

    /// End the session and flush the sink.
    ///
    /// Returns `Ok(false)` if idle. The controller is idle afterwards even when
    /// the flush fails; that error is returned.
    pub fn stop(&self) -> GifSnapResult<bool> {
        let mut state = self.inner.state.lock();
        let Some(session) = state.take() else {
            return Ok(false);
        };

        let stats = session.stats;
        let kind = session.target.kind();
        let elapsed = session.started_at.elapsed();
        let result = session.teardown();

        log::info!(
            "[CAPTURE] Stopped {:?} after {:.2}s: {} delivered, {} repeated, {} out of order",
            kind,
            elapsed.as_secs_f64(),
            stats.frames_delivered,
            stats.frames_repeated,
            stats.frames_out_of_order
        );

        if let Err(e) = result {
            log::error!("[CAPTURE] Sink flush failed: {}", e);
            return Err(e);
        }
        Ok(true)
    }

    /// Handle a frame-arrival notification.
    ///
    /// Normally called from the source's delivery thread. Returns whether a
    /// frame reached the sink.
    pub fn on_frame_arrived(&self) -> GifSnapResult<bool> {
        self.inner.on_frame_arrived()
    }

    /// Reissue the last composed frame under `timestamp`.
    ///
    /// Does nothing when idle, before the first frame, or when `timestamp` is
    /// earlier than the last delivered one. A frame already queued by the
    /// source is delivered instead of the repeat.
    pub fn repeat_last_frame(&self, timestamp: Timestamp) -> GifSnapResult<bool> {
        let mut state = self.inner.state.lock();
        let outcome = match &mut *state {
            SessionState::Active(session) => session.repeat(timestamp),
            SessionState::Idle => return Ok(false),
        };
        ControllerInner::<D, B>::settle(&mut state, outcome)
    }

    /// Repeat the last frame at the current time if nothing reached the sink
    /// for `max_age`.
    pub fn repeat_if_stale(&self, max_age: Duration) -> GifSnapResult<bool> {
        let mut state = self.inner.state.lock();
        let outcome = match &mut *state {
            SessionState::Active(session) if session.is_stale(max_age) => {
                session.repeat(Timestamp::now())
            }
            _ => return Ok(false),
        };
        ControllerInner::<D, B>::settle(&mut state, outcome)
    }

    pub fn is_active(&self) -> bool {
        self.inner.state.lock().is_active()
    }

    pub fn state(&self) -> CaptureState {
        self.inner.state.lock().to_capture_state()
    }

    /// Counters of the active session, if any.
    pub fn stats(&self) -> Option<SessionStats> {
        match &*self.inner.state.lock() {
            SessionState::Active(session) => Some(session.stats),
            SessionState::Idle => None,
        }
    }

    /// Region of the active session, if any.
    pub fn region(&self) -> Option<Rect> {
        match &*self.inner.state.lock() {
            SessionState::Active(session) => Some(session.region()),
            SessionState::Idle => None,
        }
    }
}

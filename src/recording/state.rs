//! Capture session state.
//!
//! The controller holds a [`SessionState`] behind its lock. Everything that
//! only exists while recording (the opened source, its arrival subscription,
//! the compositor and the sink) lives inside the `Active` variant, so an idle
//! controller cannot reach any of it.

use std::time::{Duration, Instant};

use capture_targets::{CaptureTarget, Rect};
use serde::{Deserialize, Serialize};

use crate::capture::{FrameSource, Subscription};
use crate::encoder::EncodingSink;
use crate::error::{GifSnapError, GifSnapResult};
use crate::gpu::GpuDevice;
use crate::rendering::FrameCompositor;
use crate::timestamp::Timestamp;

/// Externally visible controller state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum CaptureState {
    /// No session.
    Idle,
    /// Capturing into a sink.
    Active {
        #[serde(rename = "elapsedSecs")]
        elapsed_secs: f64,
        #[serde(rename = "frameCount")]
        frame_count: u64,
    },
}

/// Per-session counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Frames composed and accepted by the sink.
    pub frames_delivered: u64,
    /// Last composed frame reissued under a newer timestamp.
    pub frames_repeated: u64,
    /// Source frames older than the last delivered one, skipped.
    pub frames_out_of_order: u64,
    /// Timestamp of the last frame handed to the sink.
    pub last_timestamp: Option<Timestamp>,
}

/// Why delivering a frame failed.
pub(crate) enum DeliveryError {
    /// Compositor or GPU failure; the session cannot continue.
    Fatal(GifSnapError),
    /// The sink rejected the frame; the session stays active.
    Sink(GifSnapError),
}

pub(crate) struct ActiveSession<D: GpuDevice, Src: FrameSource<D::Surface>> {
    pub target: CaptureTarget,
    pub source: Src,
    pub subscription: Subscription,
    pub compositor: FrameCompositor<D>,
    pub sink: Box<dyn EncodingSink<D::Surface>>,
    pub stats: SessionStats,
    pub started_at: Instant,
    pub last_delivery: Instant,
}

impl<D: GpuDevice, Src: FrameSource<D::Surface>> ActiveSession<D, Src> {
    pub fn new(
        target: CaptureTarget,
        source: Src,
        subscription: Subscription,
        compositor: FrameCompositor<D>,
        sink: Box<dyn EncodingSink<D::Surface>>,
    ) -> Self {
        let now = Instant::now();
        Self {
            target,
            source,
            subscription,
            compositor,
            sink,
            stats: SessionStats::default(),
            started_at: now,
            last_delivery: now,
        }
    }

    pub fn region(&self) -> Rect {
        self.compositor.region()
    }

    fn accepts(&self, timestamp: Timestamp) -> bool {
        self.stats.last_timestamp.map_or(true, |last| timestamp >= last)
    }

    /// Compose the newest source frame and hand it to the sink.
    ///
    /// Returns false when there was nothing to deliver.
    pub fn deliver_latest(&mut self) -> Result<bool, DeliveryError> {
        let Some(frame) = self.source.try_get_latest_frame() else {
            return Ok(false);
        };

        if !self.accepts(frame.timestamp) {
            self.stats.frames_out_of_order += 1;
            log::warn!(
                "[CAPTURE] Skipping frame at {} older than last delivered {:?}",
                frame.timestamp,
                self.stats.last_timestamp
            );
            return Ok(false);
        }

        let composed = self
            .compositor
            .process(&frame)
            .map_err(DeliveryError::Fatal)?;
        self.sink.process(&composed).map_err(DeliveryError::Sink)?;

        self.stats.frames_delivered += 1;
        self.stats.last_timestamp = Some(frame.timestamp);
        self.last_delivery = Instant::now();
        log::debug!("[CAPTURE] Delivered frame at {}", frame.timestamp);
        Ok(true)
    }

    /// Reissue the last composed frame under `timestamp`.
    ///
    /// A frame already queued by the source wins: it is delivered instead and
    /// no repeat is issued.
    pub fn repeat(&mut self, timestamp: Timestamp) -> Result<bool, DeliveryError> {
        if self.deliver_latest()? {
            return Ok(false);
        }
        if !self.compositor.has_composed() || !self.accepts(timestamp) {
            return Ok(false);
        }

        self.sink
            .process(&self.compositor.repeat_frame(timestamp))
            .map_err(DeliveryError::Sink)?;

        self.stats.frames_repeated += 1;
        self.stats.last_timestamp = Some(timestamp);
        self.last_delivery = Instant::now();
        Ok(true)
    }

    pub fn is_stale(&self, max_age: Duration) -> bool {
        self.last_delivery.elapsed() >= max_age
    }

    /// Detach from the source, close it and flush the sink.
    ///
    /// The source is always released; a flush error is returned afterwards.
    pub fn teardown(self) -> GifSnapResult<()> {
        let ActiveSession {
            mut source,
            subscription,
            mut sink,
            ..
        } = self;

        source.unsubscribe(subscription);
        source.close();
        sink.finish_and_flush()
    }
}

pub(crate) enum SessionState<D: GpuDevice, Src: FrameSource<D::Surface>> {
    Idle,
    Active(Box<ActiveSession<D, Src>>),
}

impl<D: GpuDevice, Src: FrameSource<D::Surface>> SessionState<D, Src> {
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Active(_))
    }

    pub fn take(&mut self) -> Option<Box<ActiveSession<D, Src>>> {
        match std::mem::replace(self, SessionState::Idle) {
            SessionState::Idle => None,
            SessionState::Active(session) => Some(session),
        }
    }

    pub fn to_capture_state(&self) -> CaptureState {
        match self {
            SessionState::Idle => CaptureState::Idle,
            SessionState::Active(session) => CaptureState::Active {
                elapsed_secs: session.started_at.elapsed().as_secs_f64(),
                frame_count: session.stats.frames_delivered + session.stats.frames_repeated,
            },
        }
    }
}

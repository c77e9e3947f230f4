//! Capture sources that do not need a compositor or screen.
//!
//! [`PatternBackend`] renders a moving test pattern on its own thread, which
//! then acts as the delivery context. [`ManualBackend`] lets the embedding
//! code push frames itself and delivers arrivals on the pushing thread.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use capture_targets::{CaptureTarget, Size};
use parking_lot::Mutex;

use super::{ArrivalHandler, CaptureBackend, FramePool, FrameSource, SourceFrame, Subscription};
use crate::error::{GifSnapError, GifSnapResult};
use crate::gpu::{GpuDevice, SurfaceDescriptor, BYTES_PER_PIXEL};
use crate::timestamp::Timestamp;

/// Width of the moving bar in the test pattern.
const BAR_WIDTH: u32 = 48;
/// Horizontal distance the bar travels per frame.
const BAR_STEP: u32 = 12;

fn check_frame_size(target: &CaptureTarget, frame_size: Size) -> GifSnapResult<()> {
    if target.size().is_empty() || frame_size.is_empty() {
        return Err(GifSnapError::TargetUnavailable(format!(
            "Capture target {:?} has no pixels",
            target.kind()
        )));
    }
    Ok(())
}

/// Fill `out` with frame `index` of the test pattern.
///
/// A diagonal gradient background with a white vertical bar that sweeps left
/// to right.
pub fn render_pattern(size: Size, index: u64, out: &mut Vec<u8>) {
    let Size { width, height } = size;
    out.clear();
    out.reserve((width * height * BYTES_PER_PIXEL) as usize);

    let sweep = width + BAR_WIDTH;
    let bar_x = ((index * BAR_STEP as u64) % sweep as u64) as u32;
    let bar = bar_x.saturating_sub(BAR_WIDTH)..bar_x;

    for y in 0..height {
        for x in 0..width {
            if bar.contains(&x) {
                out.extend_from_slice(&[255, 255, 255, 255]);
            } else {
                let b = (x * 255 / width.max(1)) as u8;
                let g = (y * 255 / height.max(1)) as u8;
                let r = (index % 256) as u8;
                out.extend_from_slice(&[b, g, r, 255]);
            }
        }
    }
}

/// Opens [`PatternSource`]s on a GPU device.
pub struct PatternBackend<D: GpuDevice> {
    device: Arc<D>,
    fps: u32,
}

impl<D: GpuDevice> PatternBackend<D> {
    pub fn new(device: Arc<D>, fps: u32) -> Self {
        Self {
            device,
            fps: fps.clamp(1, 120),
        }
    }
}

impl<D: GpuDevice> CaptureBackend<D::Surface> for PatternBackend<D> {
    type Source = PatternSource<D>;

    fn open(
        &self,
        target: &CaptureTarget,
        frame_size: Size,
        pool_depth: usize,
    ) -> GifSnapResult<PatternSource<D>> {
        check_frame_size(target, frame_size)?;

        log::info!(
            "[CAPTURE] Opening pattern source {} at {} fps (pool depth {})",
            frame_size,
            self.fps,
            pool_depth
        );

        Ok(PatternSource {
            device: Arc::clone(&self.device),
            pool: Arc::new(FramePool::new(pool_depth)),
            size: frame_size,
            interval: Duration::from_secs_f64(1.0 / self.fps as f64),
            stop: Arc::new(AtomicBool::new(false)),
            gpu_gate: Arc::new(Mutex::new(())),
            thread: None,
        })
    }
}

/// Synthetic source rendering a test pattern on a background thread.
pub struct PatternSource<D: GpuDevice> {
    device: Arc<D>,
    pool: Arc<FramePool<D::Surface>>,
    size: Size,
    interval: Duration,
    stop: Arc<AtomicBool>,
    /// Held by the pattern thread while it uses the device.
    gpu_gate: Arc<Mutex<()>>,
    thread: Option<JoinHandle<()>>,
}

impl<D: GpuDevice> PatternSource<D> {
    pub fn dropped_frames(&self) -> u64 {
        self.pool.dropped_frames()
    }
}

/// Reuse a surface only this thread still holds, or allocate a new one while
/// under `max`.
fn acquire_surface<D: GpuDevice>(
    device: &D,
    surfaces: &mut Vec<Arc<D::Surface>>,
    max: usize,
    size: Size,
) -> GifSnapResult<Option<Arc<D::Surface>>> {
    if let Some(free) = surfaces.iter().find(|s| Arc::strong_count(s) == 1) {
        return Ok(Some(Arc::clone(free)));
    }
    if surfaces.len() >= max {
        return Ok(None);
    }
    let surface = Arc::new(device.create_surface(&SurfaceDescriptor::bgra("Pattern Frame", size))?);
    surfaces.push(Arc::clone(&surface));
    Ok(Some(surface))
}

fn run_pattern<D: GpuDevice>(
    device: Arc<D>,
    pool: Arc<FramePool<D::Surface>>,
    size: Size,
    interval: Duration,
    stop: Arc<AtomicBool>,
    gpu_gate: Arc<Mutex<()>>,
) {
    let max_surfaces = pool.depth() + 2;
    let mut surfaces: Vec<Arc<D::Surface>> = Vec::with_capacity(max_surfaces);
    let mut pixels = Vec::new();
    let mut index = 0u64;
    let mut next_deadline = Instant::now();

    loop {
        let uploaded = {
            let _gate = gpu_gate.lock();
            if stop.load(Ordering::SeqCst) {
                break;
            }
            acquire_surface(&*device, &mut surfaces, max_surfaces, size).and_then(|surface| {
                let Some(surface) = surface else {
                    return Ok(None);
                };
                render_pattern(size, index, &mut pixels);
                device.write_surface(&surface, &pixels)?;
                Ok(Some(surface))
            })
        };

        let surface = match uploaded {
            Ok(Some(surface)) => surface,
            Ok(None) => {
                log::warn!("[CAPTURE] All pattern frames in use, skipping frame {}", index);
                index += 1;
                thread::sleep(interval);
                continue;
            }
            Err(e) => {
                log::error!("[CAPTURE] Pattern frame {} failed: {}", index, e);
                break;
            }
        };

        if !pool.deliver(SourceFrame::new(surface, size, Timestamp::now())) {
            break;
        }
        index += 1;

        next_deadline += interval;
        let now = Instant::now();
        if next_deadline > now {
            thread::sleep(next_deadline - now);
        } else {
            next_deadline = now;
        }
    }

    log::debug!("[CAPTURE] Pattern thread exiting after {} frames", index);
}

impl<D: GpuDevice> FrameSource<D::Surface> for PatternSource<D> {
    fn subscribe(&mut self, handler: ArrivalHandler) -> Subscription {
        self.pool.subscribe(handler)
    }

    fn unsubscribe(&mut self, subscription: Subscription) {
        self.pool.unsubscribe(subscription);
    }

    fn start_capture(&mut self) -> GifSnapResult<()> {
        if self.thread.is_some() {
            return Ok(());
        }
        if self.pool.is_closed() {
            return Err(GifSnapError::CaptureError(
                "Pattern source already closed".to_string(),
            ));
        }

        let device = Arc::clone(&self.device);
        let pool = Arc::clone(&self.pool);
        let stop = Arc::clone(&self.stop);
        let gpu_gate = Arc::clone(&self.gpu_gate);
        let (size, interval) = (self.size, self.interval);

        let handle = thread::Builder::new()
            .name("gifsnap-pattern".to_string())
            .spawn(move || run_pattern(device, pool, size, interval, stop, gpu_gate))
            .map_err(|e| {
                GifSnapError::CaptureError(format!("Failed to spawn pattern thread: {}", e))
            })?;
        self.thread = Some(handle);
        Ok(())
    }

    fn try_get_latest_frame(&mut self) -> Option<SourceFrame<D::Surface>> {
        self.pool.try_get_latest()
    }

    fn close(&mut self) {
        // Waits out an in-flight upload, so no device work follows close
        {
            let _gate = self.gpu_gate.lock();
            self.stop.store(true, Ordering::SeqCst);
        }
        self.pool.close();
        // Not joined: the thread may be blocked in a handler waiting on our caller
        if self.thread.take().is_some() {
            log::debug!(
                "[CAPTURE] Pattern source closed ({} frames dropped)",
                self.pool.dropped_frames()
            );
        }
    }
}

impl<D: GpuDevice> Drop for PatternSource<D> {
    fn drop(&mut self) {
        self.close();
    }
}

struct ManualShared<S> {
    pool: Mutex<Option<Arc<FramePool<S>>>>,
    capturing: AtomicBool,
    opened: AtomicUsize,
    fail_next_open: AtomicBool,
    fail_next_start: AtomicBool,
}

/// Backend whose frames are pushed by the caller.
///
/// Clones share state, so a test can keep one handle while the controller
/// owns another.
pub struct ManualBackend<S> {
    shared: Arc<ManualShared<S>>,
}

impl<S> Clone for ManualBackend<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S> Default for ManualBackend<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> ManualBackend<S> {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(ManualShared {
                pool: Mutex::new(None),
                capturing: AtomicBool::new(false),
                opened: AtomicUsize::new(0),
                fail_next_open: AtomicBool::new(false),
                fail_next_start: AtomicBool::new(false),
            }),
        }
    }

    fn current_pool(&self) -> Option<Arc<FramePool<S>>> {
        self.shared.pool.lock().clone()
    }

    /// Push a frame into the open source and notify on this thread.
    ///
    /// Returns false if no source is currently capturing.
    pub fn deliver(&self, frame: SourceFrame<S>) -> bool {
        if !self.is_capturing() {
            return false;
        }
        match self.current_pool() {
            Some(pool) => pool.deliver(frame),
            None => false,
        }
    }

    /// Queue a frame without notifying.
    pub fn push(&self, frame: SourceFrame<S>) -> bool {
        if !self.is_capturing() {
            return false;
        }
        self.current_pool().is_some_and(|pool| pool.push(frame))
    }

    /// Fire the arrival handler without queueing anything.
    pub fn notify(&self) {
        if let Some(pool) = self.current_pool() {
            pool.notify();
        }
    }

    pub fn is_capturing(&self) -> bool {
        self.shared.capturing.load(Ordering::SeqCst)
    }

    /// Number of sources opened so far.
    pub fn open_count(&self) -> usize {
        self.shared.opened.load(Ordering::SeqCst)
    }

    pub fn fail_next_open(&self) {
        self.shared.fail_next_open.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_start(&self) {
        self.shared.fail_next_start.store(true, Ordering::SeqCst);
    }

    /// Frames dropped by the most recently opened source.
    pub fn dropped_frames(&self) -> u64 {
        self.current_pool().map_or(0, |pool| pool.dropped_frames())
    }
}

impl<S: Send + Sync + 'static> CaptureBackend<S> for ManualBackend<S> {
    type Source = ManualSource<S>;

    fn open(
        &self,
        target: &CaptureTarget,
        frame_size: Size,
        pool_depth: usize,
    ) -> GifSnapResult<ManualSource<S>> {
        check_frame_size(target, frame_size)?;
        if self.shared.fail_next_open.swap(false, Ordering::SeqCst) {
            return Err(GifSnapError::CaptureError(
                "Capture source refused to open".to_string(),
            ));
        }

        let pool = Arc::new(FramePool::new(pool_depth));
        *self.shared.pool.lock() = Some(Arc::clone(&pool));
        self.shared.opened.fetch_add(1, Ordering::SeqCst);

        Ok(ManualSource {
            pool,
            shared: Arc::clone(&self.shared),
        })
    }
}

/// Source opened by a [`ManualBackend`].
pub struct ManualSource<S> {
    pool: Arc<FramePool<S>>,
    shared: Arc<ManualShared<S>>,
}

impl<S: Send + Sync + 'static> FrameSource<S> for ManualSource<S> {
    fn subscribe(&mut self, handler: ArrivalHandler) -> Subscription {
        self.pool.subscribe(handler)
    }

    fn unsubscribe(&mut self, subscription: Subscription) {
        self.pool.unsubscribe(subscription);
    }

    fn start_capture(&mut self) -> GifSnapResult<()> {
        if self.shared.fail_next_start.swap(false, Ordering::SeqCst) {
            return Err(GifSnapError::CaptureError(
                "Capture source failed to start".to_string(),
            ));
        }
        self.shared.capturing.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn try_get_latest_frame(&mut self) -> Option<SourceFrame<S>> {
        self.pool.try_get_latest()
    }

    fn close(&mut self) {
        self.shared.capturing.store(false, Ordering::SeqCst);
        self.pool.close();
    }
}

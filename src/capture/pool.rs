//! Bounded frame pool shared between a capture thread and its consumer.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

use super::{ArrivalHandler, SourceFrame};

/// Registration of an arrival handler with a [`FramePool`].
///
/// Consumed by `unsubscribe`, so a token cannot be released twice.
#[derive(Debug, PartialEq, Eq)]
pub struct Subscription(u64);

impl Subscription {
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Fixed-depth queue of captured frames.
///
/// Pushing into a full pool drops the oldest frame. Taking the latest frame
/// discards everything older. Order is never changed.
pub struct FramePool<S> {
    depth: usize,
    frames: Mutex<VecDeque<SourceFrame<S>>>,
    handler: Mutex<Option<(u64, ArrivalHandler)>>,
    next_token: AtomicU64,
    dropped: AtomicU64,
    closed: AtomicBool,
}

impl<S> FramePool<S> {
    pub fn new(depth: usize) -> Self {
        let depth = depth.max(1);
        Self {
            depth,
            frames: Mutex::new(VecDeque::with_capacity(depth)),
            handler: Mutex::new(None),
            next_token: AtomicU64::new(1),
            dropped: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.lock().is_empty()
    }

    /// Frames discarded by overflow or by taking a newer frame.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Queue a frame. Returns false if the pool is closed.
    pub fn push(&self, frame: SourceFrame<S>) -> bool {
        if self.is_closed() {
            return false;
        }

        let mut frames = self.frames.lock();
        while frames.len() >= self.depth {
            frames.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        frames.push_back(frame);
        true
    }

    /// Invoke the arrival handler, if any, on the calling thread.
    ///
    /// The handler runs without any pool lock held.
    pub fn notify(&self) {
        let handler = self.handler.lock().as_ref().map(|(_, h)| h.clone());
        if let Some(handler) = handler {
            handler();
        }
    }

    /// Push and notify. Returns false if the pool is closed.
    pub fn deliver(&self, frame: SourceFrame<S>) -> bool {
        if !self.push(frame) {
            return false;
        }
        self.notify();
        true
    }

    /// Take the newest frame and discard any older ones.
    pub fn try_get_latest(&self) -> Option<SourceFrame<S>> {
        let mut frames = self.frames.lock();
        let latest = frames.pop_back()?;
        let skipped = frames.len() as u64;
        frames.clear();
        if skipped > 0 {
            self.dropped.fetch_add(skipped, Ordering::Relaxed);
        }
        Some(latest)
    }

    /// Register the arrival handler, replacing any previous one.
    pub fn subscribe(&self, handler: ArrivalHandler) -> Subscription {
        let token = self.next_token.fetch_add(1, Ordering::SeqCst);
        *self.handler.lock() = Some((token, handler));
        Subscription(token)
    }

    /// Remove the handler registered under `subscription`.
    ///
    /// A handler already running on another thread is not waited for.
    pub fn unsubscribe(&self, subscription: Subscription) {
        let mut handler = self.handler.lock();
        if matches!(handler.as_ref(), Some((token, _)) if *token == subscription.0) {
            *handler = None;
        }
    }

    /// Refuse further frames, drop queued ones and forget the handler.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.frames.lock().clear();
        *self.handler.lock() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timestamp::Timestamp;
    use capture_targets::Size;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn frame(ms: u64) -> SourceFrame<u32> {
        SourceFrame::new(Arc::new(ms as u32), Size::new(1, 1), Timestamp::from_millis(ms))
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let pool = FramePool::new(2);
        pool.push(frame(0));
        pool.push(frame(33));
        pool.push(frame(66));

        assert_eq!(pool.len(), 2);
        assert_eq!(pool.dropped_frames(), 1);

        let latest = pool.try_get_latest().unwrap();
        assert_eq!(latest.timestamp, Timestamp::from_millis(66));
        // The 33ms frame is discarded with it
        assert!(pool.is_empty());
        assert_eq!(pool.dropped_frames(), 2);
    }

    #[test]
    fn test_latest_on_empty_pool() {
        let pool: FramePool<u32> = FramePool::new(2);
        assert!(pool.try_get_latest().is_none());
    }

    #[test]
    fn test_zero_depth_is_clamped() {
        let pool: FramePool<u32> = FramePool::new(0);
        assert_eq!(pool.depth(), 1);
    }

    #[test]
    fn test_deliver_notifies_subscriber() {
        let pool = FramePool::new(2);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let sub = pool.subscribe(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        assert!(pool.deliver(frame(0)));
        assert!(pool.deliver(frame(33)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        pool.unsubscribe(sub);
        assert!(pool.deliver(frame(66)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_stale_token_does_not_remove_new_handler() {
        let pool: FramePool<u32> = FramePool::new(2);
        let calls = Arc::new(AtomicUsize::new(0));

        let first = pool.subscribe(Arc::new(|| {}));
        let counter = Arc::clone(&calls);
        let _second = pool.subscribe(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        pool.unsubscribe(first);
        pool.notify();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_handler_may_take_frames() {
        let pool = Arc::new(FramePool::new(2));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let weak = Arc::downgrade(&pool);
        let sink = Arc::clone(&seen);
        pool.subscribe(Arc::new(move || {
            if let Some(pool) = weak.upgrade() {
                if let Some(frame) = pool.try_get_latest() {
                    sink.lock().push(frame.timestamp.as_millis());
                }
            }
        }));

        pool.deliver(frame(0));
        pool.deliver(frame(33));
        assert_eq!(*seen.lock(), vec![0, 33]);
    }

    #[test]
    fn test_closed_pool_rejects_frames() {
        let pool = FramePool::new(2);
        pool.push(frame(0));
        pool.close();

        assert!(pool.is_closed());
        assert!(pool.is_empty());
        assert!(!pool.deliver(frame(33)));
    }
}

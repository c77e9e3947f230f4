//! Monotonic frame timestamps.
//!
//! Capture sources stamp each frame with the time it was captured, measured
//! from a process-wide anchor. Only ordering and differences between stamps
//! carry meaning.

use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Process-wide reference point for [`Timestamp::now`].
static ANCHOR: OnceLock<Instant> = OnceLock::new();

#[inline]
fn anchor() -> Instant {
    *ANCHOR.get_or_init(Instant::now)
}

/// A point on the capture timeline.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(Duration);

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(Duration::ZERO);

    pub fn from_millis(ms: u64) -> Self {
        Self(Duration::from_millis(ms))
    }

    /// Time elapsed since the process anchor.
    pub fn now() -> Self {
        Self(anchor().elapsed())
    }

    pub fn as_millis(&self) -> u64 {
        self.0.as_millis() as u64
    }

    /// Duration since an earlier timestamp.
    ///
    /// Returns `Duration::ZERO` if `earlier` is later than `self`.
    pub fn duration_since(&self, earlier: Timestamp) -> Duration {
        self.0.saturating_sub(earlier.0)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.3}s", self.0.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_is_monotonic() {
        let t1 = Timestamp::now();
        std::thread::sleep(Duration::from_millis(5));
        let t2 = Timestamp::now();
        assert!(t2 > t1);
        assert!(t2.duration_since(t1) >= Duration::from_millis(5));
    }

    #[test]
    fn test_duration_since_saturates() {
        let early = Timestamp::from_millis(33);
        let late = Timestamp::from_millis(66);

        assert_eq!(late.duration_since(early), Duration::from_millis(33));
        assert_eq!(early.duration_since(late), Duration::ZERO);
    }

    #[test]
    fn test_ordering() {
        let mut stamps = vec![
            Timestamp::from_millis(66),
            Timestamp::from_millis(0),
            Timestamp::from_millis(33),
        ];
        stamps.sort();
        assert_eq!(stamps[0].as_millis(), 0);
        assert_eq!(stamps[2].as_millis(), 66);
    }
}

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Instant;

use crate::structs::format::FrameRate;

/// Display delay applied to frames that have no timestamp to anchor on.
pub const DEFAULT_PTS_DELAY: i64 = 300_000;

pub const MICROSECONDS: u64 = 1_000_000;

/// Monotonic time source, in the same ticks as presentation timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

/// Microseconds elapsed since the clock was created.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        self.origin.elapsed().as_micros() as i64
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Clone, Default)]
pub struct ManualClock(Arc<AtomicI64>);

impl ManualClock {
    pub fn new(start: i64) -> Self {
        Self(Arc::new(AtomicI64::new(start)))
    }

    pub fn set(&self, now: i64) {
        self.0.store(now, Ordering::Release);
    }

    pub fn advance(&self, ticks: i64) {
        self.0.fetch_add(ticks, Ordering::AcqRel);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.0.load(Ordering::Acquire)
    }
}

/// Most recent authoritative timestamp and the frames produced since.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimestampAnchor {
    pub pts: Option<i64>,
    pub frames_since: u64,
}

/// Presentation timestamps for decoded frames.
///
/// Packets carrying a positive timestamp re-anchor the sequence; frames
/// after the anchor are spaced by the stream frame rate.
#[derive(Debug, Clone, Copy)]
pub struct TimestampAssigner {
    ticks_per_second: u64,
    default_delay: i64,
}

impl Default for TimestampAssigner {
    fn default() -> Self {
        Self {
            ticks_per_second: MICROSECONDS,
            default_delay: DEFAULT_PTS_DELAY,
        }
    }
}

impl TimestampAssigner {
    pub fn new(ticks_per_second: u64, default_delay: i64) -> Self {
        Self {
            ticks_per_second: ticks_per_second.max(1),
            default_delay,
        }
    }

    pub fn ticks_per_second(&self) -> u64 {
        self.ticks_per_second
    }

    /// Records the timestamp of an incoming packet.
    ///
    /// Only positive timestamps are authoritative; anything else leaves the
    /// current anchor untouched.
    pub fn anchor(&self, anchor: &mut TimestampAnchor, pts: Option<i64>) {
        if let Some(pts) = pts.filter(|&pts| pts > 0) {
            anchor.pts = Some(pts);
            anchor.frames_since = 0;
        }
    }

    /// Timestamp of the next produced frame.
    pub fn next(&self, anchor: &mut TimestampAnchor, rate: FrameRate, now: i64) -> i64 {
        let index = anchor.frames_since;
        anchor.frames_since += 1;

        match anchor.pts {
            Some(pts) if rate.is_known() => pts + rate.offset(index, self.ticks_per_second),
            Some(pts) => pts,
            None => now + self.default_delay,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_are_spaced_by_rate() {
        let assigner = TimestampAssigner::new(1_000, DEFAULT_PTS_DELAY);
        let mut anchor = TimestampAnchor::default();
        let rate = FrameRate::new(25, 1);

        assigner.anchor(&mut anchor, Some(1_000));
        let pts: Vec<_> = (0..3).map(|_| assigner.next(&mut anchor, rate, 0)).collect();
        assert_eq!(pts, [1_000, 1_040, 1_080]);
    }

    #[test]
    fn non_positive_pts_keeps_anchor() {
        let assigner = TimestampAssigner::default();
        let mut anchor = TimestampAnchor::default();
        let rate = FrameRate::new(25, 1);

        assigner.anchor(&mut anchor, Some(500_000));
        assert_eq!(assigner.next(&mut anchor, rate, 0), 500_000);

        assigner.anchor(&mut anchor, Some(0));
        assigner.anchor(&mut anchor, None);
        assert_eq!(assigner.next(&mut anchor, rate, 0), 540_000);
    }

    #[test]
    fn unanchored_frames_use_default_delay() {
        let assigner = TimestampAssigner::default();
        let mut anchor = TimestampAnchor::default();

        let pts = assigner.next(&mut anchor, FrameRate::new(25, 1), 2_000_000);
        assert_eq!(pts, 2_000_000 + DEFAULT_PTS_DELAY);
    }

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(10);
        let shared = clock.clone();
        shared.advance(5);
        assert_eq!(clock.now(), 15);
        clock.set(100);
        assert_eq!(shared.now(), 100);
    }
}

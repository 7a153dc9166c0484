use std::fmt::Display;

use log::{debug, trace};

/// Consecutive late frames tolerated before drawing is suppressed.
pub const SKIP_DRAW_AFTER: u32 = 4;
/// Consecutive late frames tolerated before the decoder is asked to skip work.
pub const SKIP_DECODE_AFTER: u32 = 8;
/// Continuous lateness, in microseconds, that forces a resynchronisation.
pub const RESYNC_AFTER: i64 = 5_000_000;

/// Lateness counters owned by the decode thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LatenessState {
    pub late_count: u32,
    /// Time at which the current run of late frames began.
    pub episode_start: Option<i64>,
}

impl LatenessState {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Degradation {
    Normal,
    /// Decode fully, do not draw.
    SkipDraw,
    /// Ask the decoder to skip non-reference pictures, do not draw.
    SkipDecode,
}

impl Degradation {
    pub fn draws(self) -> bool {
        self == Degradation::Normal
    }
}

impl Display for Degradation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Degradation::Normal => write!(f, "normal"),
            Degradation::SkipDraw => write!(f, "skip-draw"),
            Degradation::SkipDecode => write!(f, "skip-decode"),
        }
    }
}

/// Maps how far output trails the clock to a degradation level.
///
/// Escalation is monotone in the late count and recovery is immediate: a
/// single on-time frame resets the count to zero.
#[derive(Debug, Clone, Copy)]
pub struct LatenessController {
    hurry_up: bool,
    resync_after: i64,
}

impl LatenessController {
    pub fn new(hurry_up: bool) -> Self {
        Self {
            hurry_up,
            resync_after: RESYNC_AFTER,
        }
    }

    /// Overrides the resynchronisation threshold, in clock ticks.
    pub fn with_resync_after(mut self, ticks: i64) -> Self {
        self.resync_after = ticks;
        self
    }

    pub fn degradation(&self, state: &LatenessState) -> Degradation {
        if !self.hurry_up || state.late_count <= SKIP_DRAW_AFTER {
            Degradation::Normal
        } else if state.late_count <= SKIP_DECODE_AFTER {
            Degradation::SkipDraw
        } else {
            Degradation::SkipDecode
        }
    }

    /// Accounts for one produced frame. Returns whether it was late.
    pub fn record(&self, state: &mut LatenessState, pts: i64, now: i64) -> bool {
        if pts <= now {
            state.late_count += 1;
            if state.late_count == 1 {
                state.episode_start = Some(now);
            }
            trace!("late frame #{} ({} behind)", state.late_count, now - pts);
            true
        } else {
            if state.late_count > 0 {
                debug!("back on time after {} late frames", state.late_count);
            }
            state.reset();
            false
        }
    }

    /// Whether the current late episode has lasted long enough to resync.
    pub fn needs_resync(&self, state: &LatenessState, now: i64) -> bool {
        state.late_count > 0
            && state
                .episode_start
                .is_some_and(|start| now - start > self.resync_after)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escalation_thresholds() {
        let controller = LatenessController::new(true);
        let mut state = LatenessState::default();
        let mut levels = Vec::new();

        for _ in 0..10 {
            controller.record(&mut state, 0, 1);
            levels.push(controller.degradation(&state));
        }

        assert_eq!(&levels[..4], [Degradation::Normal; 4]);
        assert_eq!(&levels[4..8], [Degradation::SkipDraw; 4]);
        assert_eq!(&levels[8..], [Degradation::SkipDecode; 2]);
    }

    #[test]
    fn no_degradation_without_hurry_up() {
        let controller = LatenessController::new(false);
        let state = LatenessState {
            late_count: 20,
            episode_start: Some(0),
        };
        assert_eq!(controller.degradation(&state), Degradation::Normal);
    }

    #[test]
    fn on_time_frame_resets_to_zero() {
        let controller = LatenessController::new(true);
        let mut state = LatenessState::default();

        assert!(controller.record(&mut state, 100, 100));
        assert!(controller.record(&mut state, 100, 200));
        assert_eq!(state.late_count, 2);
        assert_eq!(state.episode_start, Some(100));

        assert!(!controller.record(&mut state, 500, 200));
        assert_eq!(state, LatenessState::default());
    }

    #[test]
    fn resync_after_continuous_lateness() {
        let controller = LatenessController::new(false);
        let mut state = LatenessState::default();

        controller.record(&mut state, 0, 1_000);
        assert!(!controller.needs_resync(&state, 1_000 + RESYNC_AFTER));
        assert!(controller.needs_resync(&state, 1_001 + RESYNC_AFTER));

        state.reset();
        assert!(!controller.needs_resync(&state, i64::MAX));
    }
}

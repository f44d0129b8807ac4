use serde_json::Value;
use tracing::debug;

use crate::{
    sanitize,
    state::timer::{Adjustment, EventCategory, TimerState},
};

/// Control commands issued by observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerControl {
    /// Resume the countdown.
    Start,
    /// Stop the countdown without touching the remaining time.
    Pause,
    /// Stop the countdown and clear the remaining time.
    Reset,
    /// Overwrite the remaining time; only honoured while paused.
    SetTime(u64),
    /// Toggle the happy hour multiplier.
    SetHappyHour(bool),
}

/// Owner of the authoritative [`TimerState`].
///
/// Every mutation goes through one of the methods below, which return the new snapshot when
/// the state changed (the version was bumped) and `None` when the request was ignored.
#[derive(Debug, Clone, Default)]
pub struct TimerEngine {
    state: TimerState,
}

impl TimerEngine {
    /// Create an engine seeded with a previously restored state.
    pub fn new(state: TimerState) -> Self {
        Self { state }
    }

    /// Borrow the current state.
    pub fn state(&self) -> &TimerState {
        &self.state
    }

    /// Clone the current state for distribution.
    pub fn snapshot(&self) -> TimerState {
        self.state.clone()
    }

    /// Add the adjustment's deltas. Always produces a new version, even for all-zero deltas.
    pub fn apply_adjustment(&mut self, adjustment: &Adjustment, now_ms: i64) -> TimerState {
        self.state.remaining_seconds = self
            .state
            .remaining_seconds
            .saturating_add(adjustment.add_seconds);
        self.state.subs = self.state.subs.saturating_add(adjustment.add_subs);
        self.state.bits = self.state.bits.saturating_add(adjustment.add_bits);
        debug!(
            reason = %adjustment.reason,
            add_seconds = adjustment.add_seconds,
            add_subs = adjustment.add_subs,
            add_bits = adjustment.add_bits,
            "applying adjustment"
        );
        self.commit(now_ms)
    }

    /// Advance the countdown by one second.
    pub fn tick(&mut self, now_ms: i64) -> Option<TimerState> {
        if !self.state.is_running {
            return None;
        }
        // A running timer at zero only needs to be stopped.
        if self.state.remaining_seconds > 0 {
            self.state.remaining_seconds -= 1;
        }
        Some(self.commit(now_ms))
    }

    /// Execute an observer control command.
    pub fn control(&mut self, command: TimerControl, now_ms: i64) -> Option<TimerState> {
        match command {
            TimerControl::Start => self.state.is_running = true,
            TimerControl::Pause => self.state.is_running = false,
            TimerControl::Reset => {
                self.state.is_running = false;
                self.state.remaining_seconds = 0;
            }
            TimerControl::SetTime(_) if self.state.is_running => {
                debug!("ignoring set-time while the timer is running");
                return None;
            }
            TimerControl::SetTime(seconds) => self.state.remaining_seconds = seconds,
            TimerControl::SetHappyHour(enabled) => self.state.happy_hour = enabled,
        }
        Some(self.commit(now_ms))
    }

    /// Overwrite the seconds configured for one category; unknown keys are ignored.
    pub fn update_setting(&mut self, key: &str, value: &Value, now_ms: i64) -> Option<TimerState> {
        let Ok(category) = key.parse::<EventCategory>() else {
            debug!(key, "ignoring settings update for unknown category");
            return None;
        };
        self.state
            .event_seconds
            .set(category, sanitize::non_negative_int(value));
        Some(self.commit(now_ms))
    }

    /// Enforce the stop-at-zero rule and stamp a new version.
    fn commit(&mut self, now_ms: i64) -> TimerState {
        if self.state.is_running && self.state.remaining_seconds == 0 {
            self.state.is_running = false;
        }
        self.state.state_version += 1;
        self.state.updated_at = now_ms;
        self.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const NOW: i64 = 1_700_000_000_000;

    fn running(remaining_seconds: u64) -> TimerEngine {
        TimerEngine::new(TimerState {
            remaining_seconds,
            is_running: true,
            ..TimerState::default()
        })
    }

    #[test]
    fn adjustment_adds_and_bumps_version() {
        let mut engine = TimerEngine::default();
        let adjustment = Adjustment {
            add_seconds: 300,
            add_subs: 1,
            ..Adjustment::with_reason("resub")
        };

        let next = engine.apply_adjustment(&adjustment, NOW);
        assert_eq!(next.remaining_seconds, 300);
        assert_eq!(next.subs, 1);
        assert_eq!(next.state_version, 1);
        assert_eq!(next.updated_at, NOW);
    }

    #[test]
    fn zero_adjustment_still_bumps_version() {
        let mut engine = TimerEngine::default();
        let next = engine.apply_adjustment(&Adjustment::with_reason("noop"), NOW);
        assert_eq!(next.remaining_seconds, 0);
        assert_eq!(next.state_version, 1);
    }

    #[test]
    fn ticks_count_down_and_stop_at_zero() {
        let mut engine = running(3);

        let first = engine.tick(NOW).unwrap();
        assert_eq!((first.remaining_seconds, first.is_running), (2, true));
        let second = engine.tick(NOW).unwrap();
        assert_eq!((second.remaining_seconds, second.is_running), (1, true));
        let third = engine.tick(NOW).unwrap();
        assert_eq!((third.remaining_seconds, third.is_running), (0, false));
        assert_eq!(third.state_version, 3);

        assert!(engine.tick(NOW).is_none());
    }

    #[test]
    fn tick_flips_exhausted_running_timer() {
        let mut engine = running(0);
        let stopped = engine.tick(NOW).unwrap();
        assert!(!stopped.is_running);
        assert_eq!(stopped.remaining_seconds, 0);
        assert_eq!(stopped.state_version, 1);
    }

    #[test]
    fn start_with_no_time_left_stays_stopped() {
        let mut engine = TimerEngine::default();
        let next = engine.control(TimerControl::Start, NOW).unwrap();
        assert!(!next.is_running);
        assert_eq!(next.state_version, 1);
    }

    #[test]
    fn set_time_only_honoured_while_paused() {
        let mut engine = running(50);
        assert!(engine.control(TimerControl::SetTime(10), NOW).is_none());
        assert_eq!(engine.state().remaining_seconds, 50);
        assert_eq!(engine.state().state_version, 0);

        engine.control(TimerControl::Pause, NOW).unwrap();
        let next = engine.control(TimerControl::SetTime(10), NOW).unwrap();
        assert_eq!(next.remaining_seconds, 10);
    }

    #[test]
    fn reset_clears_time_and_stops() {
        let mut engine = running(50);
        let next = engine.control(TimerControl::Reset, NOW).unwrap();
        assert_eq!(next.remaining_seconds, 0);
        assert!(!next.is_running);
    }

    #[test]
    fn settings_update_restricted_to_known_categories() {
        let mut engine = TimerEngine::default();
        assert!(engine.update_setting("bomb15", &json!(60), NOW).is_none());
        assert_eq!(engine.state().state_version, 0);

        let next = engine.update_setting("bomb10", &json!(-60), NOW).unwrap();
        assert_eq!(next.event_seconds.bomb10, 0);
        let next = engine.update_setting("bits", &json!("12"), NOW).unwrap();
        assert_eq!(next.event_seconds.bits, 12);
        assert_eq!(next.state_version, 2);
    }

    #[test]
    fn version_counts_every_applied_mutation() {
        let mut engine = TimerEngine::new(TimerState {
            state_version: 41,
            ..TimerState::default()
        });
        let adjustment = Adjustment {
            add_seconds: 10,
            ..Adjustment::with_reason("a")
        };
        engine.apply_adjustment(&adjustment, NOW);
        engine.control(TimerControl::SetHappyHour(true), NOW);
        engine.control(TimerControl::Start, NOW);
        engine.tick(NOW);
        engine.update_setting("t3", &json!(900), NOW);
        assert_eq!(engine.state().state_version, 46);
    }
}

//! Display timers
//!
//! Three independent timers are mirrored on every client: the round
//! countdown, the thinking countdown and the pre-game countdown. The
//! session only stores each timer's start instant; elapsed values are
//! computed on demand in deciseconds (the unit the wire protocol uses).
//! Pausing snapshots the elapsed values, and resuming shifts every start
//! forward by the pause duration so elapsed time is preserved exactly.

use enum_map::{Enum, EnumMap, enum_map};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use web_time::SystemTime;

/// The three timer slots, in wire index order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Enum, Serialize, Deserialize)]
pub enum TimerSlot {
    /// Slot 0: round countdown
    Round,
    /// Slot 1: thinking countdown
    Thinking,
    /// Slot 2: pre-game countdown
    PreGame,
}

impl TimerSlot {
    /// The wire index of this slot
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Start instants of the three display timers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayTimers {
    start: EnumMap<TimerSlot, SystemTime>,
}

impl Default for DisplayTimers {
    fn default() -> Self {
        Self::new(SystemTime::now())
    }
}

impl DisplayTimers {
    /// Creates timers all starting at the given instant
    pub fn new(now: SystemTime) -> Self {
        Self {
            start: enum_map! { _ => now },
        }
    }

    /// Restarts one timer at the given instant
    pub fn restart(&mut self, slot: TimerSlot, now: SystemTime) {
        self.start[slot] = now;
    }

    /// Elapsed deciseconds of one timer at the given instant
    ///
    /// Saturates to zero if the timer was restarted after `at`.
    pub fn elapsed_deciseconds(&self, slot: TimerSlot, at: SystemTime) -> i64 {
        let elapsed = at.duration_since(self.start[slot]).unwrap_or_default();
        i64::try_from(elapsed.as_millis() / 100).unwrap_or(i64::MAX)
    }

    /// Elapsed deciseconds of all three timers, in wire index order
    pub fn snapshot(&self, at: SystemTime) -> [i64; 3] {
        [
            self.elapsed_deciseconds(TimerSlot::Round, at),
            self.elapsed_deciseconds(TimerSlot::Thinking, at),
            self.elapsed_deciseconds(TimerSlot::PreGame, at),
        ]
    }

    /// Shifts every start forward, preserving elapsed-so-far across a pause
    pub fn shift_all(&mut self, by: Duration) {
        for (_, start) in &mut self.start {
            if let Some(shifted) = start.checked_add(by) {
                *start = shifted;
            }
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn elapsed_counts_in_deciseconds() {
        let base = SystemTime::now();
        let timers = DisplayTimers::new(base);
        let later = base + Duration::from_millis(2_500);
        assert_eq!(timers.elapsed_deciseconds(TimerSlot::Round, later), 25);
    }

    #[test]
    fn pause_round_trip_preserves_elapsed() {
        let base = SystemTime::now();
        let mut timers = DisplayTimers::new(base);

        let pause_start = base + Duration::from_secs(10);
        let before = timers.snapshot(pause_start);

        // A 30-second pause, then every start is shifted by its duration.
        let pause_duration = Duration::from_secs(30);
        timers.shift_all(pause_duration);
        let after = timers.snapshot(pause_start + pause_duration);

        assert_eq!(before, after);
    }

    #[test]
    fn restarted_timer_reads_zero_for_earlier_instants() {
        let base = SystemTime::now();
        let mut timers = DisplayTimers::new(base);
        timers.restart(TimerSlot::Thinking, base + Duration::from_secs(5));
        assert_eq!(timers.elapsed_deciseconds(TimerSlot::Thinking, base), 0);
    }

    #[test]
    fn slot_wire_indices() {
        assert_eq!(TimerSlot::Round.index(), 0);
        assert_eq!(TimerSlot::Thinking.index(), 1);
        assert_eq!(TimerSlot::PreGame.index(), 2);
    }
}

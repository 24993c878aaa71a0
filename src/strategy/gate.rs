//! Time gates
//!
//! Recognizes the two clock minutes at which the rule acts and guards each
//! gate so it fires at most once per trading day.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use std::collections::HashMap;
use std::fmt;

/// A clock gate recognized in the time-frame stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gate {
    /// Forced exit of open positions
    TimeExit,
    /// Evaluation of new entries
    Entry,
}

impl Gate {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gate::TimeExit => "TIME_EXIT",
            Gate::Entry => "ENTRY",
        }
    }
}

impl fmt::Display for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Gate minutes and the jitter applied to event timestamps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateSchedule {
    exit_at: NaiveTime,
    entry_at: NaiveTime,
    jitter: Duration,
}

impl Default for GateSchedule {
    fn default() -> Self {
        Self::new(
            NaiveTime::from_hms_opt(10, 5, 0).unwrap_or_default(),
            NaiveTime::from_hms_opt(23, 45, 0).unwrap_or_default(),
            5,
        )
    }
}

impl GateSchedule {
    /// Only the hour and minute of each gate time are used.
    pub fn new(exit_at: NaiveTime, entry_at: NaiveTime, jitter_secs: i64) -> Self {
        Self {
            exit_at,
            entry_at,
            jitter: Duration::seconds(jitter_secs),
        }
    }

    pub fn exit_at(&self) -> NaiveTime {
        self.exit_at
    }

    pub fn entry_at(&self) -> NaiveTime {
        self.entry_at
    }

    /// Gate matching `market_time`, checked exit first
    pub fn classify(&self, market_time: NaiveDateTime) -> Option<Gate> {
        let nudged = market_time + self.jitter;

        if same_minute(nudged, self.exit_at) {
            return Some(Gate::TimeExit);
        }
        if same_minute(nudged, self.entry_at) {
            return Some(Gate::Entry);
        }
        None
    }

    /// Trading day an event belongs to, after jitter
    pub fn trading_day(&self, market_time: NaiveDateTime) -> NaiveDate {
        (market_time + self.jitter).date()
    }
}

fn same_minute(at: NaiveDateTime, gate: NaiveTime) -> bool {
    at.hour() == gate.hour() && at.minute() == gate.minute()
}

/// Remembers the last trading day each gate fired on
#[derive(Debug, Default)]
pub struct GateLatch {
    fired: HashMap<Gate, NaiveDate>,
}

impl GateLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true the first time `gate` is seen on `day`
    pub fn try_fire(&mut self, gate: Gate, day: NaiveDate) -> bool {
        match self.fired.get(&gate) {
            Some(last) if *last == day => false,
            _ => {
                self.fired.insert(gate, day);
                true
            }
        }
    }

    pub fn last_fired(&self, gate: Gate) -> Option<NaiveDate> {
        self.fired.get(&gate).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 4)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn test_exit_gate_window() {
        let schedule = GateSchedule::default();
        assert_eq!(schedule.classify(at(10, 5, 0)), Some(Gate::TimeExit));
        assert_eq!(schedule.classify(at(10, 5, 54)), Some(Gate::TimeExit));
        // nudged into the gate minute
        assert_eq!(schedule.classify(at(10, 4, 55)), Some(Gate::TimeExit));
        assert_eq!(schedule.classify(at(10, 4, 54)), None);
        // nudged out of it
        assert_eq!(schedule.classify(at(10, 5, 55)), None);
    }

    #[test]
    fn test_entry_gate_window() {
        let schedule = GateSchedule::default();
        assert_eq!(schedule.classify(at(23, 44, 58)), Some(Gate::Entry));
        assert_eq!(schedule.classify(at(23, 45, 30)), Some(Gate::Entry));
        assert_eq!(schedule.classify(at(23, 46, 0)), None);
        assert_eq!(schedule.classify(at(23, 44, 0)), None);
    }

    #[test]
    fn test_other_times_are_ignored() {
        let schedule = GateSchedule::default();
        for (h, m) in [(0, 0), (10, 6), (11, 5), (22, 45), (23, 5), (9, 5)] {
            assert_eq!(schedule.classify(at(h, m, 0)), None, "{h}:{m}");
        }
    }

    #[test]
    fn test_trading_day_follows_jitter() {
        let schedule = GateSchedule::default();
        let late = at(23, 59, 57);
        assert_eq!(
            schedule.trading_day(late),
            NaiveDate::from_ymd_opt(2025, 3, 5).unwrap()
        );
    }

    #[test]
    fn test_latch_fires_once_per_day() {
        let mut latch = GateLatch::new();
        let d1 = NaiveDate::from_ymd_opt(2025, 3, 4).unwrap();
        let d2 = d1.succ_opt().unwrap();

        assert!(latch.try_fire(Gate::Entry, d1));
        assert!(!latch.try_fire(Gate::Entry, d1));
        // gates are independent
        assert!(latch.try_fire(Gate::TimeExit, d1));
        assert!(latch.try_fire(Gate::Entry, d2));
        assert_eq!(latch.last_fired(Gate::Entry), Some(d2));
    }
}

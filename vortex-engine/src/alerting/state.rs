//! Per-series alert state (§4.4): level tracking, history, transition
//! detection.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AlertLevel {
    Ok,
    Info,
    Warning,
    Critical,
}

impl std::fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AlertLevel::Ok => "OK",
            AlertLevel::Info => "INFO",
            AlertLevel::Warning => "WARNING",
            AlertLevel::Critical => "CRITICAL",
        };
        write!(f, "{s}")
    }
}

/// One published alert event, handed to `Notifier::send` and to topic
/// subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEvent {
    pub topic: String,
    pub series_id: String,
    pub level: AlertLevel,
    pub previous_level: AlertLevel,
    pub timestamp: i64,
    pub message: String,
    pub state_changed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertSeriesState {
    pub level: AlertLevel,
    pub since: i64,
    history_cap: usize,
    pub history: VecDeque<AlertLevel>,
}

impl AlertSeriesState {
    pub fn new(history_cap: usize) -> Self {
        Self {
            level: AlertLevel::Ok,
            since: 0,
            history_cap,
            history: VecDeque::new(),
        }
    }

    /// Apply the computed level at `now`. Returns `(state_changed, duration
    /// spent in the prior level)`.
    pub fn transition(&mut self, computed: AlertLevel, now: i64) -> (bool, i64) {
        if computed == self.level {
            return (false, now - self.since);
        }
        let duration = now - self.since;
        if self.history_cap > 0 {
            if self.history.len() == self.history_cap {
                self.history.pop_front();
            }
            self.history.push_back(self.level);
        }
        self.level = computed;
        self.since = now;
        (true, duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_detects_level_change() {
        let mut s = AlertSeriesState::new(4);
        let (changed, _) = s.transition(AlertLevel::Critical, 100);
        assert!(changed);
        assert_eq!(s.level, AlertLevel::Critical);
        let (changed, _) = s.transition(AlertLevel::Critical, 200);
        assert!(!changed);
    }

    #[test]
    fn history_is_bounded() {
        let mut s = AlertSeriesState::new(2);
        s.transition(AlertLevel::Info, 1);
        s.transition(AlertLevel::Warning, 2);
        s.transition(AlertLevel::Critical, 3);
        assert_eq!(s.history.len(), 2);
        assert_eq!(s.history.front(), Some(&AlertLevel::Info));
    }

    #[test]
    fn levels_are_ordered_by_severity() {
        assert!(AlertLevel::Ok < AlertLevel::Info);
        assert!(AlertLevel::Info < AlertLevel::Warning);
        assert!(AlertLevel::Warning < AlertLevel::Critical);
    }
}

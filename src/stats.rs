//! Per-session event counters.
//!
//! Counts are kept in memory only and reported when the monitor stops or when
//! the operator asks for them.

use crate::monitor::types::EventCategory;
use chrono::{DateTime, Local};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Event counts for the current session.
#[derive(Debug)]
pub struct SessionStats {
    focus_changes: AtomicU64,
    processes_started: AtomicU64,
    processes_ended: AtomicU64,
    file_changes: AtomicU64,
    session_start: DateTime<Local>,
}

impl SessionStats {
    pub fn new() -> Self {
        Self {
            focus_changes: AtomicU64::new(0),
            processes_started: AtomicU64::new(0),
            processes_ended: AtomicU64::new(0),
            file_changes: AtomicU64::new(0),
            session_start: Local::now(),
        }
    }

    /// Record one emitted event.
    pub fn record(&self, category: EventCategory) {
        let counter = match category {
            EventCategory::FocusChange => &self.focus_changes,
            EventCategory::ProcessStarted => &self.processes_started,
            EventCategory::ProcessEnded => &self.processes_ended,
            EventCategory::FileChanged => &self.file_changes,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            focus_changes: self.focus_changes.load(Ordering::Relaxed),
            processes_started: self.processes_started.load(Ordering::Relaxed),
            processes_ended: self.processes_ended.load(Ordering::Relaxed),
            file_changes: self.file_changes.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Local::now() - self.session_start)
                .num_seconds()
                .max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.snapshot();
        format!(
            "Session Statistics:\n\
             - Focus changes: {}\n\
             - Processes started: {}\n\
             - Processes ended: {}\n\
             - File events: {}\n\
             - Session duration: {} seconds",
            stats.focus_changes,
            stats.processes_started,
            stats.processes_ended,
            stats.file_changes,
            stats.session_duration_secs
        )
    }
}

impl Default for SessionStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub focus_changes: u64,
    pub processes_started: u64,
    pub processes_ended: u64,
    pub file_changes: u64,
    pub session_start: DateTime<Local>,
    pub session_duration_secs: u64,
}

impl StatsSnapshot {
    pub fn total(&self) -> u64 {
        self.focus_changes + self.processes_started + self.processes_ended + self.file_changes
    }
}

/// Thread-safe shared counters.
pub type SharedStats = Arc<SessionStats>;

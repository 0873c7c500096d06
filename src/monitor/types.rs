//! Event and state types shared by the monitors.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Placeholder for a process name that could not be resolved.
pub const UNKNOWN_PROCESS: &str = "<unknown>";

/// Format a timestamp the way event lines show it.
pub fn format_timestamp(timestamp: &DateTime<Local>) -> String {
    timestamp.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// One detected change, ready for the sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    /// Local time the change was detected
    pub timestamp: DateTime<Local>,
    /// What changed
    #[serde(flatten)]
    pub kind: EventKind,
}

impl Event {
    /// Create an event stamped with the current local time.
    pub fn now(kind: EventKind) -> Self {
        Self::at(Local::now(), kind)
    }

    pub fn at(timestamp: DateTime<Local>, kind: EventKind) -> Self {
        Self { timestamp, kind }
    }

    pub fn category(&self) -> EventCategory {
        self.kind.category()
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", format_timestamp(&self.timestamp), self.kind)
    }
}

/// Category-specific event payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "category")]
pub enum EventKind {
    /// The foreground window changed.
    FocusChange {
        pid: u32,
        process: String,
        title: String,
    },
    ProcessStarted {
        pid: u32,
        name: String,
    },
    ProcessEnded {
        pid: u32,
        name: String,
    },
    /// A path under the watch root changed.
    FileChanged {
        action: FileAction,
        path: String,
    },
}

impl EventKind {
    pub fn category(&self) -> EventCategory {
        match self {
            EventKind::FocusChange { .. } => EventCategory::FocusChange,
            EventKind::ProcessStarted { .. } => EventCategory::ProcessStarted,
            EventKind::ProcessEnded { .. } => EventCategory::ProcessEnded,
            EventKind::FileChanged { .. } => EventCategory::FileChanged,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::FocusChange {
                pid,
                process,
                title,
            } => write!(
                f,
                "ActiveWindow -> PID: {pid}, Process: {process}, Title: \"{title}\""
            ),
            EventKind::ProcessStarted { pid, name } => {
                write!(f, "Process started -> PID: {pid}, Name: {name}")
            }
            EventKind::ProcessEnded { pid, name } => {
                write!(f, "Process ended   -> PID: {pid}, Name: {name}")
            }
            EventKind::FileChanged { action, path } => write!(f, "FileEvent -> {action}: {path}"),
        }
    }
}

/// Event category tag, used for counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventCategory {
    FocusChange,
    ProcessStarted,
    ProcessEnded,
    FileChanged,
}

/// What happened to a path, as reported by a change record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileAction {
    Added,
    Removed,
    Modified,
    RenamedFrom,
    RenamedTo,
    /// Any action code this crate does not recognize
    Unknown,
}

impl FileAction {
    /// Map a raw notification action code.
    pub fn from_code(code: u32) -> Self {
        match code {
            1 => FileAction::Added,
            2 => FileAction::Removed,
            3 => FileAction::Modified,
            4 => FileAction::RenamedFrom,
            5 => FileAction::RenamedTo,
            _ => FileAction::Unknown,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            FileAction::Added => "Added",
            FileAction::Removed => "Removed",
            FileAction::Modified => "Modified",
            FileAction::RenamedFrom => "Renamed(from)",
            FileAction::RenamedTo => "Renamed(to)",
            FileAction::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for FileAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One record of a change-notification batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRecord {
    pub action: FileAction,
    /// Path relative to the watch root
    pub path: String,
}

/// Point-in-time mapping of process id to process name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessSnapshot {
    processes: HashMap<u32, String>,
}

impl ProcessSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a process. A repeated pid replaces the earlier name.
    pub fn insert(&mut self, pid: u32, name: impl Into<String>) {
        self.processes.insert(pid, name.into());
    }

    pub fn contains(&self, pid: u32) -> bool {
        self.processes.contains_key(&pid)
    }

    pub fn name(&self, pid: u32) -> Option<&str> {
        self.processes.get(&pid).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.processes.iter().map(|(pid, name)| (*pid, name.as_str()))
    }
}

impl<S: Into<String>> FromIterator<(u32, S)> for ProcessSnapshot {
    fn from_iter<I: IntoIterator<Item = (u32, S)>>(iter: I) -> Self {
        let mut snapshot = Self::new();
        for (pid, name) in iter {
            snapshot.insert(pid, name);
        }
        snapshot
    }
}

/// Opaque identity of a top-level window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowId(pub usize);

/// Last observed foreground window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FocusState {
    /// `None` when no window has focus
    pub window: Option<WindowId>,
    pub pid: u32,
    pub title: String,
}

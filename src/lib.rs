//! Host Activity Monitor - real-time log of focus, process and file activity.
//!
//! Three observation loops run side by side, each turning noisy OS signals
//! into a small set of normalized events:
//!
//! - **Focus tracking**: polls the foreground window and reports each change.
//! - **Process diffing**: snapshots the process list on an interval and
//!   reports starts and stops.
//! - **Directory streaming**: holds a watch on a directory subtree and reports
//!   every change record the OS delivers.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  ┌──────────────┐  ┌──────────────┐
//! │ FocusTracker │  │  ProcessSet  │  │  Directory   │
//! │   (800 ms)   │  │ Differ (2 s) │  │ChangeStream  │
//! └──────┬───────┘  └──────┬───────┘  └──────┬───────┘
//!        │ Event           │ Event           │ Event
//!        └─────────────────┼─────────────────┘
//!                          ▼
//!                   ┌─────────────┐       ┌─────────────┐
//!                   │  EventSink  │──────▶│   stdout    │
//!                   │ (one writer)│       └─────────────┘
//!                   └─────────────┘
//!
//!  Orchestrator ──▶ CancellationToken ──▶ all three loops
//! ```
//!
//! # Example
//!
//! ```no_run
//! use host_activity_monitor::{HostSources, MonitorConfig, Orchestrator, OutputFormat};
//! use host_activity_monitor::monitor::EventSink;
//! use host_activity_monitor::orchestrator::spawn_console_reader;
//! use std::sync::Arc;
//!
//! let config = MonitorConfig::default();
//! let stats = Arc::new(host_activity_monitor::SessionStats::new());
//! let (sink, writer) = EventSink::spawn(std::io::stdout(), OutputFormat::Text, stats.clone());
//!
//! let orchestrator = Orchestrator::new(config.clone(), stats);
//! let commands = spawn_console_reader(std::io::BufReader::new(std::io::stdin()));
//! orchestrator.run(HostSources::host(&config), &sink, &commands);
//!
//! writer.finish(sink).expect("flush event output");
//! ```

pub mod config;
pub mod error;
pub mod monitor;
pub mod orchestrator;
pub mod platform;
pub mod stats;

// Re-export key types at crate root for convenience
pub use config::{ConfigOverrides, EnumerationFailurePolicy, MonitorConfig, OutputFormat};
pub use error::{ConfigError, MonitorError};
pub use monitor::{CancellationToken, Event, EventKind, EventSink};
pub use orchestrator::{Command, HostSources, Orchestrator, StopHandle};
pub use stats::{SessionStats, SharedStats};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// First line printed at startup.
pub const BANNER: &str = "=== Simple Local Monitor ===";

/// How to stop the monitor, printed after the banner.
pub const INSTRUCTIONS: &str = "Press Q then Enter to quit.";

/// Printed after every monitor has finished.
pub const STOPPED: &str = "Monitor stopped.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_strings() {
        assert!(BANNER.contains("Monitor"));
        assert!(INSTRUCTIONS.contains('Q'));
        assert!(STOPPED.ends_with("stopped."));
    }
}

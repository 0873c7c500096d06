//! The three observation loops and what they share.
//!
//! Each monitor owns its own state and runs on its own thread. They share only
//! a [`CancellationToken`] and an [`EventSink`].

pub mod cancel;
pub mod directory;
pub mod focus;
pub mod process;
pub mod sink;
pub mod types;

// Re-export commonly used types
pub use cancel::CancellationToken;
pub use directory::{batch_events, parse_batch, BatchError, DirectoryChangeStream, ParsedRecord};
pub use focus::FocusTracker;
pub use process::{diff_snapshots, ProcessDiff, ProcessSetDiffer};
pub use sink::{EventSink, SinkWriter};
pub use types::{
    ChangeRecord, Event, EventCategory, EventKind, FileAction, FocusState, ProcessSnapshot,
    WindowId, UNKNOWN_PROCESS,
};

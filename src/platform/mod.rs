//! OS seams for the monitors.
//!
//! Each monitor talks to the host through one of the traits below. The
//! Windows implementation uses the Win32 API; other targets get a no-op
//! implementation so the crate builds and its logic can be tested anywhere.

use crate::error::MonitorError;
use crate::monitor::types::{ProcessSnapshot, WindowId};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

#[cfg(target_os = "windows")]
pub mod windows;

#[cfg(not(target_os = "windows"))]
pub mod noop;

#[cfg(target_os = "windows")]
pub use self::windows::{open_watch, HostProcesses, HostWindows};

#[cfg(not(target_os = "windows"))]
pub use noop::{open_watch, HostProcesses, HostWindows};

/// Title and owner of a window, read at the moment of detection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowDetails {
    pub pid: u32,
    pub title: String,
}

/// Access to the foreground window.
pub trait ForegroundProbe: Send {
    /// Identity of the window that currently has input focus, if any.
    fn foreground_window(&self) -> Option<WindowId>;

    /// Title and owning process of `window`. Fields that cannot be read come
    /// back empty or zero.
    fn window_details(&self, window: WindowId) -> WindowDetails;
}

/// Best-effort lookup of a process name from its id.
pub trait ProcessNameResolver: Send + Sync {
    /// `None` when the process is gone or cannot be queried.
    fn process_name(&self, pid: u32) -> Option<String>;
}

/// Enumeration of all running processes.
pub trait ProcessEnumerator: Send {
    fn snapshot(&self) -> Result<ProcessSnapshot, MonitorError>;
}

/// A long-lived watch on a directory subtree that delivers change records in
/// raw notification batches.
pub trait ChangeSource: Send {
    /// Block until the OS delivers the next batch and return its bytes.
    ///
    /// An empty slice means the OS dropped changes because the buffer
    /// overflowed.
    fn next_batch(&mut self) -> Result<&[u8], MonitorError>;

    /// Handle that makes a pending [`next_batch`](Self::next_batch) return
    /// with an error.
    fn interrupter(&self) -> WatchInterrupt;
}

/// Cancels a blocked change-notification read from another thread.
#[derive(Clone)]
pub struct WatchInterrupt {
    interrupt: Arc<dyn Fn() + Send + Sync>,
}

impl WatchInterrupt {
    pub fn new(interrupt: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            interrupt: Arc::new(interrupt),
        }
    }

    /// An interrupt that does nothing.
    pub fn noop() -> Self {
        Self::new(|| {})
    }

    pub fn interrupt(&self) {
        (self.interrupt)();
    }
}

impl fmt::Debug for WatchInterrupt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WatchInterrupt")
    }
}

/// Decode a host-native UTF-16 string, stopping at the first NUL.
///
/// Unpaired surrogates become U+FFFD.
pub fn decode_wide(units: &[u16]) -> String {
    let end = units.iter().position(|&u| u == 0).unwrap_or(units.len());
    String::from_utf16_lossy(&units[..end])
}

/// Open a change watch on `root`, boxed for the orchestrator.
pub fn open_change_source(
    root: &Path,
    buffer_size: usize,
) -> Result<Box<dyn ChangeSource>, MonitorError> {
    let watch = open_watch(root, buffer_size)?;
    Ok(Box::new(watch))
}

//! Non-Windows (noop) implementation of the host sources.
//!
//! This exists so the crate (and binary) can compile on other targets without
//! pulling in Win32 bindings. No window ever has focus, enumeration reports
//! itself unsupported and directory watches cannot be opened.

use super::{
    ChangeSource, ForegroundProbe, ProcessEnumerator, ProcessNameResolver, WatchInterrupt,
    WindowDetails,
};
use crate::error::MonitorError;
use crate::monitor::types::{ProcessSnapshot, WindowId};
use std::path::Path;

/// Foreground probe that never sees a window.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostWindows;

impl ForegroundProbe for HostWindows {
    fn foreground_window(&self) -> Option<WindowId> {
        None
    }

    fn window_details(&self, _window: WindowId) -> WindowDetails {
        WindowDetails::default()
    }
}

/// Process source with no enumeration support.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostProcesses;

impl ProcessNameResolver for HostProcesses {
    fn process_name(&self, _pid: u32) -> Option<String> {
        None
    }
}

impl ProcessEnumerator for HostProcesses {
    fn snapshot(&self) -> Result<ProcessSnapshot, MonitorError> {
        Err(MonitorError::Unsupported("process enumeration"))
    }
}

/// Placeholder watch type; it can never be constructed.
#[derive(Debug)]
pub enum NoopWatch {}

impl ChangeSource for NoopWatch {
    fn next_batch(&mut self) -> Result<&[u8], MonitorError> {
        match *self {}
    }

    fn interrupter(&self) -> WatchInterrupt {
        match *self {}
    }
}

/// Directory watches are not available on this platform.
pub fn open_watch(_root: &Path, _buffer_size: usize) -> Result<NoopWatch, MonitorError> {
    Err(MonitorError::Unsupported("directory change notification"))
}

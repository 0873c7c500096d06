//! Windows implementation of the host sources.
//!
//! Foreground windows come from `GetForegroundWindow`, process lists from a
//! ToolHelp snapshot and directory changes from `ReadDirectoryChangesW` on a
//! handle opened with backup semantics.

use super::{
    decode_wide, ChangeSource, ForegroundProbe, ProcessEnumerator, ProcessNameResolver,
    WatchInterrupt, WindowDetails,
};
use crate::error::MonitorError;
use crate::monitor::types::{ProcessSnapshot, WindowId};
use ::windows::core::{PCWSTR, PWSTR};
use ::windows::Win32::Foundation::{CloseHandle, ERROR_OPERATION_ABORTED, HANDLE, HWND};
use ::windows::Win32::Storage::FileSystem::{
    CreateFileW, ReadDirectoryChangesW, FILE_FLAG_BACKUP_SEMANTICS, FILE_LIST_DIRECTORY,
    FILE_NOTIFY_CHANGE, FILE_NOTIFY_CHANGE_DIR_NAME, FILE_NOTIFY_CHANGE_FILE_NAME,
    FILE_NOTIFY_CHANGE_LAST_WRITE, FILE_NOTIFY_CHANGE_SIZE, FILE_SHARE_DELETE, FILE_SHARE_READ,
    FILE_SHARE_WRITE, OPEN_EXISTING,
};
use ::windows::Win32::System::Diagnostics::ToolHelp::{
    CreateToolhelp32Snapshot, Process32FirstW, Process32NextW, PROCESSENTRY32W,
    TH32CS_SNAPPROCESS,
};
use ::windows::Win32::System::Threading::{
    OpenProcess, QueryFullProcessImageNameW, PROCESS_NAME_FORMAT,
    PROCESS_QUERY_LIMITED_INFORMATION,
};
use ::windows::Win32::System::IO::CancelIoEx;
use ::windows::Win32::UI::WindowsAndMessaging::{
    GetForegroundWindow, GetWindowTextW, GetWindowThreadProcessId,
};
use std::ffi::c_void;
use std::io;
use std::os::windows::ffi::OsStrExt;
use std::path::Path;
use std::sync::Arc;

/// Changes reported by the directory watch.
const NOTIFY_FILTER: FILE_NOTIFY_CHANGE = FILE_NOTIFY_CHANGE(
    FILE_NOTIFY_CHANGE_FILE_NAME.0
        | FILE_NOTIFY_CHANGE_DIR_NAME.0
        | FILE_NOTIFY_CHANGE_LAST_WRITE.0
        | FILE_NOTIFY_CHANGE_SIZE.0,
);

/// A kernel handle closed on drop. Stored as an integer so it can cross
/// threads.
#[derive(Debug)]
struct OwnedHandle {
    raw: isize,
}

impl OwnedHandle {
    fn new(handle: HANDLE) -> Self {
        Self {
            raw: handle.0 as isize,
        }
    }

    fn get(&self) -> HANDLE {
        HANDLE(self.raw as *mut c_void)
    }
}

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        // SAFETY: the handle was returned by a successful open call and is
        // closed exactly once, here.
        let _ = unsafe { CloseHandle(self.get()) };
    }
}

/// Foreground window probe.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostWindows;

impl ForegroundProbe for HostWindows {
    fn foreground_window(&self) -> Option<WindowId> {
        let hwnd = unsafe { GetForegroundWindow() };
        if hwnd.0.is_null() {
            None
        } else {
            Some(WindowId(hwnd.0 as usize))
        }
    }

    fn window_details(&self, window: WindowId) -> WindowDetails {
        let hwnd = HWND(window.0 as *mut c_void);

        let mut title = [0u16; 512];
        let len = unsafe { GetWindowTextW(hwnd, &mut title) };
        let len = usize::try_from(len).unwrap_or(0).min(title.len());

        let mut pid = 0u32;
        unsafe { GetWindowThreadProcessId(hwnd, Some(&mut pid as *mut u32)) };

        WindowDetails {
            pid,
            title: decode_wide(&title[..len]),
        }
    }
}

/// Process enumeration and name lookup.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostProcesses;

impl ProcessNameResolver for HostProcesses {
    fn process_name(&self, pid: u32) -> Option<String> {
        if pid == 0 {
            return None;
        }

        let handle = unsafe { OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, pid) }.ok()?;
        if handle.is_invalid() {
            return None;
        }
        let handle = OwnedHandle::new(handle);

        let mut buffer = [0u16; 1024];
        let mut size = buffer.len() as u32;
        unsafe {
            QueryFullProcessImageNameW(
                handle.get(),
                PROCESS_NAME_FORMAT(0),
                PWSTR(buffer.as_mut_ptr()),
                &mut size,
            )
        }
        .ok()?;

        let full_path = decode_wide(&buffer[..(size as usize).min(buffer.len())]);
        let base_name = Path::new(&full_path)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());
        Some(base_name.unwrap_or(full_path))
    }
}

impl ProcessEnumerator for HostProcesses {
    fn snapshot(&self) -> Result<ProcessSnapshot, MonitorError> {
        let handle = unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0) }
            .map_err(|e| MonitorError::Enumeration(e.to_string()))?;
        let handle = OwnedHandle::new(handle);

        let mut entry = PROCESSENTRY32W {
            dwSize: std::mem::size_of::<PROCESSENTRY32W>() as u32,
            ..Default::default()
        };
        let mut snapshot = ProcessSnapshot::new();

        unsafe { Process32FirstW(handle.get(), &mut entry) }
            .map_err(|e| MonitorError::Enumeration(e.to_string()))?;
        loop {
            snapshot.insert(entry.th32ProcessID, decode_wide(&entry.szExeFile));
            if unsafe { Process32NextW(handle.get(), &mut entry) }.is_err() {
                break;
            }
        }

        Ok(snapshot)
    }
}

/// Open change watch on a directory subtree.
#[derive(Debug)]
pub struct DirectoryWatch {
    handle: Arc<OwnedHandle>,
    /// DWORD-aligned, as the notification records require
    buffer: Vec<u32>,
}

/// Open `root` for change notifications covering its whole subtree.
pub fn open_watch(root: &Path, buffer_size: usize) -> Result<DirectoryWatch, MonitorError> {
    let wide: Vec<u16> = root
        .as_os_str()
        .encode_wide()
        .chain(std::iter::once(0))
        .collect();

    let handle = unsafe {
        CreateFileW(
            PCWSTR(wide.as_ptr()),
            FILE_LIST_DIRECTORY.0,
            FILE_SHARE_READ | FILE_SHARE_WRITE | FILE_SHARE_DELETE,
            None,
            OPEN_EXISTING,
            FILE_FLAG_BACKUP_SEMANTICS,
            HANDLE::default(),
        )
    }
    .map_err(|e| MonitorError::WatchOpen {
        path: root.to_path_buf(),
        source: io::Error::other(e),
    })?;

    Ok(DirectoryWatch {
        handle: Arc::new(OwnedHandle::new(handle)),
        buffer: vec![0u32; buffer_size.div_ceil(4)],
    })
}

impl ChangeSource for DirectoryWatch {
    fn next_batch(&mut self) -> Result<&[u8], MonitorError> {
        let capacity = self.buffer.len() * 4;
        let mut returned = 0u32;

        unsafe {
            ReadDirectoryChangesW(
                self.handle.get(),
                self.buffer.as_mut_ptr().cast::<c_void>(),
                capacity as u32,
                true,
                NOTIFY_FILTER,
                Some(&mut returned as *mut u32),
                None,
                None,
            )
        }
        .map_err(|e| {
            if e.code() == ERROR_OPERATION_ABORTED.to_hresult() {
                MonitorError::WatchInterrupted
            } else {
                MonitorError::WatchRead(io::Error::other(e))
            }
        })?;

        let len = (returned as usize).min(capacity);
        // SAFETY: the buffer owns `capacity` initialized bytes and `len` never
        // exceeds it.
        let bytes = unsafe { std::slice::from_raw_parts(self.buffer.as_ptr().cast::<u8>(), len) };
        Ok(bytes)
    }

    fn interrupter(&self) -> WatchInterrupt {
        let handle = Arc::clone(&self.handle);
        WatchInterrupt::new(move || {
            // Fails harmlessly when no read is pending.
            let _ = unsafe { CancelIoEx(handle.get(), None) };
        })
    }
}

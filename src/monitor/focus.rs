//! Foreground window tracking.

use crate::monitor::cancel::CancellationToken;
use crate::monitor::sink::EventSink;
use crate::monitor::types::{Event, EventKind, FocusState, UNKNOWN_PROCESS};
use crate::platform::{ForegroundProbe, ProcessNameResolver, WindowDetails};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Polls the foreground window and reports each change of identity.
pub struct FocusTracker {
    probe: Box<dyn ForegroundProbe>,
    resolver: Arc<dyn ProcessNameResolver>,
    interval: Duration,
    state: FocusState,
}

impl FocusTracker {
    pub fn new(
        probe: Box<dyn ForegroundProbe>,
        resolver: Arc<dyn ProcessNameResolver>,
        interval: Duration,
    ) -> Self {
        Self {
            probe,
            resolver,
            interval,
            state: FocusState::default(),
        }
    }

    /// The window recorded by the last change.
    pub fn state(&self) -> &FocusState {
        &self.state
    }

    /// Query the foreground window once.
    ///
    /// Returns an event only when the window identity differs from the last
    /// recorded one, including gaining or losing focus entirely.
    pub fn poll(&mut self) -> Option<Event> {
        let window = self.probe.foreground_window();
        if window == self.state.window {
            return None;
        }

        let details = match window {
            Some(id) => self.probe.window_details(id),
            None => WindowDetails::default(),
        };
        let process = self.resolve_name(details.pid);

        self.state = FocusState {
            window,
            pid: details.pid,
            title: details.title.clone(),
        };

        Some(Event::now(EventKind::FocusChange {
            pid: details.pid,
            process,
            title: details.title,
        }))
    }

    fn resolve_name(&self, pid: u32) -> String {
        if pid == 0 {
            return UNKNOWN_PROCESS.to_string();
        }
        self.resolver.process_name(pid).unwrap_or_else(|| {
            debug!(pid, "could not resolve process name for focused window");
            UNKNOWN_PROCESS.to_string()
        })
    }

    /// Poll until `token` is cancelled, sleeping one interval between polls.
    pub fn run(mut self, sink: EventSink, token: CancellationToken) {
        debug!(interval_ms = self.interval.as_millis() as u64, "focus tracker started");

        while !token.is_cancelled() {
            if let Some(event) = self.poll() {
                if !sink.emit(event) {
                    break;
                }
            }
            token.sleep(self.interval);
        }

        debug!("focus tracker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::types::WindowId;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    /// Returns scripted foreground windows, then `None` forever.
    struct ScriptedProbe {
        windows: Mutex<VecDeque<Option<WindowId>>>,
        details: HashMap<WindowId, WindowDetails>,
    }

    impl ScriptedProbe {
        fn new(windows: Vec<Option<usize>>) -> Self {
            let mut details = HashMap::new();
            details.insert(
                WindowId(1),
                WindowDetails {
                    pid: 100,
                    title: "notes.txt".to_string(),
                },
            );
            details.insert(
                WindowId(2),
                WindowDetails {
                    pid: 200,
                    title: "Inbox".to_string(),
                },
            );
            details.insert(
                WindowId(3),
                WindowDetails {
                    pid: 300,
                    title: "gone".to_string(),
                },
            );
            Self {
                windows: Mutex::new(windows.into_iter().map(|w| w.map(WindowId)).collect()),
                details,
            }
        }
    }

    impl ForegroundProbe for ScriptedProbe {
        fn foreground_window(&self) -> Option<WindowId> {
            self.windows.lock().unwrap().pop_front().flatten()
        }

        fn window_details(&self, window: WindowId) -> WindowDetails {
            self.details.get(&window).cloned().unwrap_or_default()
        }
    }

    /// Knows pids 100 and 200; pid 300 has exited.
    struct Names;

    impl ProcessNameResolver for Names {
        fn process_name(&self, pid: u32) -> Option<String> {
            match pid {
                100 => Some("editor.exe".to_string()),
                200 => Some("mail.exe".to_string()),
                _ => None,
            }
        }
    }

    fn tracker(windows: Vec<Option<usize>>) -> FocusTracker {
        FocusTracker::new(
            Box::new(ScriptedProbe::new(windows)),
            Arc::new(Names),
            Duration::from_millis(1),
        )
    }

    #[test]
    fn test_unchanged_window_emits_nothing() {
        let mut tracker = tracker(vec![Some(1), Some(1), Some(1)]);
        assert!(tracker.poll().is_some());
        assert!(tracker.poll().is_none());
        assert!(tracker.poll().is_none());
    }

    #[test]
    fn test_one_event_per_change() {
        let mut tracker = tracker(vec![Some(1), Some(2), Some(2), Some(1)]);
        let events: Vec<Event> = (0..4).filter_map(|_| tracker.poll()).collect();
        assert_eq!(events.len(), 3);

        assert_eq!(
            events[0].kind,
            EventKind::FocusChange {
                pid: 100,
                process: "editor.exe".to_string(),
                title: "notes.txt".to_string(),
            }
        );
        assert_eq!(
            events[1].kind,
            EventKind::FocusChange {
                pid: 200,
                process: "mail.exe".to_string(),
                title: "Inbox".to_string(),
            }
        );
        assert_eq!(tracker.state().window, Some(WindowId(1)));
        assert_eq!(tracker.state().pid, 100);
    }

    #[test]
    fn test_null_transitions() {
        // Starting with no focus is not a change.
        let mut tracker = tracker(vec![None, Some(1), None, None]);
        assert!(tracker.poll().is_none());
        assert!(tracker.poll().is_some());

        let lost = tracker.poll().unwrap();
        assert_eq!(
            lost.kind,
            EventKind::FocusChange {
                pid: 0,
                process: UNKNOWN_PROCESS.to_string(),
                title: String::new(),
            }
        );
        assert_eq!(tracker.state(), &FocusState::default());
        assert!(tracker.poll().is_none());
    }

    #[test]
    fn test_exited_owner_degrades_to_placeholder() {
        let mut tracker = tracker(vec![Some(3)]);
        let event = tracker.poll().unwrap();
        assert_eq!(
            event.kind,
            EventKind::FocusChange {
                pid: 300,
                process: UNKNOWN_PROCESS.to_string(),
                title: "gone".to_string(),
            }
        );
    }

    #[test]
    fn test_run_stops_on_cancel() {
        let (sink, writer) = EventSink::spawn(
            std::io::sink(),
            crate::config::OutputFormat::Text,
            Arc::default(),
        );
        let token = CancellationToken::new();
        let tracker = tracker(vec![Some(1), Some(2)]);

        let thread_sink = sink.clone();
        let thread_token = token.clone();
        let handle = std::thread::spawn(move || tracker.run(thread_sink, thread_token));

        std::thread::sleep(Duration::from_millis(20));
        token.cancel();
        handle.join().unwrap();
        writer.finish(sink).unwrap();
    }
}

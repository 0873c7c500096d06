//! Process start/stop detection by snapshot comparison.

use crate::config::EnumerationFailurePolicy;
use crate::error::MonitorError;
use crate::monitor::cancel::CancellationToken;
use crate::monitor::sink::EventSink;
use crate::monitor::types::{Event, EventKind, ProcessSnapshot};
use crate::platform::ProcessEnumerator;
use std::time::Duration;
use tracing::{debug, warn};

/// Processes that appeared and disappeared between two snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessDiff {
    /// In the current snapshot only, ordered by pid
    pub started: Vec<(u32, String)>,
    /// In the previous snapshot only, ordered by pid
    pub ended: Vec<(u32, String)>,
}

impl ProcessDiff {
    pub fn is_empty(&self) -> bool {
        self.started.is_empty() && self.ended.is_empty()
    }

    /// One event per started process, then one per ended process.
    pub fn into_events(self) -> Vec<Event> {
        let started = self
            .started
            .into_iter()
            .map(|(pid, name)| Event::now(EventKind::ProcessStarted { pid, name }));
        let ended = self
            .ended
            .into_iter()
            .map(|(pid, name)| Event::now(EventKind::ProcessEnded { pid, name }));
        started.chain(ended).collect()
    }
}

/// Compare two snapshots by process id.
///
/// A pid present in both is never reported, even if its name changed.
pub fn diff_snapshots(previous: &ProcessSnapshot, current: &ProcessSnapshot) -> ProcessDiff {
    let mut started: Vec<(u32, String)> = current
        .iter()
        .filter(|(pid, _)| !previous.contains(*pid))
        .map(|(pid, name)| (pid, name.to_string()))
        .collect();
    let mut ended: Vec<(u32, String)> = previous
        .iter()
        .filter(|(pid, _)| !current.contains(*pid))
        .map(|(pid, name)| (pid, name.to_string()))
        .collect();

    started.sort_unstable_by_key(|(pid, _)| *pid);
    ended.sort_unstable_by_key(|(pid, _)| *pid);

    ProcessDiff { started, ended }
}

/// Captures the process list on a fixed interval and reports the difference
/// from the previous capture.
pub struct ProcessSetDiffer {
    enumerator: Box<dyn ProcessEnumerator>,
    interval: Duration,
    policy: EnumerationFailurePolicy,
    /// `None` until a baseline has been captured
    previous: Option<ProcessSnapshot>,
    /// Set once the host reports it cannot enumerate processes at all
    unavailable: bool,
}

impl ProcessSetDiffer {
    pub fn new(
        enumerator: Box<dyn ProcessEnumerator>,
        interval: Duration,
        policy: EnumerationFailurePolicy,
    ) -> Self {
        Self {
            enumerator,
            interval,
            policy,
            previous: None,
            unavailable: false,
        }
    }

    /// Whether enumeration is unsupported on this host. No later capture is
    /// attempted once this is set.
    pub fn is_unavailable(&self) -> bool {
        self.unavailable
    }

    /// Capture the baseline snapshot without reporting anything.
    pub fn prime(&mut self) {
        self.previous = self.capture();
    }

    /// Capture a new snapshot and diff it against the previous one.
    ///
    /// Without a baseline the capture only becomes the baseline.
    pub fn tick(&mut self) -> ProcessDiff {
        let Some(current) = self.capture() else {
            return ProcessDiff::default();
        };

        let diff = match &self.previous {
            Some(previous) => diff_snapshots(previous, &current),
            None => ProcessDiff::default(),
        };
        self.previous = Some(current);
        diff
    }

    /// Apply the failure policy to one enumeration attempt. `None` means this
    /// interval is skipped.
    fn capture(&mut self) -> Option<ProcessSnapshot> {
        if self.unavailable {
            return None;
        }
        match self.enumerator.snapshot() {
            Ok(snapshot) => Some(snapshot),
            Err(e @ MonitorError::Unsupported(_)) => {
                warn!("{e}; process monitoring stopped");
                self.unavailable = true;
                None
            }
            Err(e) => match self.policy {
                EnumerationFailurePolicy::Skip => {
                    warn!("{e}; skipping this interval");
                    None
                }
                EnumerationFailurePolicy::Empty => {
                    warn!("{e}; treating as an empty process list");
                    Some(ProcessSnapshot::new())
                }
            },
        }
    }

    /// Diff on every interval until `token` is cancelled.
    pub fn run(mut self, sink: EventSink, token: CancellationToken) {
        debug!(interval_ms = self.interval.as_millis() as u64, "process differ started");
        self.prime();

        while !token.is_cancelled() && !self.unavailable {
            if token.sleep(self.interval) {
                break;
            }
            let events = self.tick().into_events();
            if !events.into_iter().all(|event| sink.emit(event)) {
                break;
            }
        }

        debug!("process differ stopped");
    }
}

//! Startup, console commands and shutdown of the three monitors.

use crate::config::MonitorConfig;
use crate::error::MonitorError;
use crate::monitor::{
    CancellationToken, DirectoryChangeStream, EventSink, FocusTracker, ProcessSetDiffer,
};
use crate::platform::{
    self, ChangeSource, ForegroundProbe, HostProcesses, HostWindows, ProcessEnumerator,
    ProcessNameResolver, WatchInterrupt,
};
use crate::stats::SessionStats;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError};
use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info};

/// Printed for any input that is not a known command.
pub const USAGE_HINT: &str = "Unknown command. Type Q then Enter to quit.";

/// How often the command loop re-checks for an external stop.
const COMMAND_POLL: Duration = Duration::from_millis(100);

/// How often a stuck directory read is re-interrupted during shutdown.
const INTERRUPT_RETRY: Duration = Duration::from_millis(50);

/// A console command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Quit,
    /// Print the session counters
    Stats,
    Empty,
    Unknown,
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Command::Empty;
        }
        match line.to_ascii_lowercase().as_str() {
            "q" | "quit" | "exit" => Command::Quit,
            "stats" | "status" => Command::Stats,
            _ => Command::Unknown,
        }
    }
}

/// Everything the monitors read from the host.
pub struct HostSources {
    pub windows: Box<dyn ForegroundProbe>,
    pub names: Arc<dyn ProcessNameResolver>,
    pub processes: Box<dyn ProcessEnumerator>,
    /// `None` when the watch root could not be opened
    pub watch: Option<Box<dyn ChangeSource>>,
}

impl HostSources {
    /// The sources of this machine. A watch root that cannot be opened is
    /// logged and leaves the directory monitor without a source.
    pub fn host(config: &MonitorConfig) -> Self {
        let watch =
            match platform::open_change_source(&config.watch_root, config.change_buffer_size) {
                Ok(watch) => Some(watch),
                Err(e) => {
                    error!("{}", watch_failure_message(&e));
                    None
                }
            };

        Self {
            windows: Box::new(HostWindows),
            names: Arc::new(HostProcesses),
            processes: Box::new(HostProcesses),
            watch,
        }
    }
}

/// Operator-facing text for a watch root that could not be opened. Only an
/// open failure gets the access hint.
pub fn watch_failure_message(error: &MonitorError) -> String {
    match error {
        MonitorError::WatchOpen { .. } => {
            format!("{error}. Try running as administrator or check the path.")
        }
        _ => error.to_string(),
    }
}

/// Requests shutdown of running monitors. Cloneable so a signal handler can
/// hold one.
#[derive(Debug, Clone)]
pub struct StopHandle {
    token: CancellationToken,
    interrupt: Option<WatchInterrupt>,
}

impl StopHandle {
    /// Set the token and unblock a pending directory read.
    pub fn stop(&self) {
        if self.token.cancel() {
            debug!("shutdown requested");
        }
        if let Some(interrupt) = &self.interrupt {
            interrupt.interrupt();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Monitor threads started by [`Orchestrator::start`].
pub struct RunningMonitors {
    handles: Vec<(&'static str, JoinHandle<()>)>,
    stop: StopHandle,
}

impl RunningMonitors {
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Number of monitor threads that were started.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Request shutdown and wait for every monitor thread to finish.
    pub fn shutdown(self) {
        self.stop.stop();

        for (name, handle) in self.handles {
            // A read issued just after the first interrupt would block again.
            while !handle.is_finished() {
                self.stop.stop();
                thread::sleep(INTERRUPT_RETRY);
            }
            if handle.join().is_err() {
                error!("{name} monitor panicked");
            }
            debug!("{name} monitor joined");
        }
    }
}

/// Starts the monitors and drives the console command loop.
pub struct Orchestrator {
    config: MonitorConfig,
    token: CancellationToken,
    stats: Arc<SessionStats>,
}

impl Orchestrator {
    pub fn new(config: MonitorConfig, stats: Arc<SessionStats>) -> Self {
        Self {
            config,
            token: CancellationToken::new(),
            stats,
        }
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn watch_root(&self) -> &Path {
        &self.config.watch_root
    }

    /// Spawn one thread per monitor.
    pub fn start(&self, sources: HostSources, sink: &EventSink) -> RunningMonitors {
        let HostSources {
            windows,
            names,
            processes,
            watch,
        } = sources;
        let mut handles = Vec::with_capacity(3);

        let focus = FocusTracker::new(windows, names, self.config.focus_interval);
        self.spawn(&mut handles, "focus", sink, move |sink, token| {
            focus.run(sink, token)
        });

        let differ = ProcessSetDiffer::new(
            processes,
            self.config.process_interval,
            self.config.enumeration_failure,
        );
        self.spawn(&mut handles, "process", sink, move |sink, token| {
            differ.run(sink, token)
        });

        let interrupt = watch.map(|watch| {
            let interrupt = watch.interrupter();
            let stream = DirectoryChangeStream::new(watch, self.config.watch_root.clone());
            self.spawn(&mut handles, "directory", sink, move |sink, token| {
                stream.run(sink, token)
            });
            interrupt
        });

        RunningMonitors {
            handles,
            stop: StopHandle {
                token: self.token.clone(),
                interrupt,
            },
        }
    }

    fn spawn<F>(
        &self,
        handles: &mut Vec<(&'static str, JoinHandle<()>)>,
        name: &'static str,
        sink: &EventSink,
        body: F,
    ) where
        F: FnOnce(EventSink, CancellationToken) + Send + 'static,
    {
        let sink = sink.clone();
        let token = self.token.clone();
        match thread::Builder::new()
            .name(format!("{name}-monitor"))
            .spawn(move || body(sink, token))
        {
            Ok(handle) => handles.push((name, handle)),
            Err(e) => error!("could not start {name} monitor: {e}"),
        }
    }

    /// Start the monitors, process console commands until a quit request or
    /// the end of input, then shut everything down.
    pub fn run(&self, sources: HostSources, sink: &EventSink, commands: &Receiver<String>) {
        let monitors = self.start(sources, sink);
        let stop = monitors.stop_handle();
        self.command_loop(commands, &stop, sink);
        monitors.shutdown();
    }

    /// Handle console lines until shutdown is requested.
    pub fn command_loop(&self, commands: &Receiver<String>, stop: &StopHandle, sink: &EventSink) {
        loop {
            match commands.recv_timeout(COMMAND_POLL) {
                Ok(line) => match Command::parse(&line) {
                    Command::Quit => {
                        stop.stop();
                        break;
                    }
                    Command::Stats => {
                        sink.notice(self.stats.summary());
                    }
                    Command::Empty => {}
                    Command::Unknown => {
                        sink.notice(USAGE_HINT);
                    }
                },
                Err(RecvTimeoutError::Timeout) => {
                    if stop.is_stopped() {
                        break;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    info!("console input closed; shutting down");
                    stop.stop();
                    break;
                }
            }
        }
    }
}

/// Read lines from `input` on a background thread.
///
/// The channel disconnects at end of input or on a read error.
pub fn spawn_console_reader<R>(input: R) -> Receiver<String>
where
    R: BufRead + Send + 'static,
{
    let (sender, receiver) = unbounded();
    let spawned = thread::Builder::new()
        .name("console".to_string())
        .spawn(move || {
            for line in input.lines() {
                match line {
                    Ok(line) => {
                        if sender.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        error!("console read failed: {e}");
                        break;
                    }
                }
            }
        });
    if let Err(e) = spawned {
        error!("could not start console reader: {e}");
    }
    receiver
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_parsing() {
        for quit in ["q", "Q", "quit", "QUIT", "exit", " Exit \r"] {
            assert_eq!(Command::parse(quit), Command::Quit, "{quit:?}");
        }
        assert_eq!(Command::parse("stats"), Command::Stats);
        assert_eq!(Command::parse("Status"), Command::Stats);
        assert_eq!(Command::parse(""), Command::Empty);
        assert_eq!(Command::parse("   "), Command::Empty);
        assert_eq!(Command::parse("quitt"), Command::Unknown);
        assert_eq!(Command::parse("help"), Command::Unknown);
    }

    #[test]
    fn test_access_hint_only_for_open_failures() {
        let open = MonitorError::WatchOpen {
            path: "C:\\Users\\me\\Desktop".into(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied"),
        };
        let message = watch_failure_message(&open);
        assert!(message.contains("access denied"));
        assert!(message.ends_with("Try running as administrator or check the path."));

        let unsupported = MonitorError::Unsupported("directory change notification");
        assert_eq!(
            watch_failure_message(&unsupported),
            "directory change notification is not supported on this platform"
        );
    }

    #[test]
    fn test_console_reader_disconnects_at_eof() {
        let input = std::io::Cursor::new("hello\nq\n");
        let lines = spawn_console_reader(input);

        assert_eq!(lines.recv().unwrap(), "hello");
        assert_eq!(lines.recv().unwrap(), "q");
        assert!(lines.recv().is_err());
    }

    #[test]
    fn test_stop_handle_flips_token_once_and_interrupts() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let stop = StopHandle {
            token: CancellationToken::new(),
            interrupt: Some(WatchInterrupt::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })),
        };

        assert!(!stop.is_stopped());
        stop.stop();
        stop.stop();
        assert!(stop.is_stopped());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}

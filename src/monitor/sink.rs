//! Serialized output for event lines.
//!
//! Monitors never touch the output stream. They send through an [`EventSink`]
//! handle into a channel drained by one writer thread, so each line is written
//! whole and in arrival order.

use crate::config::OutputFormat;
use crate::monitor::types::Event;
use crate::stats::SharedStats;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::io::{self, Write};
use std::thread::{self, JoinHandle};
use tracing::warn;

/// A line queued for the writer thread.
#[derive(Debug)]
enum SinkMessage {
    Event(Event),
    /// Operator-facing text such as usage hints
    Notice(String),
}

/// Cloneable handle for submitting lines to the shared output.
#[derive(Debug, Clone)]
pub struct EventSink {
    sender: Sender<SinkMessage>,
}

impl EventSink {
    /// Start the writer thread over `writer`.
    pub fn spawn<W>(writer: W, format: OutputFormat, stats: SharedStats) -> (Self, SinkWriter)
    where
        W: Write + Send + 'static,
    {
        let (sender, receiver) = unbounded();
        let handle = thread::Builder::new()
            .name("event-sink".to_string())
            .spawn(move || write_loop(receiver, writer, format, stats))
            .map(Some)
            .unwrap_or_else(|e| {
                warn!("could not start sink thread: {e}");
                None
            });

        (Self { sender }, SinkWriter { handle })
    }

    /// Queue an event line. Returns `false` if the writer has gone away.
    pub fn emit(&self, event: Event) -> bool {
        self.sender.send(SinkMessage::Event(event)).is_ok()
    }

    /// Queue a plain text line.
    pub fn notice(&self, line: impl Into<String>) -> bool {
        self.sender.send(SinkMessage::Notice(line.into())).is_ok()
    }
}

/// Owner of the writer thread.
#[derive(Debug)]
pub struct SinkWriter {
    handle: Option<JoinHandle<io::Result<()>>>,
}

impl SinkWriter {
    /// Drop `sink` and wait for every queued line to be written.
    ///
    /// Blocks until all other clones of the sink have been dropped too.
    pub fn finish(self, sink: EventSink) -> io::Result<()> {
        drop(sink);
        match self.handle {
            Some(handle) => handle
                .join()
                .unwrap_or_else(|_| Err(io::Error::other("sink thread panicked"))),
            None => Ok(()),
        }
    }
}

fn write_loop<W: Write>(
    receiver: Receiver<SinkMessage>,
    mut writer: W,
    format: OutputFormat,
    stats: SharedStats,
) -> io::Result<()> {
    let mut failure = None;

    for message in receiver.iter() {
        let line = match message {
            SinkMessage::Event(event) => {
                stats.record(event.category());
                match render(&event, format) {
                    Ok(line) => line,
                    Err(e) => {
                        warn!("could not render event: {e}");
                        continue;
                    }
                }
            }
            SinkMessage::Notice(line) => render_notice(line, format),
        };

        // Keep draining after a write failure so senders never notice.
        if failure.is_some() {
            continue;
        }
        if let Err(e) = writeln!(writer, "{line}").and_then(|()| writer.flush()) {
            warn!("event output failed, dropping further lines: {e}");
            failure = Some(e);
        }
    }

    failure.map_or(Ok(()), Err)
}

fn render(event: &Event, format: OutputFormat) -> Result<String, serde_json::Error> {
    match format {
        OutputFormat::Text => Ok(event.to_string()),
        OutputFormat::Json => serde_json::to_string(event),
    }
}

/// In JSON mode a notice becomes `{"notice": ...}` so every line parses.
fn render_notice(line: String, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => line,
        OutputFormat::Json => serde_json::json!({ "notice": line }).to_string(),
    }
}

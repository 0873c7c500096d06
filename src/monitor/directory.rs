//! Filesystem change streaming for a watched directory subtree.
//!
//! The OS delivers changes in batches of variable-length records packed into
//! one buffer. Each record has this little-endian layout:
//!
//! ```text
//! offset  size  field
//!      0     4  byte offset of the next record (0 = last record)
//!      4     4  action code
//!      8     4  name length in bytes
//!     12     n  name, UTF-16 without terminator
//! ```

use crate::monitor::cancel::CancellationToken;
use crate::monitor::sink::EventSink;
use crate::monitor::types::{ChangeRecord, Event, EventKind, FileAction};
use crate::platform::{decode_wide, ChangeSource};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, warn};

/// Size of the fixed part of a change record.
pub const RECORD_HEADER_LEN: usize = 12;

/// One record decoded from a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRecord {
    pub change: ChangeRecord,
    /// Bytes of the batch this record accounts for
    pub span: usize,
    /// Whether this record closes the batch
    pub is_last: bool,
}

/// A batch that does not follow the record layout.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BatchError {
    #[error("change record at offset {offset} is truncated")]
    Truncated { offset: usize },

    #[error("change record at offset {offset} has invalid next offset {next}")]
    BadOffset { offset: usize, next: usize },
}

/// Iterate the records of one delivered batch, in delivery order.
pub fn parse_batch(batch: &[u8]) -> BatchRecords<'_> {
    BatchRecords {
        batch,
        offset: 0,
        done: false,
    }
}

/// Iterator over the records of a batch.
///
/// Stops after the record whose next offset is zero. A malformed record
/// yields one error and ends iteration.
#[derive(Debug)]
pub struct BatchRecords<'a> {
    batch: &'a [u8],
    offset: usize,
    done: bool,
}

impl Iterator for BatchRecords<'_> {
    type Item = Result<ParsedRecord, BatchError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.offset >= self.batch.len() {
            return None;
        }

        let item = self.parse_at(self.offset);
        match &item {
            Ok(record) if !record.is_last => self.offset += record.span,
            _ => self.done = true,
        }
        Some(item)
    }
}

impl BatchRecords<'_> {
    fn parse_at(&self, offset: usize) -> Result<ParsedRecord, BatchError> {
        let rest = &self.batch[offset..];
        if rest.len() < RECORD_HEADER_LEN {
            return Err(BatchError::Truncated { offset });
        }

        let next = read_u32(rest, 0) as usize;
        let action = read_u32(rest, 4);
        let name_len = read_u32(rest, 8) as usize;

        let name_end = RECORD_HEADER_LEN
            .checked_add(name_len)
            .filter(|end| *end <= rest.len())
            .ok_or(BatchError::Truncated { offset })?;

        let (span, is_last) = if next == 0 {
            (rest.len(), true)
        } else if next < name_end || next >= rest.len() {
            return Err(BatchError::BadOffset { offset, next });
        } else {
            (next, false)
        };

        let units: Vec<u16> = rest[RECORD_HEADER_LEN..name_end]
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();

        Ok(ParsedRecord {
            change: ChangeRecord {
                action: FileAction::from_code(action),
                path: decode_wide(&units),
            },
            span,
            is_last,
        })
    }
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// Turn a batch into FileChanged events.
///
/// Records before a malformed one are still reported.
pub fn batch_events(batch: &[u8]) -> Vec<Event> {
    let mut events = Vec::new();
    for record in parse_batch(batch) {
        match record {
            Ok(record) => events.push(Event::now(EventKind::FileChanged {
                action: record.change.action,
                path: record.change.path,
            })),
            Err(e) => warn!("{e}; rest of batch dropped"),
        }
    }
    events
}

/// Streams change batches from a directory watch into the sink.
pub struct DirectoryChangeStream {
    source: Box<dyn ChangeSource>,
    root: PathBuf,
}

impl DirectoryChangeStream {
    pub fn new(source: Box<dyn ChangeSource>, root: impl Into<PathBuf>) -> Self {
        Self {
            source,
            root: root.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Read batches until the watch fails or `token` is cancelled.
    ///
    /// Cancellation is only observed between reads; a pending read returns
    /// when a change arrives or the watch is interrupted.
    pub fn run(mut self, sink: EventSink, token: CancellationToken) {
        debug!(root = %self.root.display(), "directory stream started");

        while !token.is_cancelled() {
            match self.source.next_batch() {
                Ok([]) => warn!("change buffer overflowed; some changes were not reported"),
                Ok(batch) => {
                    if !batch_events(batch).into_iter().all(|event| sink.emit(event)) {
                        break;
                    }
                }
                Err(e) if token.is_cancelled() => {
                    debug!("directory watch ended for shutdown: {e}");
                    break;
                }
                Err(e) => {
                    error!("{e}; monitoring of {} stopped", self.root.display());
                    break;
                }
            }
        }

        debug!("directory stream stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Encode records the way the OS lays them out, padding every record but
    /// the last to a 4-byte boundary.
    fn encode_batch(records: &[(u32, &str)]) -> Vec<u8> {
        let mut batch = Vec::new();
        for (i, (action, name)) in records.iter().enumerate() {
            let name: Vec<u8> = name.encode_utf16().flat_map(u16::to_le_bytes).collect();
            let len = RECORD_HEADER_LEN + name.len();
            let is_last = i + 1 == records.len();
            let next = if is_last { 0 } else { len.next_multiple_of(4) };

            batch.extend((next as u32).to_le_bytes());
            batch.extend(action.to_le_bytes());
            batch.extend((name.len() as u32).to_le_bytes());
            batch.extend(name);
            if !is_last {
                batch.resize(batch.len() + (next - len), 0);
            }
        }
        batch
    }

    fn parse_all(batch: &[u8]) -> Vec<ParsedRecord> {
        parse_batch(batch).collect::<Result<_, _>>().unwrap()
    }

    #[test]
    fn test_single_record() {
        let batch = encode_batch(&[(1, "notes.txt")]);
        let records = parse_all(&batch);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].change.action, FileAction::Added);
        assert_eq!(records[0].change.path, "notes.txt");
        assert!(records[0].is_last);
        assert_eq!(records[0].span, batch.len());
    }

    #[test]
    fn test_two_records_in_order() {
        let batch = encode_batch(&[(1, "x.txt"), (3, "y.txt")]);
        let records = parse_all(&batch);

        assert_eq!(
            records.iter().map(|r| &r.change).collect::<Vec<_>>(),
            vec![
                &ChangeRecord {
                    action: FileAction::Added,
                    path: "x.txt".to_string()
                },
                &ChangeRecord {
                    action: FileAction::Modified,
                    path: "y.txt".to_string()
                },
            ]
        );
        assert!(!records[0].is_last);
        assert!(records[1].is_last);

        let events = batch_events(&batch);
        assert_eq!(events.len(), 2);
        assert!(events[0].to_string().ends_with("FileEvent -> Added: x.txt"));
        assert!(events[1].to_string().ends_with("FileEvent -> Modified: y.txt"));
    }

    #[test]
    fn test_many_records_consume_whole_batch() {
        let names: Vec<String> = (0..25).map(|i| format!("dir\\file-{i}.log")).collect();
        let records: Vec<(u32, &str)> = names
            .iter()
            .enumerate()
            .map(|(i, name)| ((i % 5) as u32 + 1, name.as_str()))
            .collect();
        let batch = encode_batch(&records);

        let parsed = parse_all(&batch);
        assert_eq!(parsed.len(), 25);
        assert_eq!(parsed.iter().map(|r| r.span).sum::<usize>(), batch.len());
        assert_eq!(parsed.iter().filter(|r| r.is_last).count(), 1);
        for (record, name) in parsed.iter().zip(&names) {
            assert_eq!(&record.change.path, name);
        }
    }

    #[test]
    fn test_batch_filling_buffer_exactly() {
        // 11 short records, then one whose name runs to byte 4096.
        let short: Vec<(u32, &str)> = vec![(2, "old.tmp"); 11];
        let last_start = encode_batch(&short).len().next_multiple_of(4);
        let remaining_chars = (4096 - last_start - RECORD_HEADER_LEN) / 2;
        let long_name = "a".repeat(remaining_chars);

        let mut records = short.clone();
        records.push((3, long_name.as_str()));
        let batch = encode_batch(&records);
        assert_eq!(batch.len(), 4096);

        let parsed = parse_all(&batch);
        assert_eq!(parsed.len(), 12);
        assert_eq!(parsed.iter().map(|r| r.span).sum::<usize>(), 4096);
        assert_eq!(parsed[11].change.path.len(), remaining_chars);
        assert!(parsed[11].is_last);
    }

    #[test]
    fn test_unknown_action_does_not_skip_rest() {
        let batch = encode_batch(&[(1, "a"), (42, "b"), (2, "c")]);
        let actions: Vec<FileAction> = parse_all(&batch).iter().map(|r| r.change.action).collect();
        assert_eq!(
            actions,
            vec![FileAction::Added, FileAction::Unknown, FileAction::Removed]
        );
    }

    #[test]
    fn test_rename_pair_labels() {
        let batch = encode_batch(&[(4, "before.txt"), (5, "after.txt")]);
        let lines: Vec<String> = batch_events(&batch).iter().map(|e| e.kind.to_string()).collect();
        assert_eq!(
            lines,
            vec![
                "FileEvent -> Renamed(from): before.txt",
                "FileEvent -> Renamed(to): after.txt"
            ]
        );
    }

    #[test]
    fn test_non_ascii_names() {
        let batch = encode_batch(&[(1, "résumé ✓.docx")]);
        assert_eq!(parse_all(&batch)[0].change.path, "résumé ✓.docx");
    }

    #[test]
    fn test_truncated_record_reports_prefix() {
        let mut batch = encode_batch(&[(1, "keep.txt"), (1, "cut.txt")]);
        batch.truncate(batch.len() - 4);

        let results: Vec<_> = parse_batch(&batch).collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(BatchError::Truncated { .. })));
        assert_eq!(batch_events(&batch).len(), 1);
    }

    #[test]
    fn test_offset_past_end_is_rejected() {
        let mut batch = encode_batch(&[(1, "a.txt")]);
        batch[0..4].copy_from_slice(&4000u32.to_le_bytes());
        let results: Vec<_> = parse_batch(&batch).collect();
        assert_eq!(
            results,
            vec![Err(BatchError::BadOffset {
                offset: 0,
                next: 4000
            })]
        );
    }

    #[test]
    fn test_empty_batch_has_no_records() {
        assert_eq!(parse_batch(&[]).count(), 0);
    }
}

//! Durable sinks for the event log

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

use tracing::error;

use crate::error::{StorageError, StorageResult};
use crate::types::Event;

/// Destination that makes an appended event durable
pub trait EventSink: Send {
    /// Persist one event. The event is committed only if this returns `Ok`.
    fn persist(&mut self, event: &Event) -> StorageResult<()>;
}

/// Append-mode file a [`JsonlSink`] writes to
pub trait LogFile: Write + Send {
    /// Flush written data to the device
    fn sync(&mut self) -> io::Result<()>;

    /// Current length in bytes
    fn size(&self) -> io::Result<u64>;

    /// Cut the file back to `len` bytes
    fn truncate(&mut self, len: u64) -> io::Result<()>;
}

impl LogFile for File {
    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }

    fn size(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

/// Append-only JSON-lines file, one event per line
///
/// A line is either fully written and synced, or cut off again: a failed
/// persist truncates the file back to its last committed length.
pub struct JsonlSink<F: LogFile = File> {
    file: F,
    committed_len: u64,
    /// Set while a failed write could not be rolled back yet
    torn: bool,
}

impl JsonlSink {
    /// Open (or create) the log file in append mode
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Self::from_file(file)
    }

    /// Load every event stored in the file, checking order numbers ascend
    pub fn load(path: &Path) -> StorageResult<Vec<Event>> {
        if !path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(File::open(path)?);
        let mut events: Vec<Event> = Vec::new();

        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            let event = Event::from_json_line(&line).map_err(|e| StorageError::Corrupted {
                line: index + 1,
                reason: e.to_string(),
            })?;

            let order = event.durable_order().ok_or_else(|| StorageError::Corrupted {
                line: index + 1,
                reason: format!("{} event without an order number", event.kind),
            })?;

            if let Some(previous) = events.last().and_then(Event::durable_order) {
                if order <= previous {
                    return Err(StorageError::Corrupted {
                        line: index + 1,
                        reason: format!("order {} does not follow {}", order, previous),
                    });
                }
            }

            events.push(event);
        }

        Ok(events)
    }
}

impl<F: LogFile> JsonlSink<F> {
    /// Wrap a file opened for appending; its current content counts as committed
    pub fn from_file(file: F) -> StorageResult<Self> {
        let committed_len = file.size()?;
        Ok(Self {
            file,
            committed_len,
            torn: false,
        })
    }

    fn write_line(&mut self, line: &[u8]) -> io::Result<()> {
        self.file.write_all(line)?;
        self.file.flush()?;
        self.file.sync()
    }

    fn roll_back(&mut self) -> io::Result<()> {
        self.file.truncate(self.committed_len)?;
        self.file.sync()?;
        self.torn = false;
        Ok(())
    }
}

impl<F: LogFile> EventSink for JsonlSink<F> {
    fn persist(&mut self, event: &Event) -> StorageResult<()> {
        if self.torn {
            self.roll_back()?;
        }

        let mut line = event.to_json_line()?;
        line.push('\n');

        if let Err(e) = self.write_line(line.as_bytes()) {
            self.torn = true;
            if let Err(rollback) = self.roll_back() {
                error!(
                    order = ?event.order_number,
                    committed_len = self.committed_len,
                    error = %rollback,
                    "failed to truncate partial event log line"
                );
            }
            return Err(e.into());
        }

        self.committed_len += line.len() as u64;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventKind;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    /// File whose sync can be made to fail after the bytes were written
    struct UnsyncedFile {
        file: File,
        fail_sync: Arc<AtomicBool>,
    }

    impl Write for UnsyncedFile {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.file.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            self.file.flush()
        }
    }

    impl LogFile for UnsyncedFile {
        fn sync(&mut self) -> io::Result<()> {
            if self.fail_sync.load(Ordering::SeqCst) {
                return Err(io::Error::new(io::ErrorKind::Other, "sync failed"));
            }
            self.file.sync_data()
        }

        fn size(&self) -> io::Result<u64> {
            self.file.size()
        }

        fn truncate(&mut self, len: u64) -> io::Result<()> {
            self.file.set_len(len)
        }
    }

    #[test]
    fn test_persist_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("events.jsonl");

        let mut sink = JsonlSink::open(&path).unwrap();
        sink.persist(&Event::durable(EventKind::MessageCreated, 1, json!("hi")))
            .unwrap();
        sink.persist(&Event::durable(EventKind::RoomCreated, 2, json!({"name": "general"})))
            .unwrap();

        let events = JsonlSink::load(&path).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].order_number, Some(1));
        assert_eq!(events[1].kind, EventKind::RoomCreated);
    }

    #[test]
    fn test_failed_sync_leaves_no_line_behind() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("events.jsonl");
        let fail_sync = Arc::new(AtomicBool::new(false));

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .unwrap();
        let mut sink = JsonlSink::from_file(UnsyncedFile {
            file,
            fail_sync: fail_sync.clone(),
        })
        .unwrap();

        sink.persist(&Event::durable(EventKind::MessageCreated, 1, json!("kept")))
            .unwrap();

        fail_sync.store(true, Ordering::SeqCst);
        let lost = Event::durable(EventKind::MessageCreated, 2, json!("lost"));
        assert!(matches!(sink.persist(&lost), Err(StorageError::Io(_))));

        let events = JsonlSink::load(&path).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].payload, json!("kept"));

        // The order number was burned; the next append uses the following one
        fail_sync.store(false, Ordering::SeqCst);
        sink.persist(&Event::durable(EventKind::MessageCreated, 3, json!("next")))
            .unwrap();

        let orders: Vec<_> = JsonlSink::load(&path)
            .unwrap()
            .iter()
            .map(|e| e.order_number)
            .collect();
        assert_eq!(orders, vec![Some(1), Some(3)]);
    }

    #[test]
    fn test_reopen_continues_after_existing_lines() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("events.jsonl");

        JsonlSink::open(&path)
            .unwrap()
            .persist(&Event::durable(EventKind::MessageCreated, 1, json!("a")))
            .unwrap();
        JsonlSink::open(&path)
            .unwrap()
            .persist(&Event::durable(EventKind::MessageCreated, 2, json!("b")))
            .unwrap();

        assert_eq!(JsonlSink::load(&path).unwrap().len(), 2);
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let events = JsonlSink::load(&temp_dir.path().join("nope.jsonl")).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn test_load_rejects_garbage_line() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("events.jsonl");
        let good = Event::durable(EventKind::MessageCreated, 1, json!("hi"))
            .to_json_line()
            .unwrap();
        std::fs::write(&path, format!("{}\n\nnot json\n", good)).unwrap();

        let err = JsonlSink::load(&path).unwrap_err();
        assert!(matches!(err, StorageError::Corrupted { line: 3, .. }));
    }

    #[test]
    fn test_load_rejects_non_increasing_orders() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("events.jsonl");
        let first = Event::durable(EventKind::MessageCreated, 2, json!("a"));
        let second = Event::durable(EventKind::MessageCreated, 2, json!("b"));
        std::fs::write(
            &path,
            format!(
                "{}\n{}\n",
                first.to_json_line().unwrap(),
                second.to_json_line().unwrap()
            ),
        )
        .unwrap();

        assert!(matches!(
            JsonlSink::load(&path),
            Err(StorageError::Corrupted { line: 2, .. })
        ));
    }
}

//! # Record Log
//!
//! Append-only file holding one serialized record per line, each followed by
//! [`LINE_TERMINATOR`]. Bytes already appended never change; the file only
//! grows until it is deleted whole when the queue is fully drained.

use std::io::{BufRead, Read};

use tracing::{debug, warn};

use super::medium::StorageMedium;
use super::StorageHandle;
use crate::error::{Result, VatMonitorError};

/// Terminator written after every record line
pub const LINE_TERMINATOR: &[u8] = b"\r\n";

/// Result of reading the log at a byte offset
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEntry {
    /// No bytes left at this offset
    End,
    /// A complete line; `payload` excludes the terminator
    Line { payload: Vec<u8>, next_offset: u64 },
    /// Trailing bytes with no terminator (interrupted append)
    Torn { len: u64 },
}

/// Append-only record log on the storage medium
#[derive(Debug, Clone)]
pub struct RecordLog {
    name: String,
}

impl RecordLog {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Appends one serialized record followed by the line terminator.
    ///
    /// If a previous append was cut off (last byte is not a terminator), the
    /// torn fragment is closed off first so it cannot merge with this record.
    ///
    /// # Arguments
    ///
    /// * `line` - Serialized record, must not contain line breaks
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The record contains `\r` or `\n`
    /// - The medium is unhealthy
    /// - The write fails (record not persisted)
    pub fn append<M: StorageMedium>(&self, storage: &mut StorageHandle<M>, line: &str) -> Result<()> {
        if line.contains(['\r', '\n']) {
            return Err(VatMonitorError::InvalidRecord(
                "record contains a line break".to_string(),
            ));
        }

        let torn = self.has_torn_tail(storage)?;
        let medium = storage.writer()?;

        let mut bytes = Vec::with_capacity(line.len() + 2 * LINE_TERMINATOR.len());
        if torn {
            warn!("Record log {} ends with a torn line, sealing it", self.name);
            bytes.extend_from_slice(LINE_TERMINATOR);
        }
        bytes.extend_from_slice(line.as_bytes());
        bytes.extend_from_slice(LINE_TERMINATOR);

        medium.append(&self.name, &bytes)?;
        debug!("Appended {} bytes to {}", bytes.len(), self.name);
        Ok(())
    }

    /// True when the log's last byte is not `\n`
    fn has_torn_tail<M: StorageMedium>(&self, storage: &StorageHandle<M>) -> Result<bool> {
        let medium = storage.reader()?;
        if !medium.exists(&self.name) {
            return Ok(false);
        }
        let len = medium.len(&self.name)?;
        if len == 0 {
            return Ok(false);
        }

        let mut last = [0u8; 1];
        medium.reader_at(&self.name, len - 1)?.read_exact(&mut last)?;
        Ok(last[0] != b'\n')
    }

    pub fn exists<M: StorageMedium>(&self, storage: &StorageHandle<M>) -> bool {
        storage
            .reader()
            .map(|medium| medium.exists(&self.name))
            .unwrap_or(false)
    }

    /// Log length in bytes; 0 if absent or the medium is unhealthy.
    pub fn size_bytes<M: StorageMedium>(&self, storage: &StorageHandle<M>) -> u64 {
        let Ok(medium) = storage.reader() else {
            return 0;
        };
        if !medium.exists(&self.name) {
            return 0;
        }
        medium.len(&self.name).unwrap_or(0)
    }

    /// True iff the log exists and extends past `cursor`.
    pub fn is_not_empty<M: StorageMedium>(&self, storage: &StorageHandle<M>, cursor: u64) -> bool {
        self.exists(storage) && self.size_bytes(storage) > cursor
    }

    /// Counts terminated lines from `cursor` to the end of the log.
    ///
    /// Scans every remaining byte; the log is expected to stay small between
    /// sync passes.
    pub fn pending_line_count<M: StorageMedium>(&self, storage: &StorageHandle<M>, cursor: u64) -> usize {
        if !self.is_not_empty(storage, cursor) {
            return 0;
        }
        let Ok(medium) = storage.reader() else {
            return 0;
        };
        let mut reader = match medium.reader_at(&self.name, cursor) {
            Ok(reader) => reader,
            Err(e) => {
                warn!("Failed to open {} for counting: {}", self.name, e);
                return 0;
            }
        };

        let mut count = 0;
        loop {
            let consumed = match reader.fill_buf() {
                Ok([]) => break,
                Ok(buf) => {
                    count += buf.iter().filter(|&&b| b == b'\n').count();
                    buf.len()
                }
                Err(e) => {
                    warn!("Failed to scan {}: {}", self.name, e);
                    break;
                }
            };
            reader.consume(consumed);
        }
        count
    }

    /// Reads the line starting at `offset`.
    ///
    /// # Returns
    ///
    /// * `LogEntry::End` - nothing at or past `offset`
    /// * `LogEntry::Line` - payload without terminator and the offset of the next line
    /// * `LogEntry::Torn` - remaining bytes lack a terminator
    ///
    /// # Errors
    ///
    /// Returns error if the medium is unhealthy or the read fails
    pub fn read_at<M: StorageMedium>(&self, storage: &StorageHandle<M>, offset: u64) -> Result<LogEntry> {
        let medium = storage.reader()?;
        if !medium.exists(&self.name) || offset >= medium.len(&self.name)? {
            return Ok(LogEntry::End);
        }

        let mut buf = Vec::new();
        let consumed = medium.reader_at(&self.name, offset)?.read_until(b'\n', &mut buf)?;
        if consumed == 0 {
            return Ok(LogEntry::End);
        }
        if buf.last() != Some(&b'\n') {
            return Ok(LogEntry::Torn {
                len: consumed as u64,
            });
        }

        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }

        Ok(LogEntry::Line {
            payload: buf,
            next_offset: offset + consumed as u64,
        })
    }

    /// Deletes the log file.
    pub(crate) fn remove<M: StorageMedium>(&self, storage: &mut StorageHandle<M>) -> Result<()> {
        storage.writer()?.remove(&self.name)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::medium::mocks::MockMedium;
    use std::io;

    const LOG: &str = "offline_queue.txt";

    fn storage() -> StorageHandle<MockMedium> {
        StorageHandle::mount(MockMedium::new())
    }

    #[test]
    fn test_append_writes_line_and_terminator() {
        let mut storage = storage();
        let log = RecordLog::new(LOG);

        log.append(&mut storage, "a").unwrap();
        log.append(&mut storage, "bc").unwrap();

        assert_eq!(storage.medium().content(LOG).as_deref(), Some("a\r\nbc\r\n"));
        assert_eq!(log.size_bytes(&storage), 7);
    }

    #[test]
    fn test_append_rejects_line_breaks() {
        let mut storage = storage();
        let log = RecordLog::new(LOG);

        assert!(matches!(
            log.append(&mut storage, "a\nb"),
            Err(VatMonitorError::InvalidRecord(_))
        ));
        assert!(matches!(
            log.append(&mut storage, "a\rb"),
            Err(VatMonitorError::InvalidRecord(_))
        ));
        assert!(!log.exists(&storage));
    }

    #[test]
    fn test_append_seals_torn_tail() {
        let mut storage = storage();
        storage
            .medium_mut()
            .files
            .insert(LOG.to_string(), b"a\r\n{\"dev".to_vec());
        let log = RecordLog::new(LOG);

        log.append(&mut storage, "b").unwrap();

        assert_eq!(
            storage.medium().content(LOG).as_deref(),
            Some("a\r\n{\"dev\r\nb\r\n")
        );
    }

    #[test]
    fn test_append_fails_on_unhealthy_medium() {
        let mut medium = MockMedium::new();
        medium.probe_error = Some(io::ErrorKind::Other);
        let mut storage = StorageHandle::mount(medium);

        let result = RecordLog::new(LOG).append(&mut storage, "a");
        assert!(matches!(result, Err(VatMonitorError::StorageUnavailable)));
    }

    #[test]
    fn test_append_write_failure_is_reported() {
        let mut storage = storage();
        storage.medium_mut().fail_writes_to(LOG);

        assert!(RecordLog::new(LOG).append(&mut storage, "a").is_err());
    }

    #[test]
    fn test_is_not_empty() {
        let mut storage = storage();
        let log = RecordLog::new(LOG);
        assert!(!log.is_not_empty(&storage, 0));

        log.append(&mut storage, "a").unwrap();
        assert!(log.is_not_empty(&storage, 0));
        assert!(log.is_not_empty(&storage, 2));
        assert!(!log.is_not_empty(&storage, 3));
        assert!(!log.is_not_empty(&storage, 10));
    }

    #[test]
    fn test_pending_line_count() {
        let mut storage = storage();
        let log = RecordLog::new(LOG);
        for line in ["a", "b", "c"] {
            log.append(&mut storage, line).unwrap();
        }

        assert_eq!(log.pending_line_count(&storage, 0), 3);
        assert_eq!(log.pending_line_count(&storage, 3), 2);
        assert_eq!(log.pending_line_count(&storage, 9), 0);
    }

    #[test]
    fn test_pending_line_count_unhealthy() {
        let mut storage = storage();
        let log = RecordLog::new(LOG);
        log.append(&mut storage, "a").unwrap();
        storage.medium_mut().probe_error = Some(io::ErrorKind::Other);
        storage.check_health();

        assert_eq!(log.pending_line_count(&storage, 0), 0);
        assert_eq!(log.size_bytes(&storage), 0);
    }

    #[test]
    fn test_read_at_walks_lines() {
        let mut storage = storage();
        let log = RecordLog::new(LOG);
        log.append(&mut storage, "first").unwrap();
        log.append(&mut storage, "second").unwrap();

        assert_eq!(
            log.read_at(&storage, 0).unwrap(),
            LogEntry::Line {
                payload: b"first".to_vec(),
                next_offset: 7
            }
        );
        assert_eq!(
            log.read_at(&storage, 7).unwrap(),
            LogEntry::Line {
                payload: b"second".to_vec(),
                next_offset: 15
            }
        );
        assert_eq!(log.read_at(&storage, 15).unwrap(), LogEntry::End);
        assert_eq!(log.read_at(&storage, 100).unwrap(), LogEntry::End);
    }

    #[test]
    fn test_read_at_missing_log_is_end() {
        let storage = storage();
        assert_eq!(RecordLog::new(LOG).read_at(&storage, 0).unwrap(), LogEntry::End);
    }

    #[test]
    fn test_read_at_blank_line() {
        let mut storage = storage();
        storage
            .medium_mut()
            .files
            .insert(LOG.to_string(), b"\r\nx\r\n".to_vec());

        assert_eq!(
            RecordLog::new(LOG).read_at(&storage, 0).unwrap(),
            LogEntry::Line {
                payload: Vec::new(),
                next_offset: 2
            }
        );
    }

    #[test]
    fn test_read_at_torn_tail() {
        let mut storage = storage();
        storage
            .medium_mut()
            .files
            .insert(LOG.to_string(), b"a\r\n{\"dev".to_vec());

        assert_eq!(
            RecordLog::new(LOG).read_at(&storage, 3).unwrap(),
            LogEntry::Torn { len: 5 }
        );
    }

    #[test]
    fn test_read_at_accepts_bare_newline() {
        let mut storage = storage();
        storage
            .medium_mut()
            .files
            .insert(LOG.to_string(), b"a\nb\n".to_vec());

        assert_eq!(
            RecordLog::new(LOG).read_at(&storage, 0).unwrap(),
            LogEntry::Line {
                payload: b"a".to_vec(),
                next_offset: 2
            }
        );
    }
}

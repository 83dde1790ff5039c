//! # Sync Module
//!
//! Drains the offline queue through a [`Transport`], oldest record first.
//!
//! ## Delivery protocol
//!
//! Each pass repeats, up to `max_attempts` sends:
//!
//! 1. Read the cursor `C` and the line `L` that starts there
//! 2. Persist the cursor past `L` *before* sending
//! 3. Send `L`
//! 4. On failure, write `C` back and end the pass
//!
//! Advancing before the send means a power loss during step 3 re-sends `L`
//! after reboot instead of dropping it: delivery is at-least-once. Once the
//! cursor reaches the end of the log, the log and cursor files are deleted.
//!
//! A pass takes `&mut StorageHandle`, so for its whole duration it is the only
//! writer of the cursor file.

pub mod transport;

use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::SyncConfig;
use crate::storage::log::LogEntry;
use crate::storage::medium::StorageMedium;
use crate::storage::queue::OfflineQueue;
use crate::storage::StorageHandle;
pub use transport::Transport;

/// Why a sync pass ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassEnd {
    /// Link down or queue empty; nothing was touched
    NothingToDo,
    /// Everything delivered; log and cursor removed
    Drained,
    /// A send failed; cursor restored to the failed record
    SendFailed,
    /// `max_attempts` sends made; the remainder waits for the next pass
    AttemptLimit,
    /// Reached a trailing line with no terminator
    TornTail,
    /// The medium failed mid-pass
    StorageError,
}

/// Outcome of one sync pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    /// Records accepted by the transport in this pass
    pub delivered: usize,
    pub end: PassEnd,
}

impl SyncReport {
    fn new(delivered: usize, end: PassEnd) -> Self {
        Self { delivered, end }
    }
}

/// Bounded, order-preserving queue drain
#[derive(Debug, Clone)]
pub struct SyncEngine {
    queue: OfflineQueue,
    max_attempts: usize,
    inter_send_delay: Duration,
}

impl SyncEngine {
    /// Creates a sync engine.
    ///
    /// # Arguments
    ///
    /// * `queue` - The offline queue to drain
    /// * `max_attempts` - Upper bound on sends per pass
    /// * `inter_send_delay` - Pause between consecutive successful sends
    pub fn new(queue: OfflineQueue, max_attempts: usize, inter_send_delay: Duration) -> Self {
        Self {
            queue,
            max_attempts,
            inter_send_delay,
        }
    }

    pub fn from_config(queue: OfflineQueue, config: &SyncConfig) -> Self {
        Self::new(
            queue,
            config.max_attempts,
            Duration::from_millis(config.inter_send_delay_ms),
        )
    }

    pub fn queue(&self) -> &OfflineQueue {
        &self.queue
    }

    /// Runs one sync pass.
    ///
    /// Never fails: storage and transport errors end the pass early and are
    /// reported through [`SyncReport::end`].
    ///
    /// # Returns
    ///
    /// * `SyncReport` - Records delivered in this pass and why it stopped
    pub async fn run_pass<M, T>(&self, storage: &mut StorageHandle<M>, transport: &mut T) -> SyncReport
    where
        M: StorageMedium,
        T: Transport + ?Sized,
    {
        if !transport.is_connected() {
            debug!("Transport not connected - skipping sync");
            return SyncReport::new(0, PassEnd::NothingToDo);
        }

        match self.queue.repair_cursor(storage) {
            Ok(true) => return SyncReport::new(0, PassEnd::Drained),
            Ok(false) => {}
            Err(e) => {
                error!("Failed to repair sync cursor: {}", e);
                return SyncReport::new(0, PassEnd::StorageError);
            }
        }

        if !self.queue.is_not_empty(storage) {
            debug!("No offline data to sync");
            return SyncReport::new(0, PassEnd::NothingToDo);
        }

        info!("Syncing offline data ({})", self.queue.stats(storage));

        let report = self.drain(storage, transport).await;
        if report.delivered > 0 {
            info!("Successfully synced {} offline records", report.delivered);
        }
        report
    }

    async fn drain<M, T>(&self, storage: &mut StorageHandle<M>, transport: &mut T) -> SyncReport
    where
        M: StorageMedium,
        T: Transport + ?Sized,
    {
        let log = self.queue.log();
        let cursor = self.queue.cursor();
        let mut delivered = 0;
        let mut attempts = 0;

        loop {
            let origin = cursor.read(storage);

            let entry = match log.read_at(storage, origin) {
                Ok(entry) => entry,
                Err(e) => {
                    error!("Failed to read offline queue at {}: {}", origin, e);
                    return SyncReport::new(delivered, PassEnd::StorageError);
                }
            };

            let (payload, next_offset) = match entry {
                LogEntry::End => {
                    return match self.queue.compact(storage) {
                        Ok(()) => SyncReport::new(delivered, PassEnd::Drained),
                        Err(e) => {
                            error!("Failed to compact offline queue: {}", e);
                            SyncReport::new(delivered, PassEnd::StorageError)
                        }
                    };
                }
                LogEntry::Torn { len } => {
                    warn!("Offline queue ends with an incomplete line ({} bytes) at {}", len, origin);
                    return SyncReport::new(delivered, PassEnd::TornTail);
                }
                LogEntry::Line { payload, next_offset } => (payload, next_offset),
            };

            if attempts >= self.max_attempts {
                debug!("Reached {} sync attempts, deferring the rest", attempts);
                return SyncReport::new(delivered, PassEnd::AttemptLimit);
            }
            attempts += 1;

            // Optimistic advance: persisted before the outcome is known
            if let Err(e) = cursor.write(storage, next_offset) {
                error!("Failed to advance sync cursor: {}", e);
                return SyncReport::new(delivered, PassEnd::StorageError);
            }

            if payload.is_empty() {
                debug!("Skipping blank line at {}", origin);
                continue;
            }

            debug!("Syncing payload {} ({} bytes)", delivered + 1, payload.len());
            match transport.send(&payload).await {
                Ok(()) => {
                    delivered += 1;
                    let more = next_offset < log.size_bytes(storage);
                    if more && attempts < self.max_attempts && !self.inter_send_delay.is_zero() {
                        tokio::time::sleep(self.inter_send_delay).await;
                    }
                }
                Err(e) => {
                    warn!("Sync failed, keeping record for next pass: {}", e);
                    if let Err(e) = cursor.write(storage, origin) {
                        error!("Failed to revert sync cursor to {}: {}", origin, e);
                        return SyncReport::new(delivered, PassEnd::StorageError);
                    }
                    debug!("Progress reverted to {} due to send failure", origin);
                    return SyncReport::new(delivered, PassEnd::SendFailed);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::transport::mocks::ScriptedTransport;
    use super::*;
    use crate::error::Result;
    use crate::storage::cursor::SyncCursor;
    use crate::storage::log::RecordLog;
    use crate::storage::medium::mocks::MockMedium;
    use crate::storage::medium::DirMedium;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const LOG: &str = "offline_queue.txt";
    const CURSOR: &str = "queue_progress.txt";

    fn queue() -> OfflineQueue {
        OfflineQueue::new(RecordLog::new(LOG), SyncCursor::new(CURSOR))
    }

    fn engine(max_attempts: usize) -> SyncEngine {
        SyncEngine::new(queue(), max_attempts, Duration::ZERO)
    }

    fn storage_with(lines: &[&str]) -> StorageHandle<MockMedium> {
        let mut storage = StorageHandle::mount(MockMedium::new());
        for line in lines {
            queue().enqueue(&mut storage, line).unwrap();
        }
        storage
    }

    fn assert_cursor_in_bounds(storage: &StorageHandle<MockMedium>) {
        let q = queue();
        let cursor = q.cursor().read(storage);
        assert!(cursor <= q.log().size_bytes(storage), "cursor {} past end of log", cursor);
    }

    #[tokio::test]
    async fn test_drain_preserves_order_exactly_once() {
        let mut storage = storage_with(&["r1", "r2", "r3", "r4"]);
        let mut transport = ScriptedTransport::always_ok();

        let report = engine(10).run_pass(&mut storage, &mut transport).await;

        assert_eq!(report, SyncReport::new(4, PassEnd::Drained));
        assert_eq!(transport.delivered_strings(), vec!["r1", "r2", "r3", "r4"]);
        assert_eq!(transport.attempts.len(), 4);
    }

    #[tokio::test]
    async fn test_full_drain_compacts() {
        let mut storage = storage_with(&["a", "b"]);
        let mut transport = ScriptedTransport::always_ok();

        engine(10).run_pass(&mut storage, &mut transport).await;

        assert!(!storage.medium().exists(LOG));
        assert!(!storage.medium().exists(CURSOR));
        assert!(!queue().is_not_empty(&storage));
    }

    #[tokio::test]
    async fn test_empty_sync_is_noop() {
        let mut storage = StorageHandle::mount(MockMedium::new());
        let mut transport = ScriptedTransport::always_ok();

        let report = engine(10).run_pass(&mut storage, &mut transport).await;

        assert_eq!(report, SyncReport::new(0, PassEnd::NothingToDo));
        assert!(storage.medium().files.is_empty());
        assert!(transport.attempts.is_empty());
    }

    #[tokio::test]
    async fn test_drained_but_not_compacted_is_left_alone() {
        let mut storage = storage_with(&["a"]);
        queue().cursor().write(&mut storage, 3).unwrap();
        let before = storage.medium().files.clone();
        let mut transport = ScriptedTransport::always_ok();

        let report = engine(10).run_pass(&mut storage, &mut transport).await;

        assert_eq!(report.end, PassEnd::NothingToDo);
        assert_eq!(storage.medium().files, before);
    }

    #[tokio::test]
    async fn test_disconnected_transport_is_noop() {
        let mut storage = storage_with(&["a", "b"]);
        let before = storage.medium().files.clone();
        let mut transport = ScriptedTransport::disconnected();

        let report = engine(10).run_pass(&mut storage, &mut transport).await;

        assert_eq!(report, SyncReport::new(0, PassEnd::NothingToDo));
        assert_eq!(storage.medium().files, before);
        assert!(transport.attempts.is_empty());
    }

    #[tokio::test]
    async fn test_fail_on_third_then_resume() {
        let mut storage = storage_with(&["a", "b", "c", "d", "e"]);
        let q = queue();

        let mut failing = ScriptedTransport::failing_on(3);
        let report = engine(10).run_pass(&mut storage, &mut failing).await;

        assert_eq!(report, SyncReport::new(2, PassEnd::SendFailed));
        assert_eq!(failing.delivered_strings(), vec!["a", "b"]);
        // "a\r\n" + "b\r\n": cursor sits at the start of "c"
        assert_eq!(q.cursor().read(&storage), 6);
        assert_eq!(q.stats(&storage).pending_lines, 3);
        assert_eq!(
            storage.medium().content(LOG).as_deref(),
            Some("a\r\nb\r\nc\r\nd\r\ne\r\n")
        );

        let mut ok = ScriptedTransport::always_ok();
        let report = engine(10).run_pass(&mut storage, &mut ok).await;

        assert_eq!(report, SyncReport::new(3, PassEnd::Drained));
        assert_eq!(ok.delivered_strings(), vec!["c", "d", "e"]);
        assert!(!storage.medium().exists(LOG));
        assert!(!storage.medium().exists(CURSOR));
    }

    #[tokio::test]
    async fn test_failure_on_first_record_keeps_cursor() {
        let mut storage = storage_with(&["a", "b"]);
        let q = queue();
        q.cursor().write(&mut storage, 3).unwrap();

        let mut transport = ScriptedTransport::failing_on(1);
        let report = engine(10).run_pass(&mut storage, &mut transport).await;

        assert_eq!(report, SyncReport::new(0, PassEnd::SendFailed));
        assert_eq!(q.cursor().read(&storage), 3);
        assert_eq!(transport.attempts, vec![b"b".to_vec()]);
    }

    #[tokio::test]
    async fn test_repeated_failures_across_passes_never_skip() {
        let mut storage = storage_with(&["a", "bb", "ccc"]);
        let q = queue();

        let mut first = ScriptedTransport::failing_on(2);
        engine(10).run_pass(&mut storage, &mut first).await;
        assert_eq!(q.cursor().read(&storage), 3);

        // Same record fails again in the next pass: cursor must not move backwards past it
        let mut second = ScriptedTransport::failing_on(1);
        let report = engine(10).run_pass(&mut storage, &mut second).await;
        assert_eq!(report, SyncReport::new(0, PassEnd::SendFailed));
        assert_eq!(q.cursor().read(&storage), 3);
        assert_cursor_in_bounds(&storage);

        let mut ok = ScriptedTransport::always_ok();
        engine(10).run_pass(&mut storage, &mut ok).await;
        assert_eq!(ok.delivered_strings(), vec!["bb", "ccc"]);
    }

    #[tokio::test]
    async fn test_attempt_limit_bounds_pass() {
        let lines: Vec<String> = (0..15).map(|i| format!("r{}", i)).collect();
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        let mut storage = storage_with(&refs);
        let q = queue();

        let mut transport = ScriptedTransport::always_ok();
        let report = engine(10).run_pass(&mut storage, &mut transport).await;

        assert_eq!(report, SyncReport::new(10, PassEnd::AttemptLimit));
        assert_eq!(q.stats(&storage).pending_lines, 5);
        assert!(storage.medium().exists(LOG));

        let report = engine(10).run_pass(&mut storage, &mut transport).await;
        assert_eq!(report, SyncReport::new(5, PassEnd::Drained));
        assert_eq!(transport.delivered_strings(), lines);
    }

    #[tokio::test]
    async fn test_attempt_limit_reached_on_last_record_still_compacts() {
        let mut storage = storage_with(&["a", "b"]);
        let mut transport = ScriptedTransport::always_ok();

        let report = engine(2).run_pass(&mut storage, &mut transport).await;

        assert_eq!(report, SyncReport::new(2, PassEnd::Drained));
        assert!(!storage.medium().exists(LOG));
    }

    #[tokio::test]
    async fn test_cursor_stays_in_bounds() {
        let mut storage = storage_with(&["a", "b", "c", "d"]);
        for fail_at in [2, 1, 3] {
            let mut transport = ScriptedTransport::failing_on(fail_at);
            engine(10).run_pass(&mut storage, &mut transport).await;
            assert_cursor_in_bounds(&storage);
        }
    }

    #[tokio::test]
    async fn test_blank_line_is_skipped() {
        let mut storage = StorageHandle::mount(MockMedium::new());
        storage
            .medium_mut()
            .files
            .insert(LOG.to_string(), b"a\r\n\r\nb\r\n".to_vec());
        let mut transport = ScriptedTransport::always_ok();

        let report = engine(10).run_pass(&mut storage, &mut transport).await;

        assert_eq!(report, SyncReport::new(2, PassEnd::Drained));
        assert_eq!(transport.delivered_strings(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_torn_tail_stops_pass_without_sending() {
        let mut storage = StorageHandle::mount(MockMedium::new());
        storage
            .medium_mut()
            .files
            .insert(LOG.to_string(), b"a\r\n{\"dev".to_vec());
        let mut transport = ScriptedTransport::always_ok();

        let report = engine(10).run_pass(&mut storage, &mut transport).await;

        assert_eq!(report, SyncReport::new(1, PassEnd::TornTail));
        assert_eq!(transport.delivered_strings(), vec!["a"]);
        assert_eq!(queue().cursor().read(&storage), 3);
        assert!(storage.medium().exists(LOG));
    }

    #[tokio::test]
    async fn test_cursor_beyond_end_compacts() {
        let mut storage = storage_with(&["a"]);
        queue().cursor().write(&mut storage, 99).unwrap();
        let mut transport = ScriptedTransport::always_ok();

        let report = engine(10).run_pass(&mut storage, &mut transport).await;

        assert_eq!(report, SyncReport::new(0, PassEnd::Drained));
        assert!(!storage.medium().exists(LOG));
        assert!(!storage.medium().exists(CURSOR));
        assert!(transport.attempts.is_empty());
    }

    #[tokio::test]
    async fn test_cursor_write_failure_ends_pass_before_send() {
        let mut storage = storage_with(&["a", "b"]);
        storage.medium_mut().fail_writes_to(CURSOR);
        let mut transport = ScriptedTransport::always_ok();

        let report = engine(10).run_pass(&mut storage, &mut transport).await;

        assert_eq!(report, SyncReport::new(0, PassEnd::StorageError));
        assert!(transport.attempts.is_empty());
    }

    #[tokio::test]
    async fn test_unhealthy_storage_is_noop() {
        let mut storage = storage_with(&["a"]);
        storage.medium_mut().probe_error = Some(std::io::ErrorKind::Other);
        storage.check_health();
        let mut transport = ScriptedTransport::always_ok();

        let report = engine(10).run_pass(&mut storage, &mut transport).await;

        assert_eq!(report, SyncReport::new(0, PassEnd::NothingToDo));
        assert!(transport.attempts.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_inter_send_delay() {
        let mut storage = storage_with(&["a", "b", "c"]);
        let engine = SyncEngine::new(queue(), 10, Duration::from_secs(1));
        let mut transport = ScriptedTransport::always_ok();

        let start = tokio::time::Instant::now();
        let report = engine.run_pass(&mut storage, &mut transport).await;
        let elapsed = start.elapsed();

        assert_eq!(report.delivered, 3);
        // Pauses between sends only, not after the last one
        assert!(elapsed >= Duration::from_secs(2), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(3), "elapsed {:?}", elapsed);
    }

    #[test]
    fn test_from_config() {
        let config = SyncConfig {
            interval_ms: 5000,
            max_attempts: 3,
            inter_send_delay_ms: 250,
        };
        let engine = SyncEngine::from_config(queue(), &config);
        assert_eq!(engine.max_attempts, 3);
        assert_eq!(engine.inter_send_delay, Duration::from_millis(250));
        assert_eq!(engine.queue().log().name(), LOG);
    }

    #[test]
    fn test_pass_from_sync_code() {
        let mut storage = storage_with(&["only"]);
        let mut transport = ScriptedTransport::always_ok();

        let report = tokio_test::block_on(engine(10).run_pass(&mut storage, &mut transport));

        assert_eq!(report, SyncReport::new(1, PassEnd::Drained));
    }

    /// Transport that records what the cursor file holds at the moment of each send
    struct CursorSpy {
        cursor_path: PathBuf,
        seen: Vec<String>,
        fail: bool,
    }

    #[async_trait]
    impl Transport for CursorSpy {
        fn is_connected(&self) -> bool {
            true
        }

        async fn send(&mut self, _payload: &[u8]) -> Result<()> {
            self.seen
                .push(std::fs::read_to_string(&self.cursor_path).unwrap_or_default());
            if self.fail {
                Err(crate::error::VatMonitorError::Uplink("forced failure".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn test_cursor_is_durable_before_send() {
        let temp_dir = TempDir::new().unwrap();
        let mut storage = StorageHandle::mount(DirMedium::new(temp_dir.path()));
        for line in ["aa", "bbbb"] {
            queue().enqueue(&mut storage, line).unwrap();
        }
        let mut transport = CursorSpy {
            cursor_path: temp_dir.path().join(CURSOR),
            seen: Vec::new(),
            fail: false,
        };

        engine(10).run_pass(&mut storage, &mut transport).await;

        // The cursor on disk already points past the record being sent
        assert_eq!(transport.seen, vec!["4", "10"]);
    }

    #[tokio::test]
    async fn test_failed_send_is_first_after_remount() {
        let temp_dir = TempDir::new().unwrap();
        let q = queue();

        let mut storage = StorageHandle::mount(DirMedium::new(temp_dir.path()));
        q.enqueue(&mut storage, "aa").unwrap();
        q.enqueue(&mut storage, "bbbb").unwrap();
        let mut spy = CursorSpy {
            cursor_path: temp_dir.path().join(CURSOR),
            seen: Vec::new(),
            fail: true,
        };
        engine(10).run_pass(&mut storage, &mut spy).await;
        assert_eq!(spy.seen, vec!["4"]);
        drop(storage);

        // Remount: the failed record is pending again and goes out first
        let mut storage = StorageHandle::mount(DirMedium::new(temp_dir.path()));
        assert_eq!(q.cursor().read(&storage), 0);
        let mut transport = ScriptedTransport::always_ok();
        let report = engine(10).run_pass(&mut storage, &mut transport).await;
        assert_eq!(report, SyncReport::new(2, PassEnd::Drained));
        assert_eq!(transport.delivered_strings(), vec!["aa", "bbbb"]);
        assert!(!temp_dir.path().join(LOG).exists());
    }
}

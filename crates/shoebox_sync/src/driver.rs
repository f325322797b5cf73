//! Drives staged operations through a transport.

use crate::config::RetryConfig;
use crate::error::{SyncError, SyncResult};
use crate::op::OpKind;
use crate::queue::{NetworkQueue, QueueEntry};
use shoebox_core::Database;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Performs the wire exchange for one operation.
pub trait OperationHandler {
    /// Sends `entry`. A retryable error keeps it queued under backoff; any
    /// other error drops it.
    fn handle(&mut self, entry: &QueueEntry) -> SyncResult<()>;
}

impl<F> OperationHandler for F
where
    F: FnMut(&QueueEntry) -> SyncResult<()>,
{
    fn handle(&mut self, entry: &QueueEntry) -> SyncResult<()> {
        self(entry)
    }
}

/// Outcome of one [`NetworkDriver::pump`] round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PumpReport {
    /// Operations sent and removed from the queue.
    pub completed: usize,
    /// Operations that failed and stay queued.
    pub failed: usize,
    /// Operations removed after a permanent failure or too many attempts.
    pub dropped: usize,
    /// Kinds skipped because they are backing off.
    pub deferred: usize,
}

impl PumpReport {
    /// True if the round removed anything from the queue.
    pub fn made_progress(&self) -> bool {
        self.completed + self.dropped > 0
    }
}

#[derive(Debug, Clone, Copy)]
struct Backoff {
    failures: u32,
    until: Instant,
}

/// Sends queued operations one per kind at a time, backing off per kind
/// after failures.
pub struct NetworkDriver<H> {
    queue: Arc<NetworkQueue>,
    handler: H,
    retry: RetryConfig,
    backoff: HashMap<OpKind, Backoff>,
}

impl<H: OperationHandler> NetworkDriver<H> {
    /// Creates a driver for `queue`.
    pub fn new(queue: Arc<NetworkQueue>, handler: H, retry: RetryConfig) -> Self {
        Self {
            queue,
            handler,
            retry,
            backoff: HashMap::new(),
        }
    }

    /// The queue being driven.
    pub fn queue(&self) -> &Arc<NetworkQueue> {
        &self.queue
    }

    /// The transport handler.
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// When `kind` may be attempted again, if it is backing off.
    pub fn backoff_until(&self, kind: OpKind) -> Option<Instant> {
        self.backoff.get(&kind).map(|b| b.until)
    }

    /// Forgets all backoff, e.g. when connectivity returns.
    pub fn reset_backoff(&mut self) {
        self.backoff.clear();
    }

    /// Stages and sends at most one operation per kind not in backoff.
    ///
    /// # Errors
    ///
    /// Database errors, and `Cancelled` if the handler reports it. The
    /// cancelled operation stays queued.
    pub fn pump(&mut self, db: &Database) -> SyncResult<PumpReport> {
        let mut report = PumpReport::default();
        let now = Instant::now();

        for kind in OpKind::ALL {
            if self.backoff.get(&kind).is_some_and(|b| b.until > now) {
                report.deferred += 1;
                continue;
            }
            let Some(entry) = self.queue.stage(kind, &db.handle())? else {
                continue;
            };

            match self.handler.handle(&entry) {
                Ok(()) => {
                    self.finish(db, kind, true)?;
                    self.backoff.remove(&kind);
                    report.completed += 1;
                }
                Err(SyncError::Cancelled) => {
                    self.finish(db, kind, false)?;
                    return Err(SyncError::Cancelled);
                }
                Err(e) if e.is_retryable() => {
                    let failures = self.backoff.get(&kind).map_or(0, |b| b.failures) + 1;
                    if self.retry.gives_up_after(failures) {
                        warn!(%kind, sequence = entry.sequence(), failures, error = %e, "giving up on operation");
                        self.finish(db, kind, true)?;
                        self.backoff.remove(&kind);
                        report.dropped += 1;
                    } else {
                        let delay = self.retry.backoff_for(failures);
                        debug!(%kind, failures, ?delay, error = %e, "operation failed; backing off");
                        self.finish(db, kind, false)?;
                        self.backoff.insert(
                            kind,
                            Backoff {
                                failures,
                                until: now + delay,
                            },
                        );
                        report.failed += 1;
                    }
                }
                Err(e) => {
                    warn!(%kind, sequence = entry.sequence(), error = %e, "dropping rejected operation");
                    self.finish(db, kind, true)?;
                    self.backoff.remove(&kind);
                    report.dropped += 1;
                }
            }
        }
        Ok(report)
    }

    /// Pumps until a round removes nothing. Returns the summed report.
    pub fn run_until_idle(&mut self, db: &Database) -> SyncResult<PumpReport> {
        let mut total = PumpReport::default();
        loop {
            let round = self.pump(db)?;
            total.completed += round.completed;
            total.failed += round.failed;
            total.dropped += round.dropped;
            total.deferred += round.deferred;
            if !round.made_progress() {
                return Ok(total);
            }
        }
    }

    fn finish(&self, db: &Database, kind: OpKind, remove: bool) -> SyncResult<()> {
        let txn = db.new_transaction()?;
        self.queue.commit(kind, remove, &txn)?;
        txn.commit()?;
        Ok(())
    }
}

impl<H> std::fmt::Debug for NetworkDriver<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkDriver")
            .field("retry", &self.retry)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::{NetworkOp, QueueTarget};
    use std::time::Duration;

    fn setup(ops: &[(i32, OpKind, i64)]) -> (Database, Arc<NetworkQueue>) {
        let db = Database::open_in_memory().unwrap();
        let queue = Arc::new(NetworkQueue::new());
        for &(priority, kind, id) in ops {
            queue
                .add(priority, &NetworkOp::for_target(kind, QueueTarget::new("t", id)), &db.handle())
                .unwrap();
        }
        (db, queue)
    }

    #[test]
    fn successful_operations_leave_the_queue() {
        let (db, queue) = setup(&[(1, OpKind::UploadPhoto, 1), (2, OpKind::UploadPhoto, 2), (1, OpKind::Download, 3)]);
        let mut sent = Vec::new();
        let mut driver = NetworkDriver::new(
            Arc::clone(&queue),
            |entry: &QueueEntry| -> SyncResult<()> {
                sent.push(entry.op.target.as_ref().map(|t| t.local_id));
                Ok(())
            },
            RetryConfig::default(),
        );
        let report = driver.run_until_idle(&db).unwrap();
        drop(driver);

        assert_eq!(report.completed, 3);
        assert_eq!(sent, vec![Some(3), Some(1), Some(2)]);
        assert!(queue.is_empty(&db.handle()).unwrap());
    }

    #[test]
    fn retryable_failure_backs_off_then_gives_up() {
        let (db, queue) = setup(&[(1, OpKind::Download, 1)]);
        let retry = RetryConfig::new(2)
            .with_first_backoff(Duration::from_secs(60))
            .with_jitter(0.0);
        let mut driver = NetworkDriver::new(
            Arc::clone(&queue),
            |_: &QueueEntry| -> SyncResult<()> { Err(SyncError::transport_retryable("offline")) },
            retry,
        );

        let first = driver.pump(&db).unwrap();
        assert_eq!(first.failed, 1);
        assert!(driver.backoff_until(OpKind::Download).is_some());
        assert_eq!(queue.len(&db.handle()).unwrap(), 1);

        let second = driver.pump(&db).unwrap();
        assert_eq!(second.deferred, 1);

        driver.backoff.insert(
            OpKind::Download,
            Backoff {
                failures: 1,
                until: Instant::now(),
            },
        );
        let third = driver.pump(&db).unwrap();
        assert_eq!(third.dropped, 1);
        assert!(queue.is_empty(&db.handle()).unwrap());
    }

    #[test]
    fn permanent_failure_drops_operation() {
        let (db, queue) = setup(&[(1, OpKind::UploadActivity, 1)]);
        let mut driver = NetworkDriver::new(
            Arc::clone(&queue),
            |_: &QueueEntry| -> SyncResult<()> { Err(SyncError::transport_fatal("rejected")) },
            RetryConfig::default(),
        );
        assert_eq!(driver.pump(&db).unwrap().dropped, 1);
        assert!(queue.is_empty(&db.handle()).unwrap());
    }

    #[test]
    fn cancellation_keeps_operation_queued() {
        let (db, queue) = setup(&[(1, OpKind::UploadEpisode, 1)]);
        let mut driver = NetworkDriver::new(
            Arc::clone(&queue),
            |_: &QueueEntry| -> SyncResult<()> { Err(SyncError::Cancelled) },
            RetryConfig::default(),
        );
        assert!(matches!(driver.pump(&db), Err(SyncError::Cancelled)));
        assert_eq!(queue.len(&db.handle()).unwrap(), 1);
        assert!(queue.current(OpKind::UploadEpisode).is_none());
    }
}

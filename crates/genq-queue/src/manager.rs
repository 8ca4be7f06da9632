//! Queue manager: bounded queue, worker pool lifecycle, request tables

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::backoff::BackoffPolicy;
use crate::config::QueueConfig;
use crate::request::{FnOperation, Operation, OperationOutcome, RequestId, RequestRecord, RequestStatus};
use crate::worker;

pub(crate) const LOCK_MSG: &str = "queue state mutex poisoned";

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// The queue is at capacity; shed load or retry later.
    #[error("queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    /// The identifier was never submitted to this manager.
    #[error("request {0} not found")]
    NotFound(RequestId),

    /// The wait deadline passed before the request finalized. The request
    /// itself may still be in flight.
    #[error("request {id} still unfinished after {waited:?}")]
    Timeout { id: RequestId, waited: Duration },

    /// `stop` was called; no new submissions are accepted.
    #[error("queue manager is shutting down")]
    ShuttingDown,
}

/// Point-in-time queue counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub queue_size: usize,
    pub active_count: usize,
    pub completed_count: usize,
    pub worker_count: usize,
    pub total_submitted: u64,
}

/// A request the manager is still responsible for: its record, the
/// operation to (re)execute, and the channel completion is announced on.
pub(crate) struct TrackedRequest {
    pub(crate) record: RequestRecord,
    pub(crate) operation: Arc<dyn Operation>,
    pub(crate) status_tx: watch::Sender<RequestStatus>,
}

/// Everything behind the single state lock.
///
/// A record lives in `active` from admission until finalization, at which
/// point it moves to `completed` in the same critical section as its final
/// status write. The queue itself only carries identifiers.
#[derive(Default)]
pub(crate) struct QueueState {
    pub(crate) queue: VecDeque<RequestId>,
    pub(crate) active: HashMap<RequestId, TrackedRequest>,
    pub(crate) completed: HashMap<RequestId, RequestRecord>,
}

pub(crate) struct Shared {
    pub(crate) config: QueueConfig,
    pub(crate) backoff: BackoffPolicy,
    pub(crate) state: Mutex<QueueState>,
    /// Woken on every enqueue so idle workers pick up work promptly.
    pub(crate) work_available: Notify,
    counter: AtomicU64,
    shutdown_rx: watch::Receiver<bool>,
}

/// Manages a bounded request queue drained by a fixed worker pool.
///
/// Lifecycle: construct, [`start`](Self::start), submit/wait as needed,
/// then [`stop`](Self::stop). A stopped manager does not restart.
pub struct QueueManager {
    shared: Arc<Shared>,
    shutdown_tx: watch::Sender<bool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    workers_spawned: AtomicUsize,
}

impl QueueManager {
    pub fn new(config: QueueConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let backoff = BackoffPolicy::from_config(&config);

        Self {
            shared: Arc::new(Shared {
                config,
                backoff,
                state: Mutex::new(QueueState::default()),
                work_available: Notify::new(),
                counter: AtomicU64::new(0),
                shutdown_rx,
            }),
            shutdown_tx,
            workers: Mutex::new(Vec::new()),
            workers_spawned: AtomicUsize::new(0),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(QueueConfig::default())
    }

    /// Spawn the worker pool. Idempotent; must run inside a tokio runtime.
    pub fn start(&self) {
        let mut workers = self.workers.lock().expect(LOCK_MSG);
        if !workers.is_empty() {
            return;
        }

        info!(
            workers = self.shared.config.worker_threads,
            queue_capacity = self.shared.config.max_queue_size,
            "starting queue manager"
        );

        for worker_id in 0..self.shared.config.worker_threads {
            let shared = self.shared.clone();
            let shutdown = self.shutdown_tx.subscribe();
            workers.push(tokio::spawn(worker::run(shared, shutdown, worker_id)));
        }

        self.workers_spawned.store(workers.len(), Ordering::SeqCst);
    }

    /// Signal shutdown and wait for every worker to exit.
    ///
    /// Once this returns no worker mutates shared state again: submissions
    /// are rejected, and any in-flight execution has been finalized or
    /// requeued before its worker exited.
    pub async fn stop(&self) {
        info!("stopping queue manager");
        let _ = self.shutdown_tx.send(true);
        self.shared.work_available.notify_waiters();

        let handles: Vec<JoinHandle<()>> = {
            let mut workers = self.workers.lock().expect(LOCK_MSG);
            workers.drain(..).collect()
        };

        for handle in handles {
            if let Err(join_error) = handle.await {
                error!(error = %join_error, "worker task aborted abnormally");
            }
        }
    }

    /// Submit an operation for execution.
    ///
    /// Non-blocking: if the queue is at capacity the submission is
    /// rejected immediately with [`QueueError::QueueFull`].
    pub fn submit<O>(&self, operation: O) -> Result<RequestId, QueueError>
    where
        O: Operation + 'static,
    {
        self.submit_arc(Arc::new(operation))
    }

    /// Submit a plain async closure.
    pub fn submit_fn<F, Fut>(&self, operation: F) -> Result<RequestId, QueueError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = OperationOutcome> + Send + 'static,
    {
        self.submit_arc(Arc::new(FnOperation(operation)))
    }

    pub fn submit_arc(&self, operation: Arc<dyn Operation>) -> Result<RequestId, QueueError> {
        if *self.shared.shutdown_rx.borrow() {
            return Err(QueueError::ShuttingDown);
        }

        let id = RequestId(self.shared.counter.fetch_add(1, Ordering::SeqCst) + 1);
        let record = RequestRecord::new(id);
        let (status_tx, _status_rx) = watch::channel(RequestStatus::Pending);

        {
            let mut state = self.shared.state.lock().expect(LOCK_MSG);
            if state.queue.len() >= self.shared.config.max_queue_size {
                return Err(QueueError::QueueFull {
                    capacity: self.shared.config.max_queue_size,
                });
            }
            state.queue.push_back(id);
            state.active.insert(
                id,
                TrackedRequest {
                    record,
                    operation,
                    status_tx,
                },
            );
        }

        self.shared.work_available.notify_one();
        debug!(request_id = %id, "request submitted");
        Ok(id)
    }

    /// Current snapshot of a request, wherever it lives.
    pub fn status(&self, id: RequestId) -> Option<RequestRecord> {
        let state = self.shared.state.lock().expect(LOCK_MSG);
        state
            .active
            .get(&id)
            .map(|tracked| tracked.record.clone())
            .or_else(|| state.completed.get(&id).cloned())
    }

    /// Wait until the request reaches a terminal status.
    ///
    /// Returns the finalized record for both `Completed` and `Failed`
    /// requests; inspect `status`/`error` to tell them apart. A `Timeout`
    /// error means the deadline passed first, not that the request failed.
    pub async fn wait(
        &self,
        id: RequestId,
        timeout: Option<Duration>,
    ) -> Result<RequestRecord, QueueError> {
        let mut status_rx = {
            let state = self.shared.state.lock().expect(LOCK_MSG);
            if let Some(record) = state.completed.get(&id) {
                return Ok(record.clone());
            }
            match state.active.get(&id) {
                Some(tracked) => tracked.status_tx.subscribe(),
                None => return Err(QueueError::NotFound(id)),
            }
        };

        let reach_terminal = async {
            loop {
                if status_rx.borrow_and_update().is_terminal() {
                    break;
                }
                if status_rx.changed().await.is_err() {
                    // Sender gone without a terminal status: manager dropped.
                    break;
                }
            }
        };

        match timeout {
            Some(limit) => tokio::time::timeout(limit, reach_terminal)
                .await
                .map_err(|_| QueueError::Timeout { id, waited: limit })?,
            None => reach_terminal.await,
        }

        let state = self.shared.state.lock().expect(LOCK_MSG);
        state
            .completed
            .get(&id)
            .cloned()
            .ok_or(QueueError::NotFound(id))
    }

    /// Counters reflecting one consistent instant.
    pub fn stats(&self) -> QueueStats {
        let state = self.shared.state.lock().expect(LOCK_MSG);
        QueueStats {
            queue_size: state.queue.len(),
            active_count: state.active.len(),
            completed_count: state.completed.len(),
            worker_count: self.workers_spawned.load(Ordering::SeqCst),
            total_submitted: self.shared.counter.load(Ordering::SeqCst),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopOperation;

    #[async_trait::async_trait]
    impl Operation for NoopOperation {
        async fn run(&self) -> OperationOutcome {
            OperationOutcome::Success(serde_json::Value::Null)
        }
    }

    #[tokio::test]
    async fn submissions_queue_up_before_start() {
        let manager = QueueManager::with_defaults();
        let id = manager.submit(NoopOperation).unwrap();

        let stats = manager.stats();
        assert_eq!(stats.queue_size, 1);
        assert_eq!(stats.active_count, 1);
        assert_eq!(stats.completed_count, 0);
        assert_eq!(stats.total_submitted, 1);
        assert_eq!(
            manager.status(id).unwrap().status,
            RequestStatus::Pending
        );
    }

    #[tokio::test]
    async fn backpressure_rejects_without_enqueueing() {
        let config = QueueConfig {
            max_queue_size: 2,
            ..QueueConfig::default()
        };
        let manager = QueueManager::new(config);

        manager.submit(NoopOperation).unwrap();
        manager.submit(NoopOperation).unwrap();
        let rejected = manager.submit(NoopOperation);

        assert!(matches!(
            rejected,
            Err(QueueError::QueueFull { capacity: 2 })
        ));
        assert_eq!(manager.stats().queue_size, 2);
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let manager = QueueManager::with_defaults();
        let missing = manager.wait(RequestId(42), Some(Duration::from_millis(10))).await;
        assert!(matches!(missing, Err(QueueError::NotFound(_))));
        assert!(manager.status(RequestId(42)).is_none());
    }
}

//! Request records and the operation contract

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier for a queued request.
///
/// Minted from a per-manager monotonic counter; never reused for the
/// lifetime of the owning [`QueueManager`](crate::QueueManager).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub(crate) u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// Lifecycle status of a queued request.
///
/// `Pending -> Processing -> {Completed | Failed}`, with a
/// `Processing -> RateLimited -> Pending` cycle permitted until the
/// retry limit is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Waiting in the queue
    Pending,
    /// Currently being executed by a worker
    Processing,
    /// Finished successfully
    Completed,
    /// Finished with a non-retryable error, or retries exhausted
    Failed,
    /// Hit a rate limit; will re-enter the queue after backoff
    RateLimited,
}

impl RequestStatus {
    /// Whether no further transition can occur from this status.
    pub fn is_terminal(self) -> bool {
        matches!(self, RequestStatus::Completed | RequestStatus::Failed)
    }
}

/// Caller-visible snapshot of a queued request.
///
/// `result` is set iff the request completed; `error` only when it
/// failed. The two are never both present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestRecord {
    pub id: RequestId,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Incremented once per rate-limit outcome.
    pub retry_count: u32,
    pub error: Option<String>,
    pub result: Option<serde_json::Value>,
}

impl RequestRecord {
    pub(crate) fn new(id: RequestId) -> Self {
        Self {
            id,
            status: RequestStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            retry_count: 0,
            error: None,
            result: None,
        }
    }
}

/// Outcome of a single operation execution.
#[derive(Debug)]
pub enum OperationOutcome {
    /// Operation succeeded; the value is returned verbatim to the caller.
    Success(serde_json::Value),
    /// The remote side asked us to slow down. Recovered internally via
    /// requeue + backoff; `retry_after` is the server's wait hint, if any.
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },
    /// Any other failure. Not retried.
    Failed(String),
}

/// The unit of work handed to the queue.
///
/// A single callable contract returning a tagged result, so the queue
/// never inspects the remote call's error shapes. `run` may be invoked
/// more than once: once per rate-limit retry cycle.
#[async_trait::async_trait]
pub trait Operation: Send + Sync {
    async fn run(&self) -> OperationOutcome;
}

/// Adapter so plain async closures can be submitted.
pub(crate) struct FnOperation<F>(pub(crate) F);

#[async_trait::async_trait]
impl<F, Fut> Operation for FnOperation<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: std::future::Future<Output = OperationOutcome> + Send,
{
    async fn run(&self) -> OperationOutcome {
        (self.0)().await
    }
}

//! # GenQ Queue
//!
//! Bounded async request queue for rate-limited remote APIs.
//!
//! Features:
//! - Fixed worker pool draining a bounded FIFO queue
//! - Fast-fail backpressure at admission
//! - Exponential backoff with jitter on rate-limit outcomes,
//!   honoring server-supplied retry hints
//! - Per-request lifecycle tracking and completion notification

pub mod backoff;
pub mod config;
pub mod manager;
pub mod request;

mod worker;

pub use backoff::BackoffPolicy;
pub use config::QueueConfig;
pub use manager::{QueueError, QueueManager, QueueStats};
pub use request::{Operation, OperationOutcome, RequestId, RequestRecord, RequestStatus};

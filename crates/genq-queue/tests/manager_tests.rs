//! End-to-end tests for the queue manager and worker pool

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::json;

use genq_queue::{
    Operation, OperationOutcome, QueueConfig, QueueError, QueueManager, RequestStatus,
};

/// Fast backoff so retry tests finish in tens of milliseconds.
fn test_config(workers: usize, capacity: usize) -> QueueConfig {
    QueueConfig {
        max_queue_size: capacity,
        worker_threads: workers,
        max_retries: 5,
        initial_backoff: Duration::from_millis(10),
        backoff_multiplier: 2.0,
        max_backoff: Duration::from_millis(500),
        poll_interval: Duration::from_millis(10),
    }
}

/// Succeeds immediately, recording how often it ran.
struct CountingOperation {
    executions: Arc<AtomicU32>,
}

#[async_trait::async_trait]
impl Operation for CountingOperation {
    async fn run(&self) -> OperationOutcome {
        self.executions.fetch_add(1, Ordering::SeqCst);
        OperationOutcome::Success(json!({ "ok": true }))
    }
}

/// Signals a rate limit the first `limit_times` executions, then succeeds.
struct ThrottledOperation {
    executions: Arc<AtomicU32>,
    limit_times: u32,
    retry_after: Option<Duration>,
}

#[async_trait::async_trait]
impl Operation for ThrottledOperation {
    async fn run(&self) -> OperationOutcome {
        let prior = self.executions.fetch_add(1, Ordering::SeqCst);
        if prior < self.limit_times {
            OperationOutcome::RateLimited {
                message: format!("throttled on execution {}", prior + 1),
                retry_after: self.retry_after,
            }
        } else {
            OperationOutcome::Success(json!({ "answer": 42 }))
        }
    }
}

/// Always fails fatally.
struct BrokenOperation {
    executions: Arc<AtomicU32>,
}

#[async_trait::async_trait]
impl Operation for BrokenOperation {
    async fn run(&self) -> OperationOutcome {
        self.executions.fetch_add(1, Ordering::SeqCst);
        OperationOutcome::Failed("permission denied".to_string())
    }
}

/// Takes a while, then succeeds.
struct SlowOperation {
    duration: Duration,
}

#[async_trait::async_trait]
impl Operation for SlowOperation {
    async fn run(&self) -> OperationOutcome {
        tokio::time::sleep(self.duration).await;
        OperationOutcome::Success(json!("done"))
    }
}

#[tokio::test]
async fn five_submissions_two_workers_all_complete() {
    let manager = QueueManager::new(test_config(2, 5));
    manager.start();

    let executions = Arc::new(AtomicU32::new(0));
    let mut ids = Vec::new();
    for _ in 0..5 {
        ids.push(
            manager
                .submit(CountingOperation {
                    executions: executions.clone(),
                })
                .unwrap(),
        );
    }

    // Identifiers are unique.
    let mut unique = ids.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), 5);

    for id in &ids {
        let record = manager.wait(*id, Some(Duration::from_secs(5))).await.unwrap();
        assert_eq!(record.status, RequestStatus::Completed);
        assert_eq!(record.retry_count, 0);
        assert_eq!(record.result, Some(json!({ "ok": true })));
        assert!(record.error.is_none());
    }

    let stats = manager.stats();
    assert_eq!(stats.completed_count, 5);
    assert_eq!(stats.queue_size, 0);
    assert_eq!(stats.active_count, 0);
    assert_eq!(stats.worker_count, 2);
    assert_eq!(stats.total_submitted, 5);
    assert_eq!(executions.load(Ordering::SeqCst), 5);

    manager.stop().await;
}

#[tokio::test]
async fn rate_limited_twice_then_succeeds() {
    let manager = QueueManager::new(test_config(1, 10));
    manager.start();

    let executions = Arc::new(AtomicU32::new(0));
    let started = Instant::now();
    let id = manager
        .submit(ThrottledOperation {
            executions: executions.clone(),
            limit_times: 2,
            retry_after: None,
        })
        .unwrap();

    let record = manager.wait(id, Some(Duration::from_secs(5))).await.unwrap();

    assert_eq!(record.status, RequestStatus::Completed);
    assert_eq!(record.retry_count, 2);
    assert_eq!(record.result, Some(json!({ "answer": 42 })));
    assert_eq!(executions.load(Ordering::SeqCst), 3);

    // Elapsed covers both backoff sleeps at their jitter lower bound:
    // 10ms * 2^1 * 1.1 + 10ms * 2^2 * 1.1 = 66ms.
    assert!(started.elapsed() >= Duration::from_millis(60));

    manager.stop().await;
}

#[tokio::test]
async fn server_retry_hint_is_honored() {
    let manager = QueueManager::new(test_config(1, 10));
    manager.start();

    let executions = Arc::new(AtomicU32::new(0));
    let started = Instant::now();
    let id = manager
        .submit(ThrottledOperation {
            executions,
            limit_times: 1,
            retry_after: Some(Duration::from_millis(200)),
        })
        .unwrap();

    let record = manager.wait(id, Some(Duration::from_secs(5))).await.unwrap();

    assert_eq!(record.status, RequestStatus::Completed);
    assert_eq!(record.retry_count, 1);
    assert!(started.elapsed() >= Duration::from_millis(200));

    manager.stop().await;
}

#[tokio::test]
async fn rate_limit_forever_fails_after_max_retries() {
    let mut config = test_config(1, 10);
    config.max_retries = 2;
    let manager = QueueManager::new(config);
    manager.start();

    let executions = Arc::new(AtomicU32::new(0));
    let id = manager
        .submit(ThrottledOperation {
            executions: executions.clone(),
            limit_times: u32::MAX,
            retry_after: None,
        })
        .unwrap();

    let record = manager.wait(id, Some(Duration::from_secs(5))).await.unwrap();

    assert_eq!(record.status, RequestStatus::Failed);
    assert!(record.result.is_none());
    let error = record.error.expect("failed record carries a description");
    assert!(error.contains("retries exhausted"), "got: {error}");
    // max_retries + 1 executions total, never an endless loop.
    assert_eq!(executions.load(Ordering::SeqCst), 3);

    manager.stop().await;
}

#[tokio::test]
async fn non_transient_failure_is_not_retried() {
    let manager = QueueManager::new(test_config(1, 10));
    manager.start();

    let executions = Arc::new(AtomicU32::new(0));
    let id = manager
        .submit(BrokenOperation {
            executions: executions.clone(),
        })
        .unwrap();

    let record = manager.wait(id, Some(Duration::from_secs(5))).await.unwrap();

    assert_eq!(record.status, RequestStatus::Failed);
    assert_eq!(record.retry_count, 0);
    assert_eq!(record.error.as_deref(), Some("permission denied"));
    assert!(record.result.is_none());
    assert_eq!(executions.load(Ordering::SeqCst), 1);

    manager.stop().await;
}

#[tokio::test]
async fn wait_times_out_without_inventing_a_result() {
    let manager = QueueManager::new(test_config(1, 10));
    manager.start();

    let id = manager
        .submit(SlowOperation {
            duration: Duration::from_millis(300),
        })
        .unwrap();

    let early = manager.wait(id, Some(Duration::from_millis(30))).await;
    assert!(matches!(early, Err(QueueError::Timeout { .. })));

    // The request was unaffected by the caller's timeout.
    let record = manager.wait(id, Some(Duration::from_secs(5))).await.unwrap();
    assert_eq!(record.status, RequestStatus::Completed);

    manager.stop().await;
}

#[tokio::test]
async fn timeout_not_found_and_shutdown_are_distinct() {
    let manager = QueueManager::new(test_config(1, 10));
    manager.start();

    // An id minted by a different manager is unknown to this one.
    let other = QueueManager::new(test_config(1, 10));
    let foreign_id = other
        .submit(SlowOperation {
            duration: Duration::ZERO,
        })
        .unwrap();
    let missing = manager
        .wait(foreign_id, Some(Duration::from_millis(10)))
        .await;
    assert!(matches!(missing, Err(QueueError::NotFound(_))));

    manager.stop().await;

    let rejected = manager.submit(SlowOperation {
        duration: Duration::ZERO,
    });
    assert!(matches!(rejected, Err(QueueError::ShuttingDown)));
}

#[tokio::test]
async fn fifo_order_preserved_without_retries() {
    let manager = QueueManager::new(test_config(1, 10));
    manager.start();

    let order = Arc::new(Mutex::new(Vec::new()));
    let mut ids = Vec::new();
    for label in ["first", "second", "third"] {
        let order = order.clone();
        ids.push(
            manager
                .submit_fn(move || {
                    let order = order.clone();
                    async move {
                        order.lock().unwrap().push(label);
                        OperationOutcome::Success(json!(label))
                    }
                })
                .unwrap(),
        );
    }

    for id in ids {
        manager.wait(id, Some(Duration::from_secs(5))).await.unwrap();
    }

    assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);

    manager.stop().await;
}

#[tokio::test]
async fn stop_is_a_strict_barrier() {
    let manager = QueueManager::new(test_config(2, 10));
    manager.start();

    for _ in 0..3 {
        manager
            .submit(SlowOperation {
                duration: Duration::from_millis(50),
            })
            .unwrap();
    }

    // Give workers a chance to pick work up, then stop mid-stream.
    tokio::time::sleep(Duration::from_millis(20)).await;
    manager.stop().await;

    let before = manager.stats();
    tokio::time::sleep(Duration::from_millis(150)).await;
    let after = manager.stats();

    // No worker outlives stop(): the tables cannot move afterwards.
    assert_eq!(before, after);
}

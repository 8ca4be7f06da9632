//! Worker loop: dequeue, execute, finalize or requeue after backoff

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, error, warn};

use crate::manager::{Shared, LOCK_MSG};
use crate::request::{OperationOutcome, RequestId, RequestStatus};

/// Run one worker loop until shutdown.
///
/// The idle wait is bounded by `poll_interval` and races the shutdown
/// signal, so an empty queue never delays exit.
pub(crate) async fn run(shared: Arc<Shared>, mut shutdown: watch::Receiver<bool>, worker_id: usize) {
    debug!(worker = worker_id, "worker started");

    loop {
        if *shutdown.borrow() {
            break;
        }

        let next = {
            let mut state = shared.state.lock().expect(LOCK_MSG);
            state.queue.pop_front()
        };

        match next {
            Some(id) => process(&shared, &mut shutdown, id, worker_id).await,
            None => {
                tokio::select! {
                    _ = shared.work_available.notified() => {}
                    _ = tokio::time::sleep(shared.config.poll_interval) => {}
                    _ = shutdown.changed() => {}
                }
            }
        }
    }

    debug!(worker = worker_id, "worker stopped");
}

async fn process(
    shared: &Arc<Shared>,
    shutdown: &mut watch::Receiver<bool>,
    id: RequestId,
    worker_id: usize,
) {
    let operation = {
        let mut state = shared.state.lock().expect(LOCK_MSG);
        match state.active.get_mut(&id) {
            Some(tracked) => {
                tracked.record.status = RequestStatus::Processing;
                tracked.record.started_at = Some(Utc::now());
                tracked.status_tx.send_replace(RequestStatus::Processing);
                tracked.operation.clone()
            }
            None => {
                // Queue carried an id the tables no longer know.
                error!(request_id = %id, "dequeued request missing from active table");
                return;
            }
        }
    };

    debug!(worker = worker_id, request_id = %id, "processing request");

    match operation.run().await {
        OperationOutcome::Success(value) => {
            finalize(shared, id, |record| {
                record.status = RequestStatus::Completed;
                record.completed_at = Some(Utc::now());
                record.result = Some(value);
            });
            debug!(request_id = %id, "request completed");
        }

        OperationOutcome::RateLimited {
            message,
            retry_after,
        } => {
            let retries = {
                let mut state = shared.state.lock().expect(LOCK_MSG);
                match state.active.get_mut(&id) {
                    Some(tracked) => {
                        tracked.record.retry_count += 1;
                        if tracked.record.retry_count > shared.config.max_retries {
                            None
                        } else {
                            tracked.record.status = RequestStatus::RateLimited;
                            tracked.status_tx.send_replace(RequestStatus::RateLimited);
                            Some(tracked.record.retry_count)
                        }
                    }
                    None => return,
                }
            };

            match retries {
                Some(retry_count) => {
                    let delay = shared.backoff.delay(retry_count, retry_after);
                    warn!(
                        request_id = %id,
                        retry_count,
                        delay_ms = delay.as_millis() as u64,
                        "rate limited, requeueing after backoff"
                    );

                    // Shutdown cancels the backoff sleep; the record is
                    // requeued immediately so stop() never waits it out.
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown.changed() => {}
                    }

                    {
                        let mut state = shared.state.lock().expect(LOCK_MSG);
                        if let Some(tracked) = state.active.get_mut(&id) {
                            tracked.record.status = RequestStatus::Pending;
                            tracked.status_tx.send_replace(RequestStatus::Pending);
                            // Retries bypass the capacity bound: an accepted
                            // record is never dropped for backpressure.
                            state.queue.push_back(id);
                        }
                    }
                    shared.work_available.notify_one();
                }
                None => {
                    let description = format!(
                        "rate limit retries exhausted after {} attempts: {message}",
                        shared.config.max_retries
                    );
                    finalize(shared, id, |record| {
                        record.status = RequestStatus::Failed;
                        record.completed_at = Some(Utc::now());
                        record.error = Some(description);
                    });
                    warn!(request_id = %id, "rate limit retries exhausted");
                }
            }
        }

        OperationOutcome::Failed(message) => {
            error!(request_id = %id, error = %message, "request failed");
            finalize(shared, id, |record| {
                record.status = RequestStatus::Failed;
                record.completed_at = Some(Utc::now());
                record.error = Some(message);
            });
        }
    }
}

/// Move a record from active to completed in one critical section with its
/// final status write, so it is never visible in both tables or neither.
fn finalize(shared: &Arc<Shared>, id: RequestId, apply: impl FnOnce(&mut crate::request::RequestRecord)) {
    let mut state = shared.state.lock().expect(LOCK_MSG);
    if let Some(tracked) = state.active.remove(&id) {
        let crate::manager::TrackedRequest {
            mut record,
            status_tx,
            ..
        } = tracked;
        apply(&mut record);
        status_tx.send_replace(record.status);
        state.completed.insert(id, record);
    }
}

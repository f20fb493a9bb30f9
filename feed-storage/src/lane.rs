//! Single-worker serial execution lane.
//!
//! Each store instance owns one lane: one named OS thread draining one
//! unbounded work channel. Jobs run strictly in submission order, which is
//! what gives [`FeedStore`](crate::FeedStore) its FIFO guarantee. The lane
//! does not depend on an async runtime, so stores work under any executor
//! and from plain threads.
//!
//! Ordering holds only within one lane. Two stores pointed at the same medium
//! need external coordination.

use std::thread;

use feed_core::{FeedResult, StorageError};
use tokio::sync::mpsc;

use crate::store::StoreOperation;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// FIFO work queue backed by a dedicated thread.
#[derive(Debug)]
pub struct SerialLane {
    label: String,
    sender: mpsc::UnboundedSender<Job>,
}

impl SerialLane {
    /// Spawn the worker thread for a new lane.
    pub fn new(label: impl Into<String>) -> FeedResult<Self> {
        let label = label.into();
        let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();

        let thread_label = label.clone();
        thread::Builder::new()
            .name(label.clone())
            .spawn(move || {
                tracing::trace!(lane = %thread_label, "serial lane started");
                while let Some(job) = receiver.blocking_recv() {
                    job();
                }
                tracing::trace!(lane = %thread_label, "serial lane drained");
            })
            .map_err(|e| StorageError::LaneUnavailable {
                reason: format!("failed to spawn {}: {}", label, e),
            })?;

        Ok(Self { label, sender })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Enqueue `work` behind everything already submitted.
    ///
    /// The returned operation resolves with whatever `work` returns. Values
    /// captured by `work` are released before the result is delivered.
    pub fn submit<T, F>(&self, work: F) -> StoreOperation<T>
    where
        T: Send + 'static,
        F: FnOnce() -> FeedResult<T> + Send + 'static,
    {
        let (completion, operation) = StoreOperation::channel();
        let job: Job = Box::new(move || {
            let result = work();
            completion.complete(result);
        });

        match self.sender.send(job) {
            Ok(()) => operation,
            Err(_) => StoreOperation::ready(Err(StorageError::LaneUnavailable {
                reason: format!("{} has shut down", self.label),
            }
            .into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn test_jobs_run_in_submission_order() {
        let lane = SerialLane::new("test-lane").expect("lane should spawn");
        let log = Arc::new(Mutex::new(Vec::new()));

        let operations: Vec<_> = (0..20)
            .map(|i| {
                let log = Arc::clone(&log);
                lane.submit(move || {
                    log.lock().expect("test lock should not be poisoned").push(i);
                    Ok(i)
                })
            })
            .collect();

        for (i, operation) in operations.into_iter().enumerate() {
            assert_eq!(operation.await, Ok(i));
        }
        let log = log.lock().expect("test lock should not be poisoned");
        assert_eq!(*log, (0..20).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_dropped_operation_still_runs() {
        let lane = SerialLane::new("test-lane").expect("lane should spawn");
        let ran = Arc::new(Mutex::new(false));

        let flag = Arc::clone(&ran);
        drop(lane.submit(move || {
            *flag.lock().expect("test lock should not be poisoned") = true;
            Ok(())
        }));

        lane.submit(|| Ok(())).await.expect("barrier should complete");
        assert!(*ran.lock().expect("test lock should not be poisoned"));
    }

    #[tokio::test]
    async fn test_failures_pass_through() {
        let lane = SerialLane::new("test-lane").expect("lane should spawn");
        let result: FeedResult<()> = lane
            .submit(|| Err(StorageError::io("write", "disk full").into()))
            .await;
        assert!(result.expect_err("work failed").is_storage());
    }

    #[test]
    fn test_usable_without_runtime() {
        let lane = SerialLane::new("test-lane").expect("lane should spawn");
        let value = futures::executor::block_on(lane.submit(|| Ok(42)));
        assert_eq!(value, Ok(42));
    }
}

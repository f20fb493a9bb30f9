//! The storage-agnostic feed store contract.
//!
//! A store holds at most one [`CachedFeed`] snapshot. Every operation is
//! asynchronous and completes exactly once.
//!
//! # Ordering
//!
//! Operations are enqueued when the method is *called*, not when the returned
//! [`StoreOperation`] is first polled. Against a single store instance they
//! execute strictly in call order, so a caller can reason about
//! `delete` → `insert` or `retrieve` → `delete` as if the store were
//! single-threaded, even with other callers on other threads.
//!
//! Dropping a [`StoreOperation`] does not cancel it; the result is discarded.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use feed_core::{CachedFeed, FeedResult, LocalFeedImage, StorageError, Timestamp};
use tokio::sync::oneshot;

/// Storage contract shared by every concrete feed store.
///
/// Implementations own how the snapshot is represented durably; callers only
/// ever see [`CachedFeed`] and [`LocalFeedImage`].
pub trait FeedStore: Send + Sync {
    /// Read the current snapshot.
    ///
    /// An empty store is `Ok(None)`, never an error. Retrieval has no side
    /// effects, including when it fails.
    fn retrieve(&self) -> StoreOperation<Option<CachedFeed>>;

    /// Replace any existing snapshot with `(feed, timestamp)`.
    fn insert(&self, feed: Vec<LocalFeedImage>, timestamp: Timestamp) -> StoreOperation<()>;

    /// Remove the snapshot. Deleting an empty store succeeds.
    fn delete_cached_feed(&self) -> StoreOperation<()>;
}

/// Pending result of a store operation.
pub struct StoreOperation<T> {
    state: OperationState<T>,
}

enum OperationState<T> {
    Pending(oneshot::Receiver<FeedResult<T>>),
    Ready(Option<FeedResult<T>>),
}

// Never pin-projected: the receiver is Unpin and ready values are moved out.
impl<T> Unpin for StoreOperation<T> {}

impl<T> StoreOperation<T> {
    /// Create an operation together with the handle that completes it.
    pub fn channel() -> (OperationCompletion<T>, StoreOperation<T>) {
        let (tx, rx) = oneshot::channel();
        (
            OperationCompletion { sender: tx },
            StoreOperation {
                state: OperationState::Pending(rx),
            },
        )
    }

    /// An operation that has already completed with `result`.
    pub fn ready(result: FeedResult<T>) -> Self {
        Self {
            state: OperationState::Ready(Some(result)),
        }
    }
}

impl<T> Future for StoreOperation<T> {
    type Output = FeedResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            OperationState::Pending(rx) => Pin::new(rx)
                .poll(cx)
                .map(|received| received.unwrap_or_else(|_| Err(StorageError::Abandoned.into()))),
            OperationState::Ready(slot) => {
                Poll::Ready(slot.take().unwrap_or_else(|| Err(StorageError::Abandoned.into())))
            }
        }
    }
}

impl<T> std::fmt::Debug for StoreOperation<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.state {
            OperationState::Pending(_) => "pending",
            OperationState::Ready(_) => "ready",
        };
        f.debug_struct("StoreOperation").field("state", &state).finish()
    }
}

/// Completes exactly one [`StoreOperation`].
///
/// Dropping it without completing resolves the operation to
/// [`StorageError::Abandoned`].
#[derive(Debug)]
pub struct OperationCompletion<T> {
    sender: oneshot::Sender<FeedResult<T>>,
}

impl<T> OperationCompletion<T> {
    /// Deliver the result. A caller that dropped its operation is ignored.
    pub fn complete(self, result: FeedResult<T>) {
        let _ = self.sender.send(result);
    }
}

//! Local feed loader: save, load, and validate the cached feed.
//!
//! The loader decides *when* to read, write, and purge; the plugged-in
//! [`FeedStore`] decides *how* bytes are kept. It never looks past the store
//! contract.
//!
//! | Retrieval     | `load`                      | `validate_cache` |
//! |---------------|-----------------------------|------------------|
//! | failed        | error, purge                | purge            |
//! | empty         | `[]`                        | nothing          |
//! | fresh         | stored images, in order     | nothing          |
//! | stale         | `[]`, purge                 | purge            |
//!
//! Purges are fire-and-forget: their outcome is never reported.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use chrono::Utc;
use feed_core::{
    to_local, to_models, CachedFeed, FeedCache, FeedCachePolicy, FeedError, FeedImage,
    FeedLoader, FeedResult, Timestamp,
};
use tokio::task::JoinHandle;

use crate::store::{FeedStore, StoreOperation};

/// Injected time source.
pub type Clock = Arc<dyn Fn() -> Timestamp + Send + Sync>;

/// What a retrieval means for the cache.
#[derive(Debug)]
enum Retrieval {
    Failed(FeedError),
    Empty,
    Fresh(CachedFeed),
    Stale(CachedFeed),
}

/// State shared between the loader and its in-flight completion tasks.
///
/// Tasks only hold a [`Weak`] to it, so dropping the loader turns every
/// pending completion into a no-op.
struct LoaderShared<S: ?Sized> {
    current_date: Clock,
    policy: FeedCachePolicy,
    store: Arc<S>,
}

impl<S: FeedStore + ?Sized> LoaderShared<S> {
    fn insert(&self, feed: Vec<FeedImage>) -> StoreOperation<()> {
        self.store.insert(to_local(feed), (self.current_date)())
    }

    fn classify(&self, retrieved: FeedResult<Option<CachedFeed>>) -> Retrieval {
        match retrieved {
            Err(err) => Retrieval::Failed(err),
            Ok(None) => Retrieval::Empty,
            Ok(Some(cache)) if self.policy.validate(cache.timestamp, (self.current_date)()) => {
                Retrieval::Fresh(cache)
            }
            Ok(Some(cache)) => Retrieval::Stale(cache),
        }
    }

    fn purge(&self, reason: &'static str) {
        tracing::warn!(reason, "purging cached feed");
        // Fire-and-forget: the operation stays queued after the handle drops.
        drop(self.store.delete_cached_feed());
    }

    fn finish_load(&self, retrieved: FeedResult<Option<CachedFeed>>) -> FeedResult<Vec<FeedImage>> {
        match self.classify(retrieved) {
            Retrieval::Failed(err) => {
                self.purge("unreadable");
                Err(err)
            }
            Retrieval::Empty => Ok(Vec::new()),
            Retrieval::Fresh(cache) => {
                tracing::debug!(images = cache.feed.len(), "loaded fresh cached feed");
                Ok(to_models(cache.feed))
            }
            Retrieval::Stale(cache) => {
                tracing::debug!(timestamp = %cache.timestamp, "cached feed is stale");
                self.purge("stale");
                Ok(Vec::new())
            }
        }
    }

    fn finish_validation(&self, retrieved: FeedResult<Option<CachedFeed>>) {
        match self.classify(retrieved) {
            Retrieval::Failed(err) => {
                tracing::debug!(error = %err, "cache validation could not read the store");
                self.purge("unreadable");
            }
            Retrieval::Stale(_) => self.purge("stale"),
            Retrieval::Empty | Retrieval::Fresh(_) => {}
        }
    }
}

/// Cache orchestrator over any [`FeedStore`].
///
/// # Example
///
/// ```ignore
/// let store = Arc::new(JsonFeedStore::new(path)?);
/// let loader = LocalFeedLoader::new(store, Utc::now);
///
/// loader.save(remote_feed).await?;
/// let feed = loader.load().await?;
/// ```
pub struct LocalFeedLoader<S: ?Sized> {
    shared: Arc<LoaderShared<S>>,
}

impl<S: FeedStore + ?Sized> LocalFeedLoader<S> {
    /// Create a loader with the default seven-day policy.
    pub fn new<C>(store: Arc<S>, current_date: C) -> Self
    where
        C: Fn() -> Timestamp + Send + Sync + 'static,
    {
        Self::with_policy(store, current_date, FeedCachePolicy::default())
    }

    /// Create a loader reading the system clock.
    pub fn with_system_clock(store: Arc<S>) -> Self {
        Self::new(store, Utc::now)
    }

    pub fn with_policy<C>(store: Arc<S>, current_date: C, policy: FeedCachePolicy) -> Self
    where
        C: Fn() -> Timestamp + Send + Sync + 'static,
    {
        Self {
            shared: Arc::new(LoaderShared {
                current_date: Arc::new(current_date),
                policy,
                store,
            }),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.shared.store
    }

    pub fn policy(&self) -> FeedCachePolicy {
        self.shared.policy
    }

    /// Replace the cached feed with `feed`, stamped with the current date.
    ///
    /// Deletes first; a deletion failure is returned without inserting.
    pub async fn save(&self, feed: Vec<FeedImage>) -> FeedResult<()> {
        self.shared.store.delete_cached_feed().await?;
        self.shared.insert(feed).await
    }

    /// Load the cached feed if it is still fresh.
    pub async fn load(&self) -> FeedResult<Vec<FeedImage>> {
        let retrieved = self.shared.store.retrieve().await;
        self.shared.finish_load(retrieved)
    }

    /// Purge the cache if it is unreadable or stale. Reports nothing.
    pub async fn validate_cache(&self) {
        let retrieved = self.shared.store.retrieve().await;
        self.shared.finish_validation(retrieved);
    }
}

impl<S: FeedStore + ?Sized + 'static> LocalFeedLoader<S> {
    /// Completion-based [`save`](Self::save).
    ///
    /// The deletion is issued before this returns. If the loader is dropped
    /// before a store operation finishes, `completion` is never called and
    /// no insert is issued. Must be called within a tokio runtime.
    pub fn save_with<F>(&self, feed: Vec<FeedImage>, completion: F) -> JoinHandle<()>
    where
        F: FnOnce(FeedResult<()>) + Send + 'static,
    {
        let deletion = self.shared.store.delete_cached_feed();
        let weak = Arc::downgrade(&self.shared);

        tokio::spawn(async move {
            let deleted = deletion.await;
            let Some(shared) = weak.upgrade() else {
                return;
            };
            if let Err(err) = deleted {
                drop(shared);
                completion(Err(err));
                return;
            }

            let insertion = shared.insert(feed);
            drop(shared);
            let inserted = insertion.await;
            if is_released(&weak) {
                return;
            }
            completion(inserted);
        })
    }

    /// Completion-based [`load`](Self::load), with the same release rules as
    /// [`save_with`](Self::save_with).
    pub fn load_with<F>(&self, completion: F) -> JoinHandle<()>
    where
        F: FnOnce(FeedResult<Vec<FeedImage>>) + Send + 'static,
    {
        let retrieval = self.shared.store.retrieve();
        let weak = Arc::downgrade(&self.shared);

        tokio::spawn(async move {
            let retrieved = retrieval.await;
            let Some(shared) = weak.upgrade() else {
                return;
            };
            let result = shared.finish_load(retrieved);
            drop(shared);
            completion(result);
        })
    }

    /// Start a [`validate_cache`](Self::validate_cache) without waiting for it.
    pub fn validate_cache_detached(&self) -> JoinHandle<()> {
        let retrieval = self.shared.store.retrieve();
        let weak = Arc::downgrade(&self.shared);

        tokio::spawn(async move {
            let retrieved = retrieval.await;
            if let Some(shared) = weak.upgrade() {
                shared.finish_validation(retrieved);
            }
        })
    }
}

fn is_released<T: ?Sized>(weak: &Weak<T>) -> bool {
    weak.strong_count() == 0
}

#[async_trait]
impl<S: FeedStore + ?Sized> FeedLoader for LocalFeedLoader<S> {
    async fn load(&self) -> FeedResult<Vec<FeedImage>> {
        LocalFeedLoader::load(self).await
    }
}

#[async_trait]
impl<S: FeedStore + ?Sized> FeedCache for LocalFeedLoader<S> {
    async fn save(&self, feed: Vec<FeedImage>) -> FeedResult<()> {
        LocalFeedLoader::save(self, feed).await
    }
}

impl<S: ?Sized> std::fmt::Debug for LocalFeedLoader<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalFeedLoader")
            .field("policy", &self.shared.policy)
            .finish_non_exhaustive()
    }
}

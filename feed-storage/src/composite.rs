//! Loader composition: write-through caching and remote-with-local fallback.

use std::sync::Arc;

use async_trait::async_trait;
use feed_core::{FeedCache, FeedImage, FeedLoader, FeedResult};

/// Loader that saves every successful load into a cache.
///
/// The decoratee's result is returned unchanged. A failed save is logged and
/// otherwise ignored, and a failed load never touches the cache.
///
/// # Example
///
/// ```ignore
/// let remote = FeedLoaderCacheDecorator::new(remote_loader, local_loader.clone());
/// let loader = FeedLoaderWithFallback::new(remote, local_loader);
/// let feed = loader.load().await?;
/// ```
pub struct FeedLoaderCacheDecorator<L: ?Sized, C: ?Sized> {
    decoratee: Arc<L>,
    cache: Arc<C>,
}

impl<L, C> FeedLoaderCacheDecorator<L, C>
where
    L: FeedLoader + ?Sized,
    C: FeedCache + ?Sized,
{
    pub fn new(decoratee: Arc<L>, cache: Arc<C>) -> Self {
        Self { decoratee, cache }
    }
}

#[async_trait]
impl<L, C> FeedLoader for FeedLoaderCacheDecorator<L, C>
where
    L: FeedLoader + ?Sized,
    C: FeedCache + ?Sized,
{
    async fn load(&self) -> FeedResult<Vec<FeedImage>> {
        let feed = self.decoratee.load().await?;
        if let Err(err) = self.cache.save(feed.clone()).await {
            tracing::warn!(error = %err, images = feed.len(), "failed to cache loaded feed");
        }
        Ok(feed)
    }
}

/// Loader that tries `primary` and falls back to `fallback` on error.
pub struct FeedLoaderWithFallback<P: ?Sized, F: ?Sized> {
    primary: Arc<P>,
    fallback: Arc<F>,
}

impl<P, F> FeedLoaderWithFallback<P, F>
where
    P: FeedLoader + ?Sized,
    F: FeedLoader + ?Sized,
{
    pub fn new(primary: Arc<P>, fallback: Arc<F>) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl<P, F> FeedLoader for FeedLoaderWithFallback<P, F>
where
    P: FeedLoader + ?Sized,
    F: FeedLoader + ?Sized,
{
    async fn load(&self) -> FeedResult<Vec<FeedImage>> {
        match self.primary.load().await {
            Ok(feed) => Ok(feed),
            Err(err) => {
                tracing::debug!(error = %err, "primary feed loader failed, using fallback");
                self.fallback.load().await
            }
        }
    }
}

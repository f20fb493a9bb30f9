//! Feature-level traits the rest of an application binds to.
//!
//! Remote loaders, the local cache, and the composites in `feed-storage` all
//! speak these two traits, so they can be stacked freely.

use async_trait::async_trait;

use crate::{FeedImage, FeedResult};

/// Anything that can produce the current feed.
#[async_trait]
pub trait FeedLoader: Send + Sync {
    /// Load the feed. An empty feed is a success, not an error.
    async fn load(&self) -> FeedResult<Vec<FeedImage>>;
}

/// Anything that can persist a feed for later.
#[async_trait]
pub trait FeedCache: Send + Sync {
    /// Replace whatever was cached with `feed`.
    async fn save(&self, feed: Vec<FeedImage>) -> FeedResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct InMemoryCache {
        feed: Mutex<Vec<FeedImage>>,
    }

    #[async_trait]
    impl FeedLoader for InMemoryCache {
        async fn load(&self) -> FeedResult<Vec<FeedImage>> {
            Ok(self.feed.lock().expect("test lock should not be poisoned").clone())
        }
    }

    #[async_trait]
    impl FeedCache for InMemoryCache {
        async fn save(&self, feed: Vec<FeedImage>) -> FeedResult<()> {
            *self.feed.lock().expect("test lock should not be poisoned") = feed;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_traits_are_object_safe() {
        let cache = Arc::new(InMemoryCache {
            feed: Mutex::new(Vec::new()),
        });
        let loader: Arc<dyn FeedLoader> = cache.clone();
        let sink: Arc<dyn FeedCache> = cache;

        let feed = vec![FeedImage::new(
            crate::new_image_id(),
            None,
            Some("Lisbon".to_string()),
            url::Url::parse("https://images.example/1.jpg").expect("valid url"),
        )];
        sink.save(feed.clone()).await.expect("save should succeed");

        assert_eq!(loader.load().await, Ok(feed));
    }
}

//! Feed Core - Entity Types
//!
//! Pure data structures shared by every feed crate. This crate performs no
//! I/O: stores, loaders, and composites live in `feed-storage`.

pub mod config;
pub mod error;
pub mod feature;
pub mod policy;

pub use config::{FeedCacheConfig, StoreBackend};
pub use error::{ConfigError, DecodeError, FeedError, FeedResult, StorageError};
pub use feature::{FeedCache, FeedLoader};
pub use policy::FeedCachePolicy;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Identifier of a single feed image.
pub type ImageId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Generate a new random image identifier.
pub fn new_image_id() -> ImageId {
    Uuid::new_v4()
}

// ============================================================================
// FEED MODELS
// ============================================================================

/// A single image in the feed, as seen by callers of the loaders.
///
/// Equality is structural; `id` is the identity used by presentation code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeedImage {
    pub id: ImageId,
    pub description: Option<String>,
    pub location: Option<String>,
    pub url: Url,
}

impl FeedImage {
    pub fn new(
        id: ImageId,
        description: Option<String>,
        location: Option<String>,
        url: Url,
    ) -> Self {
        Self {
            id,
            description,
            location,
            url,
        }
    }
}

/// Store-facing representation of a feed image.
///
/// Kept separate from [`FeedImage`] so persistence never depends on the
/// shape of the model handed to callers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalFeedImage {
    pub id: ImageId,
    pub description: Option<String>,
    pub location: Option<String>,
    pub url: Url,
}

impl From<FeedImage> for LocalFeedImage {
    fn from(image: FeedImage) -> Self {
        Self {
            id: image.id,
            description: image.description,
            location: image.location,
            url: image.url,
        }
    }
}

impl From<LocalFeedImage> for FeedImage {
    fn from(local: LocalFeedImage) -> Self {
        Self {
            id: local.id,
            description: local.description,
            location: local.location,
            url: local.url,
        }
    }
}

/// Convert models to their store representation, preserving order.
pub fn to_local(images: Vec<FeedImage>) -> Vec<LocalFeedImage> {
    images.into_iter().map(LocalFeedImage::from).collect()
}

/// Convert store records back to models, preserving order.
pub fn to_models(local: Vec<LocalFeedImage>) -> Vec<FeedImage> {
    local.into_iter().map(FeedImage::from).collect()
}

/// The single snapshot a feed store may hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedFeed {
    /// Images in display order.
    pub feed: Vec<LocalFeedImage>,
    /// When the snapshot was written.
    pub timestamp: Timestamp,
}

impl CachedFeed {
    pub fn new(feed: Vec<LocalFeedImage>, timestamp: Timestamp) -> Self {
        Self { feed, timestamp }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(n: u8) -> FeedImage {
        FeedImage::new(
            new_image_id(),
            Some(format!("description {}", n)),
            None,
            Url::parse(&format!("https://images.example/{}", n)).expect("valid url"),
        )
    }

    #[test]
    fn test_local_conversion_preserves_order_and_fields() {
        let images = vec![image(1), image(2), image(3)];
        let local = to_local(images.clone());

        assert_eq!(local.len(), 3);
        for (model, record) in images.iter().zip(&local) {
            assert_eq!(model.id, record.id);
            assert_eq!(model.description, record.description);
            assert_eq!(model.location, record.location);
            assert_eq!(model.url, record.url);
        }

        assert_eq!(to_models(local), images);
    }

    #[test]
    fn test_feed_image_equality_is_structural() {
        let a = image(7);
        let mut b = a.clone();
        assert_eq!(a, b);

        b.location = Some("elsewhere".to_string());
        assert_ne!(a, b);
    }

    #[test]
    fn test_feed_image_serializes_id_and_url_as_strings() {
        let img = image(4);
        let json = serde_json::to_value(&img).expect("serialize");

        assert_eq!(json["id"], img.id.to_string());
        assert_eq!(json["url"], img.url.as_str());
        assert!(json["location"].is_null());
    }
}

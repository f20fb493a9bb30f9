//! File-backed feed store.
//!
//! The snapshot is a single JSON document:
//!
//! ```text
//! {"feed":[{"id":"<uuid>","description":..,"location":..,"url":"<url>"}],"timestamp":"<rfc3339>"}
//! ```
//!
//! Writes go to a sibling temporary file that is then renamed over the
//! document, so a reader sees either the previous snapshot or the new one.
//! A failed write leaves the previous snapshot in place.

use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use feed_core::{CachedFeed, DecodeError, FeedResult, LocalFeedImage, StorageError, Timestamp};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::lane::SerialLane;
use crate::store::{FeedStore, StoreOperation};

#[derive(Debug, Serialize, Deserialize)]
struct CacheDocument {
    feed: Vec<CodableFeedImage>,
    timestamp: Timestamp,
}

#[derive(Debug, Serialize, Deserialize)]
struct CodableFeedImage {
    id: Uuid,
    description: Option<String>,
    location: Option<String>,
    url: Url,
}

impl From<LocalFeedImage> for CodableFeedImage {
    fn from(image: LocalFeedImage) -> Self {
        Self {
            id: image.id,
            description: image.description,
            location: image.location,
            url: image.url,
        }
    }
}

impl From<CodableFeedImage> for LocalFeedImage {
    fn from(image: CodableFeedImage) -> Self {
        Self {
            id: image.id,
            description: image.description,
            location: image.location,
            url: image.url,
        }
    }
}

impl From<CacheDocument> for CachedFeed {
    fn from(document: CacheDocument) -> Self {
        CachedFeed::new(
            document.feed.into_iter().map(LocalFeedImage::from).collect(),
            document.timestamp,
        )
    }
}

/// Feed store persisting the snapshot as one JSON file.
#[derive(Debug)]
pub struct JsonFeedStore {
    lane: SerialLane,
    path: Arc<PathBuf>,
}

impl JsonFeedStore {
    /// Create a store for the document at `path`.
    ///
    /// Nothing is read or written until the first operation. The parent
    /// directory must exist by the time of the first insert.
    pub fn new(path: impl Into<PathBuf>) -> FeedResult<Self> {
        Ok(Self {
            lane: SerialLane::new("feed-store-json")?,
            path: Arc::new(path.into()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FeedStore for JsonFeedStore {
    fn retrieve(&self) -> StoreOperation<Option<CachedFeed>> {
        let path = Arc::clone(&self.path);
        self.lane.submit(move || read_document(&path))
    }

    fn insert(&self, feed: Vec<LocalFeedImage>, timestamp: Timestamp) -> StoreOperation<()> {
        let path = Arc::clone(&self.path);
        self.lane.submit(move || {
            let document = CacheDocument {
                feed: feed.into_iter().map(CodableFeedImage::from).collect(),
                timestamp,
            };
            write_document(&path, &document)
        })
    }

    fn delete_cached_feed(&self) -> StoreOperation<()> {
        let path = Arc::clone(&self.path);
        self.lane.submit(move || remove_document(&path))
    }
}

fn read_document(path: &Path) -> FeedResult<Option<CachedFeed>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no cached feed document");
            return Ok(None);
        }
        Err(e) => return Err(StorageError::io("read", e).into()),
    };

    let document: CacheDocument =
        serde_json::from_slice(&bytes).map_err(|e| DecodeError::Malformed {
            reason: e.to_string(),
        })?;

    tracing::debug!(
        path = %path.display(),
        images = document.feed.len(),
        "retrieved cached feed document"
    );
    Ok(Some(document.into()))
}

fn write_document(path: &Path, document: &CacheDocument) -> FeedResult<()> {
    let encoded = serde_json::to_vec(document).map_err(|e| StorageError::io("encode", e))?;

    let temp_path = temp_path_for(path);
    if let Err(e) = std::fs::write(&temp_path, &encoded) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(StorageError::io("write", e).into());
    }
    if let Err(e) = std::fs::rename(&temp_path, path) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(StorageError::io("rename", e).into());
    }

    tracing::debug!(
        path = %path.display(),
        images = document.feed.len(),
        bytes = encoded.len(),
        "wrote cached feed document"
    );
    Ok(())
}

fn remove_document(path: &Path) -> FeedResult<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "removed cached feed document");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StorageError::io("remove", e).into()),
    }
}

/// `feed.store` → `feed.store.tmp`, next to the document so rename stays on
/// one filesystem.
fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("feed"));
    name.push(".tmp");
    path.with_file_name(name)
}

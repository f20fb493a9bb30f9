//! LMDB-backed feed store.
//!
//! Uses the heed crate (Rust bindings for LMDB) to keep the snapshot as a
//! small record graph:
//!
//! - `cache`: one record under the key `current`, holding a unique id and
//!   the snapshot timestamp
//! - `images`: one record per image, keyed by `cache_id ‖ position` with the
//!   position big-endian so LMDB's key order is the feed order
//!
//! # Transactions
//!
//! - `retrieve` runs in a read transaction
//! - `insert` clears the previous graph and writes the new one in a single
//!   write transaction; any failure aborts it and nothing is committed
//! - `delete_cached_feed` clears the graph in a single write transaction
//!
//! LMDB transactions are bound to the thread that opened them. Every
//! transaction for a store instance runs on that store's [`SerialLane`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use feed_core::{
    CachedFeed, DecodeError, FeedError, LocalFeedImage, StorageError, Timestamp,
};
use heed::types::{Bytes, SerdeBincode};
use heed::{Database, Env, EnvOpenOptions};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::lane::SerialLane;
use crate::store::{FeedStore, StoreOperation};

const CURRENT_CACHE_KEY: &[u8] = b"current";

/// Error type for LMDB feed store operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbStoreError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open a database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Stored bytes did not decode.
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Image records that do not belong to the current cache record.
    #[error("Corrupt record graph: {0}")]
    CorruptGraph(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<heed::Error> for LmdbStoreError {
    fn from(e: heed::Error) -> Self {
        match e {
            heed::Error::Decoding(inner) => Self::Deserialization(inner.to_string()),
            other => Self::Transaction(other.to_string()),
        }
    }
}

/// Convert LmdbStoreError to FeedError.
impl From<LmdbStoreError> for FeedError {
    fn from(e: LmdbStoreError) -> Self {
        match e {
            LmdbStoreError::Deserialization(reason) => DecodeError::Malformed { reason }.into(),
            LmdbStoreError::CorruptGraph(reason) => DecodeError::CorruptGraph { reason }.into(),
            LmdbStoreError::Io(io) => StorageError::io("lmdb", io).into(),
            other => StorageError::TransactionFailed {
                reason: other.to_string(),
            }
            .into(),
        }
    }
}

/// The single "current cache" record.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ManagedCache {
    id: Uuid,
    timestamp: DateTime<Utc>,
}

/// One child image of a [`ManagedCache`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ManagedFeedImage {
    cache_id: Uuid,
    id: Uuid,
    description: Option<String>,
    location: Option<String>,
    url: Url,
}

impl ManagedFeedImage {
    fn new(cache_id: Uuid, image: LocalFeedImage) -> Self {
        Self {
            cache_id,
            id: image.id,
            description: image.description,
            location: image.location,
            url: image.url,
        }
    }

    fn into_local(self) -> LocalFeedImage {
        LocalFeedImage {
            id: self.id,
            description: self.description,
            location: self.location,
            url: self.url,
        }
    }
}

fn image_key(cache_id: Uuid, position: u32) -> [u8; 20] {
    let mut key = [0u8; 20];
    key[..16].copy_from_slice(cache_id.as_bytes());
    key[16..].copy_from_slice(&position.to_be_bytes());
    key
}

/// Environment plus the two databases making up the record graph.
struct RecordGraph {
    env: Env,
    caches: Database<Bytes, SerdeBincode<ManagedCache>>,
    images: Database<Bytes, SerdeBincode<ManagedFeedImage>>,
}

impl RecordGraph {
    fn find(&self) -> Result<Option<CachedFeed>, LmdbStoreError> {
        let rtxn = self.env.read_txn()?;

        let Some(cache) = self.caches.get(&rtxn, CURRENT_CACHE_KEY)? else {
            return Ok(None);
        };

        let mut feed = Vec::new();
        for entry in self.images.iter(&rtxn)? {
            let (key, record) = entry?;
            if !key.starts_with(cache.id.as_bytes()) || record.cache_id != cache.id {
                return Err(LmdbStoreError::CorruptGraph(format!(
                    "image {} does not belong to cache {}",
                    record.id, cache.id
                )));
            }
            feed.push(record.into_local());
        }

        Ok(Some(CachedFeed::new(feed, cache.timestamp)))
    }

    fn replace(
        &self,
        feed: Vec<LocalFeedImage>,
        timestamp: Timestamp,
    ) -> Result<usize, LmdbStoreError> {
        let mut wtxn = self.env.write_txn()?;

        // Drop the previous graph before creating a fresh unique record.
        self.caches.clear(&mut wtxn)?;
        self.images.clear(&mut wtxn)?;

        let cache = ManagedCache {
            id: Uuid::new_v4(),
            timestamp,
        };
        self.caches.put(&mut wtxn, CURRENT_CACHE_KEY, &cache)?;

        let count = feed.len();
        for (position, image) in feed.into_iter().enumerate() {
            let position = u32::try_from(position).map_err(|_| {
                LmdbStoreError::Transaction(format!("feed too large: {} images", count))
            })?;
            let record = ManagedFeedImage::new(cache.id, image);
            self.images
                .put(&mut wtxn, &image_key(cache.id, position), &record)?;
        }

        wtxn.commit()?;
        Ok(count)
    }

    fn remove(&self) -> Result<bool, LmdbStoreError> {
        let mut wtxn = self.env.write_txn()?;

        // Check presence on raw bytes so an undecodable record can still be purged.
        let raw_caches = self.caches.remap_data_type::<Bytes>();
        if raw_caches.get(&wtxn, CURRENT_CACHE_KEY)?.is_none() {
            wtxn.abort();
            return Ok(false);
        }

        self.caches.clear(&mut wtxn)?;
        self.images.clear(&mut wtxn)?;
        wtxn.commit()?;
        Ok(true)
    }
}

/// Feed store keeping the snapshot in an LMDB environment.
///
/// # Example
///
/// ```ignore
/// use feed_storage::{FeedStore, LmdbFeedStore};
///
/// let store = LmdbFeedStore::open("/tmp/feed-cache", 16)?;
/// store.insert(feed, Utc::now()).await?;
/// let cached = store.retrieve().await?;
/// ```
pub struct LmdbFeedStore {
    lane: SerialLane,
    graph: Arc<RecordGraph>,
    path: PathBuf,
}

impl LmdbFeedStore {
    /// Open (or create) the environment in directory `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory cannot be created
    /// - LMDB environment cannot be opened
    /// - The databases cannot be created
    pub fn open<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbStoreError> {
        let map_size = max_size_mb.checked_mul(1024 * 1024).ok_or_else(|| {
            LmdbStoreError::EnvOpen(format!("map size of {} MB overflows", max_size_mb))
        })?;

        std::fs::create_dir_all(&path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(2)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbStoreError::EnvOpen(e.to_string()))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        let caches: Database<Bytes, SerdeBincode<ManagedCache>> = env
            .create_database(&mut wtxn, Some("cache"))
            .map_err(|e| LmdbStoreError::DbOpen(e.to_string()))?;
        let images: Database<Bytes, SerdeBincode<ManagedFeedImage>> = env
            .create_database(&mut wtxn, Some("images"))
            .map_err(|e| LmdbStoreError::DbOpen(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        let lane = SerialLane::new("feed-store-lmdb")
            .map_err(|e| LmdbStoreError::EnvOpen(e.to_string()))?;

        Ok(Self {
            lane,
            graph: Arc::new(RecordGraph {
                env,
                caches,
                images,
            }),
            path: path.as_ref().to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for LmdbFeedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LmdbFeedStore")
            .field("path", &self.path)
            .field("lane", &self.lane.label())
            .finish()
    }
}

impl FeedStore for LmdbFeedStore {
    fn retrieve(&self) -> StoreOperation<Option<CachedFeed>> {
        let graph = Arc::clone(&self.graph);
        self.lane.submit(move || {
            let found = graph.find()?;
            tracing::debug!(
                store = "lmdb",
                images = found.as_ref().map(|c| c.feed.len()),
                "retrieved cache record"
            );
            Ok(found)
        })
    }

    fn insert(&self, feed: Vec<LocalFeedImage>, timestamp: Timestamp) -> StoreOperation<()> {
        let graph = Arc::clone(&self.graph);
        self.lane.submit(move || {
            let count = graph.replace(feed, timestamp)?;
            tracing::debug!(store = "lmdb", images = count, "committed cache record");
            Ok(())
        })
    }

    fn delete_cached_feed(&self) -> StoreOperation<()> {
        let graph = Arc::clone(&self.graph);
        self.lane.submit(move || {
            let removed = graph.remove()?;
            tracing::debug!(store = "lmdb", removed, "deleted cache record");
            Ok(())
        })
    }
}

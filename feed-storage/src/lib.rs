//! Feed Storage - Store Contract, Stores, and Local Loader
//!
//! Defines the [`FeedStore`] contract, the two concrete stores behind it
//! (a single JSON document and an LMDB record graph), and the
//! [`LocalFeedLoader`] that applies the cache policy on top of any store.

pub mod composite;
pub mod json_store;
pub mod lane;
pub mod lmdb_store;
pub mod local_loader;
pub mod store;

pub use composite::{FeedLoaderCacheDecorator, FeedLoaderWithFallback};
pub use json_store::JsonFeedStore;
pub use lane::SerialLane;
pub use lmdb_store::{LmdbFeedStore, LmdbStoreError};
pub use local_loader::{Clock, LocalFeedLoader};
pub use store::{FeedStore, OperationCompletion, StoreOperation};

use std::sync::Arc;

use feed_core::{FeedCacheConfig, FeedResult, StorageError, StoreBackend};

// ============================================================================
// WIRING
// ============================================================================

/// Open the store described by `config`.
///
/// For [`StoreBackend::Json`] the document's parent directory is created if
/// missing; the document itself is only written on the first insert.
pub fn open_store(config: &FeedCacheConfig) -> FeedResult<Arc<dyn FeedStore>> {
    config.validate()?;

    let store: Arc<dyn FeedStore> = match config.backend {
        StoreBackend::Json => {
            if let Some(parent) = config.store_path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StorageError::io("create store directory", e))?;
            }
            Arc::new(JsonFeedStore::new(&config.store_path)?)
        }
        StoreBackend::Lmdb => Arc::new(LmdbFeedStore::open(
            &config.store_path,
            config.lmdb_map_size_mb,
        )?),
    };

    tracing::debug!(
        backend = ?config.backend,
        path = %config.store_path.display(),
        "opened feed store"
    );
    Ok(store)
}

/// Open the configured store and wrap it in a loader using the configured
/// policy and the system clock.
pub fn open_loader(config: &FeedCacheConfig) -> FeedResult<LocalFeedLoader<dyn FeedStore>> {
    let store = open_store(config)?;
    let policy = config.policy();
    Ok(LocalFeedLoader::with_policy(store, chrono::Utc::now, policy))
}

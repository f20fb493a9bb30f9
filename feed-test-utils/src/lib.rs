//! Feed Cache Test Utilities
//!
//! Shared test infrastructure for the feed workspace:
//! - A completion-driven store spy for loader use-case tests
//! - Proptest generators for feed types
//! - Fixtures for common scenarios
//! - Assertions for feed-specific results
//! - The store-contract checks every concrete store must pass

pub use feed_core::{
    CachedFeed, DecodeError, FeedCache, FeedCachePolicy, FeedError, FeedImage, FeedLoader,
    FeedResult, LocalFeedImage, StorageError, Timestamp,
};
pub use feed_storage::{FeedStore, LocalFeedLoader, OperationCompletion, StoreOperation};

use std::sync::{Mutex, MutexGuard, PoisonError};

// ============================================================================
// STORE SPY
// ============================================================================

/// A message received by [`FeedStoreSpy`], in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceivedMessage {
    DeleteCachedFeed,
    Insert(Vec<LocalFeedImage>, Timestamp),
    Retrieve,
}

#[derive(Default)]
struct SpyState {
    messages: Vec<ReceivedMessage>,
    deletions: Vec<Option<OperationCompletion<()>>>,
    insertions: Vec<Option<OperationCompletion<()>>>,
    retrievals: Vec<Option<OperationCompletion<Option<CachedFeed>>>>,
}

/// Feed store that records every call and completes only when told to.
///
/// Operations of each kind are indexed in call order, so
/// `complete_deletion(err, 1)` completes the second deletion.
#[derive(Default)]
pub struct FeedStoreSpy {
    state: Mutex<SpyState>,
}

impl FeedStoreSpy {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, SpyState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn received_messages(&self) -> Vec<ReceivedMessage> {
        self.state().messages.clone()
    }

    /// Yield until at least `count` messages have been received.
    pub async fn until_received(&self, count: usize) {
        while self.state().messages.len() < count {
            tokio::task::yield_now().await;
        }
    }

    pub fn complete_deletion(&self, error: FeedError, index: usize) {
        take_completion(&mut self.state().deletions, index, "deletion").complete(Err(error));
    }

    pub fn complete_deletion_successfully(&self, index: usize) {
        take_completion(&mut self.state().deletions, index, "deletion").complete(Ok(()));
    }

    pub fn complete_insertion(&self, error: FeedError, index: usize) {
        take_completion(&mut self.state().insertions, index, "insertion").complete(Err(error));
    }

    pub fn complete_insertion_successfully(&self, index: usize) {
        take_completion(&mut self.state().insertions, index, "insertion").complete(Ok(()));
    }

    pub fn complete_retrieval(&self, error: FeedError, index: usize) {
        take_completion(&mut self.state().retrievals, index, "retrieval").complete(Err(error));
    }

    pub fn complete_retrieval_with_empty_cache(&self, index: usize) {
        take_completion(&mut self.state().retrievals, index, "retrieval").complete(Ok(None));
    }

    pub fn complete_retrieval_with(
        &self,
        feed: Vec<LocalFeedImage>,
        timestamp: Timestamp,
        index: usize,
    ) {
        take_completion(&mut self.state().retrievals, index, "retrieval")
            .complete(Ok(Some(CachedFeed::new(feed, timestamp))));
    }
}

#[track_caller]
fn take_completion<T>(
    completions: &mut [Option<OperationCompletion<T>>],
    index: usize,
    kind: &str,
) -> OperationCompletion<T> {
    match completions.get_mut(index).and_then(Option::take) {
        Some(completion) => completion,
        None => panic!("no pending {} at index {}", kind, index),
    }
}

impl FeedStore for FeedStoreSpy {
    fn retrieve(&self) -> StoreOperation<Option<CachedFeed>> {
        let (completion, operation) = StoreOperation::channel();
        let mut state = self.state();
        state.messages.push(ReceivedMessage::Retrieve);
        state.retrievals.push(Some(completion));
        operation
    }

    fn insert(&self, feed: Vec<LocalFeedImage>, timestamp: Timestamp) -> StoreOperation<()> {
        let (completion, operation) = StoreOperation::channel();
        let mut state = self.state();
        state.messages.push(ReceivedMessage::Insert(feed, timestamp));
        state.insertions.push(Some(completion));
        operation
    }

    fn delete_cached_feed(&self) -> StoreOperation<()> {
        let (completion, operation) = StoreOperation::channel();
        let mut state = self.state();
        state.messages.push(ReceivedMessage::DeleteCachedFeed);
        state.deletions.push(Some(completion));
        operation
    }
}

// ============================================================================
// GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for feed types.

    use super::*;
    use proptest::prelude::*;
    use url::Url;
    use uuid::Uuid;

    pub fn arb_uuid() -> impl Strategy<Value = Uuid> {
        any::<[u8; 16]>().prop_map(Uuid::from_bytes)
    }

    pub fn arb_url() -> impl Strategy<Value = Url> {
        ("[a-z]{1,10}", "[a-z0-9-]{1,16}").prop_filter_map("valid url", |(host, path)| {
            Url::parse(&format!("https://{}.example/{}.jpg", host, path)).ok()
        })
    }

    pub fn arb_feed_image() -> impl Strategy<Value = FeedImage> {
        (
            arb_uuid(),
            proptest::option::of(".{0,40}"),
            proptest::option::of("[A-Za-z ,]{0,24}"),
            arb_url(),
        )
            .prop_map(|(id, description, location, url)| {
                FeedImage::new(id, description, location, url)
            })
    }

    pub fn arb_feed() -> impl Strategy<Value = Vec<FeedImage>> {
        prop::collection::vec(arb_feed_image(), 0..16)
    }

    pub fn arb_local_feed() -> impl Strategy<Value = Vec<LocalFeedImage>> {
        arb_feed().prop_map(feed_core::to_local)
    }

    /// Timestamps between 2020 and 2030, with sub-second precision.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1577836800i64..1893456000i64, 0u32..1_000_000_000).prop_filter_map(
            "representable timestamp",
            |(secs, nanos)| chrono::DateTime::from_timestamp(secs, nanos),
        )
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built test fixtures for common testing scenarios.

    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use feed_core::policy::DEFAULT_MAX_CACHE_AGE_DAYS;
    use url::Url;

    pub fn any_url() -> Url {
        Url::parse("https://any-url.example/image.jpg").expect("fixture url should parse")
    }

    pub fn unique_image() -> FeedImage {
        FeedImage::new(
            feed_core::new_image_id(),
            Some("description".to_string()),
            Some("location".to_string()),
            any_url(),
        )
    }

    /// Two fresh images, as models and as their store representation.
    pub fn unique_images() -> (Vec<FeedImage>, Vec<LocalFeedImage>) {
        let models = vec![unique_image(), unique_image()];
        let local = feed_core::to_local(models.clone());
        (models, local)
    }

    pub fn any_error() -> FeedError {
        StorageError::io("any operation", "any error").into()
    }

    pub fn fixed_now() -> Timestamp {
        Utc.with_ymd_and_hms(2026, 1, 15, 9, 30, 0)
            .single()
            .expect("fixture date should be valid")
    }

    /// A clock that always reads `now`.
    pub fn fixed_clock(now: Timestamp) -> impl Fn() -> Timestamp + Clone + Send + Sync + 'static {
        move || now
    }

    /// The oldest timestamp that is already expired at `now`.
    pub fn cache_expiration(now: Timestamp) -> Timestamp {
        now - Duration::days(DEFAULT_MAX_CACHE_AGE_DAYS)
    }

    pub fn seconds(n: i64) -> Duration {
        Duration::seconds(n)
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for feed results.

    use super::*;

    #[track_caller]
    pub fn assert_storage_error<T: std::fmt::Debug>(result: &FeedResult<T>) {
        match result {
            Err(FeedError::Storage(_)) => {}
            other => panic!("Expected Storage error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_decode_error<T: std::fmt::Debug>(result: &FeedResult<T>) {
        match result {
            Err(FeedError::Decode(_)) => {}
            other => panic!("Expected Decode error, got: {:?}", other),
        }
    }

    /// Assert that a retrieval found nothing.
    #[track_caller]
    pub fn assert_empty(result: &FeedResult<Option<CachedFeed>>) {
        match result {
            Ok(None) => {}
            other => panic!("Expected empty cache, got: {:?}", other),
        }
    }

    /// Assert that a retrieval found exactly `feed` stamped `timestamp`.
    #[track_caller]
    pub fn assert_found(
        result: &FeedResult<Option<CachedFeed>>,
        feed: &[LocalFeedImage],
        timestamp: Timestamp,
    ) {
        match result {
            Ok(Some(cache)) => {
                assert_eq!(cache.feed, feed, "Cached feed mismatch");
                assert_eq!(cache.timestamp, timestamp, "Cached timestamp mismatch");
            }
            other => panic!("Expected found cache, got: {:?}", other),
        }
    }
}

// ============================================================================
// STORE CONTRACT
// ============================================================================

pub mod store_specs {
    //! Behavior every [`FeedStore`] implementation must show.
    //!
    //! Each check takes a fresh store. Failure checks expect the caller to
    //! have arranged the failure (a corrupt document, an unwritable path).

    use super::assertions::{assert_empty, assert_found};
    use super::fixtures::unique_images;
    use super::*;
    use chrono::Utc;
    use futures::FutureExt;
    use std::sync::{Mutex, PoisonError};

    pub async fn assert_retrieve_delivers_empty_on_empty_cache<S: FeedStore + ?Sized>(sut: &S) {
        assert_empty(&sut.retrieve().await);
    }

    pub async fn assert_retrieve_has_no_side_effects_on_empty_cache<S: FeedStore + ?Sized>(
        sut: &S,
    ) {
        assert_empty(&sut.retrieve().await);
        assert_empty(&sut.retrieve().await);
    }

    pub async fn assert_retrieve_delivers_found_values_on_non_empty_cache<
        S: FeedStore + ?Sized,
    >(
        sut: &S,
    ) {
        let (_, feed) = unique_images();
        let timestamp = Utc::now();

        insert(sut, feed.clone(), timestamp).await;

        assert_found(&sut.retrieve().await, &feed, timestamp);
    }

    pub async fn assert_retrieve_has_no_side_effects_on_non_empty_cache<S: FeedStore + ?Sized>(
        sut: &S,
    ) {
        let (_, feed) = unique_images();
        let timestamp = Utc::now();

        insert(sut, feed.clone(), timestamp).await;

        assert_found(&sut.retrieve().await, &feed, timestamp);
        assert_found(&sut.retrieve().await, &feed, timestamp);
    }

    pub async fn assert_retrieve_delivers_failure_on_retrieval_error<S: FeedStore + ?Sized>(
        sut: &S,
    ) {
        let result = sut.retrieve().await;
        assert!(result.is_err(), "Expected retrieval failure, got: {:?}", result);
    }

    pub async fn assert_retrieve_has_no_side_effects_on_failure<S: FeedStore + ?Sized>(sut: &S) {
        let first = sut.retrieve().await;
        let second = sut.retrieve().await;
        assert!(first.is_err(), "Expected retrieval failure, got: {:?}", first);
        assert_eq!(first, second);
    }

    pub async fn assert_insert_delivers_no_error_on_empty_cache<S: FeedStore + ?Sized>(sut: &S) {
        let result = sut.insert(unique_images().1, Utc::now()).await;
        assert_eq!(result, Ok(()));
    }

    pub async fn assert_insert_delivers_no_error_on_non_empty_cache<S: FeedStore + ?Sized>(
        sut: &S,
    ) {
        insert(sut, unique_images().1, Utc::now()).await;

        let result = sut.insert(unique_images().1, Utc::now()).await;
        assert_eq!(result, Ok(()));
    }

    pub async fn assert_insert_overrides_previously_inserted_cache<S: FeedStore + ?Sized>(
        sut: &S,
    ) {
        insert(sut, unique_images().1, Utc::now()).await;

        let (_, latest_feed) = unique_images();
        let latest_timestamp = Utc::now();
        insert(sut, latest_feed.clone(), latest_timestamp).await;

        assert_found(&sut.retrieve().await, &latest_feed, latest_timestamp);
    }

    pub async fn assert_insert_delivers_error_on_insertion_error<S: FeedStore + ?Sized>(sut: &S) {
        let result = sut.insert(unique_images().1, Utc::now()).await;
        assert!(result.is_err(), "Expected insertion failure, got: {:?}", result);
    }

    pub async fn assert_insert_has_no_side_effects_on_insertion_error<S: FeedStore + ?Sized>(
        sut: &S,
    ) {
        let _ = sut.insert(unique_images().1, Utc::now()).await;

        assert_empty(&sut.retrieve().await);
    }

    /// A failing insert over a non-empty cache leaves the previous snapshot
    /// in place. The caller picks `failing_feed` so that inserting it fails.
    pub async fn assert_failed_insert_keeps_previous_snapshot<S: FeedStore + ?Sized>(
        sut: &S,
        failing_feed: Vec<LocalFeedImage>,
    ) {
        let (_, feed) = unique_images();
        let timestamp = Utc::now();
        insert(sut, feed.clone(), timestamp).await;

        let result = sut.insert(failing_feed, Utc::now()).await;
        assert!(result.is_err(), "Expected insertion failure, got: {:?}", result);

        assert_found(&sut.retrieve().await, &feed, timestamp);
    }

    pub async fn assert_delete_delivers_no_error_on_empty_cache<S: FeedStore + ?Sized>(sut: &S) {
        assert_eq!(sut.delete_cached_feed().await, Ok(()));
    }

    pub async fn assert_delete_has_no_side_effects_on_empty_cache<S: FeedStore + ?Sized>(sut: &S) {
        delete(sut).await;

        assert_empty(&sut.retrieve().await);
    }

    pub async fn assert_delete_delivers_no_error_on_non_empty_cache<S: FeedStore + ?Sized>(
        sut: &S,
    ) {
        insert(sut, unique_images().1, Utc::now()).await;

        assert_eq!(sut.delete_cached_feed().await, Ok(()));
    }

    pub async fn assert_delete_empties_previously_inserted_cache<S: FeedStore + ?Sized>(sut: &S) {
        insert(sut, unique_images().1, Utc::now()).await;

        delete(sut).await;

        assert_empty(&sut.retrieve().await);
    }

    pub async fn assert_delete_delivers_error_on_deletion_error<S: FeedStore + ?Sized>(sut: &S) {
        let result = sut.delete_cached_feed().await;
        assert!(result.is_err(), "Expected deletion failure, got: {:?}", result);
    }

    pub async fn assert_delete_has_no_side_effects_on_deletion_error<S: FeedStore + ?Sized>(
        sut: &S,
    ) {
        let before = sut.retrieve().await;
        let _ = sut.delete_cached_feed().await;
        let after = sut.retrieve().await;

        assert_eq!(before, after);
    }

    /// Insert, delete, insert issued back to back complete in that order,
    /// and the store ends up holding the last insert.
    pub async fn assert_side_effects_run_serially<S: FeedStore + ?Sized>(sut: &S) {
        let op1 = sut.insert(unique_images().1, Utc::now());
        let op2 = sut.delete_cached_feed();
        let (_, latest_feed) = unique_images();
        let latest_timestamp = Utc::now();
        let op3 = sut.insert(latest_feed.clone(), latest_timestamp);

        assert_eq!(op3.await, Ok(()));
        assert_eq!(
            op1.now_or_never(),
            Some(Ok(())),
            "first operation should complete before the third"
        );
        assert_eq!(
            op2.now_or_never(),
            Some(Ok(())),
            "second operation should complete before the third"
        );
        assert_found(&sut.retrieve().await, &latest_feed, latest_timestamp);
    }

    /// Inserts and deletes issued from several threads complete in the
    /// order they were issued, and the store ends up in the state of the
    /// last one.
    pub async fn assert_side_effects_run_serially_across_threads<S>(sut: &S)
    where
        S: FeedStore + Sync + ?Sized,
    {
        const THREADS: usize = 4;
        const OPERATIONS_PER_THREAD: usize = 6;

        type Issued = (StoreOperation<()>, Option<(Vec<LocalFeedImage>, Timestamp)>);
        let issued: Mutex<Vec<Issued>> = Mutex::new(Vec::new());

        std::thread::scope(|scope| {
            for thread in 0..THREADS {
                let issued = &issued;
                scope.spawn(move || {
                    for operation in 0..OPERATIONS_PER_THREAD {
                        // Issue under the lock so the recorded order is the enqueue order.
                        let mut issued = issued.lock().unwrap_or_else(PoisonError::into_inner);
                        if (thread + operation) % 3 == 2 {
                            issued.push((sut.delete_cached_feed(), None));
                        } else {
                            let (_, feed) = unique_images();
                            let timestamp = Utc::now();
                            let op = sut.insert(feed.clone(), timestamp);
                            issued.push((op, Some((feed, timestamp))));
                        }
                    }
                });
            }
        });

        let mut issued = issued.into_inner().unwrap_or_else(PoisonError::into_inner);
        assert_eq!(issued.len(), THREADS * OPERATIONS_PER_THREAD);
        let Some((last, expected)) = issued.pop() else {
            panic!("no operations were issued");
        };

        assert_eq!(last.await, Ok(()));
        for (position, (op, _)) in issued.into_iter().enumerate() {
            assert_eq!(
                op.now_or_never(),
                Some(Ok(())),
                "operation {} should complete before the last one",
                position
            );
        }

        match expected {
            Some((feed, timestamp)) => assert_found(&sut.retrieve().await, &feed, timestamp),
            None => assert_empty(&sut.retrieve().await),
        }
    }

    async fn insert<S: FeedStore + ?Sized>(
        sut: &S,
        feed: Vec<LocalFeedImage>,
        timestamp: Timestamp,
    ) {
        sut.insert(feed, timestamp)
            .await
            .expect("insert should succeed");
    }

    async fn delete<S: FeedStore + ?Sized>(sut: &S) {
        sut.delete_cached_feed()
            .await
            .expect("delete should succeed");
    }
}

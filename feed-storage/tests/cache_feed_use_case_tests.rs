//! Saving a feed through `LocalFeedLoader`, observed through the store spy.

use std::sync::{Arc, Mutex};

use feed_storage::LocalFeedLoader;
use feed_test_utils::fixtures::{any_error, fixed_clock, fixed_now, unique_images};
use feed_test_utils::{FeedResult, FeedStoreSpy, ReceivedMessage, Timestamp};

fn make_sut(now: Timestamp) -> (LocalFeedLoader<FeedStoreSpy>, Arc<FeedStoreSpy>) {
    let store = Arc::new(FeedStoreSpy::new());
    let sut = LocalFeedLoader::new(Arc::clone(&store), fixed_clock(now));
    (sut, store)
}

fn received_results<T>() -> (Arc<Mutex<Vec<T>>>, impl FnOnce(T) + Send + 'static)
where
    T: Send + 'static,
{
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    (received, move |result| {
        sink.lock().expect("test lock should not be poisoned").push(result)
    })
}

#[test]
fn test_init_does_not_message_store() {
    let (_sut, store) = make_sut(fixed_now());
    assert!(store.received_messages().is_empty());
}

#[tokio::test]
async fn test_save_requests_cache_deletion() {
    let (sut, store) = make_sut(fixed_now());

    let _handle = sut.save_with(unique_images().0, |_| {});

    assert_eq!(
        store.received_messages(),
        vec![ReceivedMessage::DeleteCachedFeed]
    );
}

#[tokio::test]
async fn test_save_does_not_request_insertion_on_deletion_error() {
    let (sut, store) = make_sut(fixed_now());

    let (result, ()) = tokio::join!(sut.save(unique_images().0), async {
        store.until_received(1).await;
        store.complete_deletion(any_error(), 0);
    });

    assert!(result.is_err());
    assert_eq!(
        store.received_messages(),
        vec![ReceivedMessage::DeleteCachedFeed]
    );
}

#[tokio::test]
async fn test_save_requests_timestamped_insertion_on_successful_deletion() {
    let now = fixed_now();
    let (sut, store) = make_sut(now);
    let (models, local) = unique_images();

    let (result, ()) = tokio::join!(sut.save(models), async {
        store.until_received(1).await;
        store.complete_deletion_successfully(0);
        store.until_received(2).await;
        store.complete_insertion_successfully(0);
    });

    assert_eq!(result, Ok(()));
    assert_eq!(
        store.received_messages(),
        vec![
            ReceivedMessage::DeleteCachedFeed,
            ReceivedMessage::Insert(local, now),
        ]
    );
}

#[tokio::test]
async fn test_save_fails_on_deletion_error() {
    let (sut, store) = make_sut(fixed_now());
    let deletion_error = any_error();

    let (result, ()) = tokio::join!(sut.save(unique_images().0), async {
        store.until_received(1).await;
        store.complete_deletion(deletion_error.clone(), 0);
    });

    assert_eq!(result, Err(deletion_error));
}

#[tokio::test]
async fn test_save_fails_on_insertion_error() {
    let (sut, store) = make_sut(fixed_now());
    let insertion_error = any_error();

    let (result, ()) = tokio::join!(sut.save(unique_images().0), async {
        store.until_received(1).await;
        store.complete_deletion_successfully(0);
        store.until_received(2).await;
        store.complete_insertion(insertion_error.clone(), 0);
    });

    assert_eq!(result, Err(insertion_error));
}

#[tokio::test]
async fn test_save_succeeds_on_successful_insertion() {
    let (sut, store) = make_sut(fixed_now());

    let (result, ()) = tokio::join!(sut.save(unique_images().0), async {
        store.until_received(1).await;
        store.complete_deletion_successfully(0);
        store.until_received(2).await;
        store.complete_insertion_successfully(0);
    });

    assert_eq!(result, Ok(()));
}

#[tokio::test]
async fn test_save_with_delivers_insertion_result() {
    let (sut, store) = make_sut(fixed_now());
    let (received, completion) = received_results::<FeedResult<()>>();

    let handle = sut.save_with(unique_images().0, completion);
    store.complete_deletion_successfully(0);
    store.until_received(2).await;
    store.complete_insertion_successfully(0);
    handle.await.expect("save task should not panic");

    assert_eq!(
        *received.lock().expect("test lock should not be poisoned"),
        vec![Ok(())]
    );
}

#[tokio::test]
async fn test_save_does_not_deliver_deletion_error_after_loader_dropped() {
    let (sut, store) = make_sut(fixed_now());
    let (received, completion) = received_results::<FeedResult<()>>();

    let handle = sut.save_with(unique_images().0, completion);
    drop(sut);
    store.complete_deletion(any_error(), 0);
    handle.await.expect("save task should not panic");

    assert!(received
        .lock()
        .expect("test lock should not be poisoned")
        .is_empty());
}

#[tokio::test]
async fn test_save_does_not_insert_after_loader_dropped() {
    let (sut, store) = make_sut(fixed_now());

    let handle = sut.save_with(unique_images().0, |_| {});
    drop(sut);
    store.complete_deletion_successfully(0);
    handle.await.expect("save task should not panic");

    assert_eq!(
        store.received_messages(),
        vec![ReceivedMessage::DeleteCachedFeed]
    );
}

#[tokio::test]
async fn test_save_does_not_deliver_insertion_error_after_loader_dropped() {
    let (sut, store) = make_sut(fixed_now());
    let (received, completion) = received_results::<FeedResult<()>>();

    let handle = sut.save_with(unique_images().0, completion);
    store.complete_deletion_successfully(0);
    store.until_received(2).await;
    drop(sut);
    store.complete_insertion(any_error(), 0);
    handle.await.expect("save task should not panic");

    assert!(received
        .lock()
        .expect("test lock should not be poisoned")
        .is_empty());
}

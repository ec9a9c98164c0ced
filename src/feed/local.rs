//! In-process change feed.

use super::{ChangeBatch, ChangeFeed, SubscriptionHandle, UpdateHandler};
use crate::error::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;

struct LocalFeedInner {
    subscribers: Vec<(usize, Arc<dyn UpdateHandler>)>,
    next_id: usize,
}

/// A change feed driven by the caller.
///
/// Every [`publish`](Self::publish) delivers the batch to all live
/// subscribers in the order they subscribed. Useful for tests and for
/// replaying recorded positions.
///
/// # Examples
///
/// ```rust
/// use truck_tracker::feed::{ChangeBatch, ChangeFeed, LocalFeed, Snapshot};
/// use std::sync::Arc;
///
/// # async fn example() -> truck_tracker::error::Result<()> {
/// let feed = LocalFeed::new("truck/location");
/// let handle = feed
///     .subscribe(Arc::new(|batch: &ChangeBatch| {
///         println!("{} snapshot(s)", batch.snapshots.len());
///     }))
///     .await?;
///
/// feed.publish(&ChangeBatch::of(vec![Snapshot::from_json(
///     "location",
///     serde_json::json!({"latitude": 17.15, "longitude": 79.61}),
/// )]));
///
/// handle.unsubscribe();
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct LocalFeed {
    name: String,
    inner: Arc<RwLock<LocalFeedInner>>,
}

impl LocalFeed {
    /// Create a feed with a descriptive name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: Arc::new(RwLock::new(LocalFeedInner {
                subscribers: Vec::new(),
                next_id: 0,
            })),
        }
    }

    /// Deliver a batch to every subscriber.
    pub fn publish(&self, batch: &ChangeBatch) {
        // Snapshot the list so handlers never run under the lock.
        let subscribers: Vec<_> = {
            let inner = self.inner.read();
            inner.subscribers.iter().map(|(_, h)| Arc::clone(h)).collect()
        };
        tracing::trace!(feed = %self.name, subscribers = subscribers.len(), "publishing batch");
        for handler in subscribers {
            handler.on_snapshot(batch);
        }
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.read().subscribers.len()
    }
}

#[async_trait]
impl ChangeFeed for LocalFeed {
    async fn subscribe(&self, handler: Arc<dyn UpdateHandler>) -> Result<SubscriptionHandle> {
        let id = {
            let mut inner = self.inner.write();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.subscribers.push((id, handler));
            id
        };

        let registry = Arc::clone(&self.inner);
        Ok(SubscriptionHandle::new(move || {
            registry.write().subscribers.retain(|(sub_id, _)| *sub_id != id);
        }))
    }

    fn describe(&self) -> String {
        format!("local:{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::Snapshot;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(counter: &Arc<AtomicUsize>) -> Arc<dyn UpdateHandler> {
        let counter = Arc::clone(counter);
        Arc::new(move |_: &ChangeBatch| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    fn empty_batch() -> ChangeBatch {
        ChangeBatch::of(vec![Snapshot::new("location", Default::default())])
    }

    #[tokio::test]
    async fn test_subscribe_and_publish() {
        let feed = LocalFeed::new("test");
        let counter = Arc::new(AtomicUsize::new(0));
        let _handle = feed.subscribe(counting(&counter)).await.unwrap();

        feed.publish(&empty_batch());
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        feed.publish(&empty_batch());
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let feed = LocalFeed::new("test");
        let counter = Arc::new(AtomicUsize::new(0));
        let handle = feed.subscribe(counting(&counter)).await.unwrap();

        feed.publish(&empty_batch());
        handle.unsubscribe();
        feed.publish(&empty_batch());

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(feed.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscriber_count_and_drop() {
        let feed = LocalFeed::new("test");
        assert_eq!(feed.subscriber_count(), 0);

        let handle1 = feed.subscribe(Arc::new(|_: &ChangeBatch| {})).await.unwrap();
        let _handle2 = feed.subscribe(Arc::new(|_: &ChangeBatch| {})).await.unwrap();
        assert_eq!(feed.subscriber_count(), 2);

        drop(handle1);
        assert_eq!(feed.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn test_clone_shares_subscribers() {
        let feed = LocalFeed::new("test");
        let feed2 = feed.clone();
        let counter = Arc::new(AtomicUsize::new(0));
        let _handle = feed.subscribe(counting(&counter)).await.unwrap();

        feed2.publish(&empty_batch());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_subscribe_outside_async_test() {
        let feed = LocalFeed::new("test");
        let counter = Arc::new(AtomicUsize::new(0));
        let handle = tokio_test::block_on(feed.subscribe(counting(&counter))).unwrap();

        feed.publish(&empty_batch());
        drop(handle);
        feed.publish(&empty_batch());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_describe() {
        assert_eq!(LocalFeed::new("truck/location").describe(), "local:truck/location");
    }
}

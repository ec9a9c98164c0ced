//! Wiring the handler to a change feed and running until shutdown.

use crate::error::{Result, TrackerError};
use crate::feed::{ChangeFeed, SubscriptionHandle};
use crate::handler::ProximityHandler;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;

/// The running tracker: one feed, one handler, at most one live subscription.
///
/// Owns everything that used to be process-wide, so shutdown can reach the
/// subscription without globals.
///
/// # Examples
///
/// ```rust
/// use truck_tracker::feed::LocalFeed;
/// use truck_tracker::geodesy::Coordinate;
/// use truck_tracker::handler::ProximityHandler;
/// use truck_tracker::tracker::Tracker;
///
/// # async fn example() -> truck_tracker::error::Result<()> {
/// let feed = LocalFeed::new("truck/location");
/// let handler = ProximityHandler::new(Coordinate::new(17.152335, 79.618608), 10.0);
///
/// let tracker = Tracker::new(feed, handler);
/// tracker.run_until(async { /* resolves on shutdown */ }).await?;
/// # Ok(())
/// # }
/// ```
pub struct Tracker<F> {
    feed: F,
    handler: Arc<ProximityHandler>,
    subscription: Option<SubscriptionHandle>,
}

impl<F: ChangeFeed> Tracker<F> {
    /// Pair a feed with a handler. Nothing is subscribed yet.
    pub fn new(feed: F, handler: ProximityHandler) -> Self {
        Self {
            feed,
            handler: Arc::new(handler),
            subscription: None,
        }
    }

    /// The feed being watched.
    pub fn feed(&self) -> &F {
        &self.feed
    }

    /// Whether the handler is currently subscribed.
    pub fn is_running(&self) -> bool {
        self.subscription.is_some()
    }

    /// Subscribe the handler, then print the banner.
    ///
    /// # Errors
    ///
    /// Returns an error if already started or if the feed refuses the
    /// subscription. Nothing is printed in either case.
    pub async fn start(&mut self) -> Result<()> {
        if self.subscription.is_some() {
            return Err(TrackerError::Feed("Tracker is already running".to_string()));
        }

        let handle = self.feed.subscribe(self.handler.clone()).await?;
        self.handler.announce();
        tracing::info!(feed = %self.feed.describe(), subscription = handle.id(), "tracker started");
        self.subscription = Some(handle);
        Ok(())
    }

    /// Unsubscribe. Returns `false` if nothing was subscribed.
    pub fn stop(&mut self) -> bool {
        match self.subscription.take() {
            Some(handle) => {
                handle.unsubscribe();
                tracing::info!(feed = %self.feed.describe(), "tracker stopped");
                true
            }
            None => false,
        }
    }

    /// Start, wait for `shutdown` to resolve, then unsubscribe.
    ///
    /// # Errors
    ///
    /// Returns an error if the subscription cannot be established.
    pub async fn run_until<S>(mut self, shutdown: S) -> Result<()>
    where
        S: Future<Output = ()>,
    {
        self.start().await?;
        shutdown.await;
        self.handler.say("");
        self.handler.say("Stopping tracker...");
        self.stop();
        Ok(())
    }
}

/// Triggers shutdown from code, e.g. in tests or an embedding service.
#[derive(Debug, Clone)]
pub struct ShutdownTrigger {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownTrigger {
    /// Request shutdown. Idempotent.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

/// Resolves when shutdown is requested.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Wait until the trigger fires or every trigger is dropped.
    pub async fn wait(mut self) {
        // Err means every sender is gone; treat that as shutdown as well.
        let _ = self.rx.wait_for(|stop| *stop).await;
    }
}

/// Create a connected trigger/signal pair.
pub fn shutdown_channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx: Arc::new(tx) }, ShutdownSignal { rx })
}

/// Resolves on Ctrl-C or when `signal` fires, whichever comes first.
///
/// If the Ctrl-C handler cannot be installed, only `signal` can end the wait.
pub async fn interrupt_or(signal: ShutdownSignal) {
    first_of(tokio::signal::ctrl_c(), signal).await;
}

async fn first_of<I>(interrupt: I, signal: ShutdownSignal)
where
    I: Future<Output = std::io::Result<()>>,
{
    let fallback = signal.clone();
    tokio::select! {
        result = interrupt => {
            if let Err(e) = result {
                tracing::error!(error = %e, "failed to listen for interrupt; waiting for shutdown signal");
                fallback.wait().await;
            }
        }
        _ = signal.wait() => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{ChangeBatch, LocalFeed, Snapshot};
    use crate::geodesy::Coordinate;
    use crate::handler::BufferSink;
    use serde_json::json;
    use std::time::Duration;

    fn tracker(feed: &LocalFeed, sink: &BufferSink) -> Tracker<LocalFeed> {
        let handler = ProximityHandler::new(Coordinate::new(0.0, 0.0), 10.0)
            .with_sink(Arc::new(sink.clone()));
        Tracker::new(feed.clone(), handler)
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let feed = LocalFeed::new("truck/location");
        let sink = BufferSink::new();
        let mut tracker = tracker(&feed, &sink);

        tracker.start().await.unwrap();
        assert!(tracker.is_running());
        assert_eq!(feed.subscriber_count(), 1);
        assert!(sink.contains("Starting tracker..."));

        assert!(tracker.stop());
        assert!(!tracker.is_running());
        assert_eq!(feed.subscriber_count(), 0);
        assert!(!tracker.stop());
    }

    #[tokio::test]
    async fn test_double_start_rejected() {
        let feed = LocalFeed::new("truck/location");
        let mut tracker = tracker(&feed, &BufferSink::new());
        tracker.start().await.unwrap();
        assert!(tracker.start().await.is_err());
        assert_eq!(feed.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn test_run_until_shutdown() {
        let feed = LocalFeed::new("truck/location");
        let sink = BufferSink::new();
        let (trigger, signal) = shutdown_channel();

        let task = tokio::spawn(tracker(&feed, &sink).run_until(signal.wait()));

        while feed.subscriber_count() == 0 {
            tokio::task::yield_now().await;
        }
        feed.publish(&ChangeBatch::of(vec![Snapshot::from_json(
            "location",
            json!({"latitude": 0.0, "longitude": 0.0}),
        )]));
        trigger.trigger();

        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        assert_eq!(feed.subscriber_count(), 0);
        assert!(sink.contains("*** ALERT: TRUCK IS NEARBY! ***"));
        assert!(sink.contains("Stopping tracker..."));
    }

    struct RefusingFeed;

    #[async_trait::async_trait]
    impl ChangeFeed for RefusingFeed {
        async fn subscribe(
            &self,
            _handler: Arc<dyn crate::feed::UpdateHandler>,
        ) -> Result<SubscriptionHandle> {
            Err(TrackerError::Feed("permission denied".to_string()))
        }

        fn describe(&self) -> String {
            "refusing".to_string()
        }
    }

    #[tokio::test]
    async fn test_failed_subscribe_prints_no_banner() {
        let sink = BufferSink::new();
        let handler = ProximityHandler::new(Coordinate::new(0.0, 0.0), 10.0)
            .with_sink(Arc::new(sink.clone()));
        let mut tracker = Tracker::new(RefusingFeed, handler);

        assert!(matches!(tracker.start().await, Err(TrackerError::Feed(_))));
        assert!(!tracker.is_running());
        assert!(sink.lines().is_empty());
    }

    #[tokio::test]
    async fn test_broken_interrupt_waits_for_signal() {
        let (trigger, signal) = shutdown_channel();
        let broken = async { Err(std::io::Error::other("signal handler unavailable")) };
        let mut wait = Box::pin(first_of(broken, signal));

        assert!(
            tokio::time::timeout(Duration::from_millis(50), &mut wait)
                .await
                .is_err()
        );

        trigger.trigger();
        tokio::time::timeout(Duration::from_secs(1), wait)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_interrupt_resolves_wait() {
        let (_trigger, signal) = shutdown_channel();
        tokio::time::timeout(Duration::from_secs(1), first_of(async { Ok(()) }, signal))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_dropped_trigger_releases_signal() {
        let (trigger, signal) = shutdown_channel();
        drop(trigger);
        tokio::time::timeout(Duration::from_secs(1), signal.wait())
            .await
            .unwrap();
    }
}

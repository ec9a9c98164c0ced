//! Replays a truck driving toward the observer through an in-process feed.
//!
//! This example shows how to:
//! - Wire a ProximityHandler to a change feed with a Tracker
//! - Push snapshots, including incomplete and malformed ones
//! - Shut down cleanly, which unsubscribes
//!
//! Run with: cargo run --example approaching_truck

use serde_json::json;
use std::time::Duration;
use truck_tracker::feed::{ChangeBatch, LocalFeed, Snapshot};
use truck_tracker::prelude::*;
use truck_tracker::tracker::shutdown_channel;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = TrackerSettings::default();
    let feed = LocalFeed::new("truck/location");
    let handler = ProximityHandler::new(settings.reference, settings.threshold_m);

    let (trigger, signal) = shutdown_channel();
    let tracker = tokio::spawn(Tracker::new(feed.clone(), handler).run_until(signal.wait()));

    while feed.subscriber_count() == 0 {
        tokio::task::yield_now().await;
    }

    let route = [
        json!({"latitude": null, "longitude": null}),
        json!({"latitude": 17.161375, "longitude": 79.618608}),
        json!({"latitude": 17.156000, "longitude": 79.618608}),
        json!({"latitude": "garbled", "longitude": 79.618608}),
        json!({"latitude": 17.152400, "longitude": 79.618608}),
        json!({"latitude": 17.152335, "longitude": 79.618608}),
    ];

    for fields in route {
        feed.publish(&ChangeBatch::of(vec![Snapshot::from_json("location", fields)]));
        tokio::time::sleep(Duration::from_millis(300)).await;
    }

    trigger.trigger();
    tracker
        .await
        .map_err(|e| TrackerError::Feed(format!("tracker task failed: {}", e)))?
}

//! # truck-tracker
//!
//! Watches a single Firestore document holding a truck's position and alerts
//! when the truck comes within a fixed geodesic distance of an observer.
//!
//! ## Overview
//!
//! - A [`ChangeFeed`](feed::ChangeFeed) pushes document snapshots whenever the
//!   watched document changes. [`feed::firestore`] talks to Firestore, and
//!   [`feed::LocalFeed`] is driven in-process.
//! - The [`ProximityHandler`](handler::ProximityHandler) reads `latitude` and
//!   `longitude` from each snapshot, computes the WGS-84 geodesic distance to
//!   the reference location, and prints a status line.
//! - The [`Tracker`](tracker::Tracker) owns the subscription and tears it down
//!   on shutdown.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use truck_tracker::prelude::*;
//!
//! # async fn example() -> truck_tracker::error::Result<()> {
//! let settings = TrackerSettings::builder()
//!     .with_env_overrides("TRACKER", "__")
//!     .build()?;
//!
//! let client = FirestoreClient::from_service_account_json(&settings.credentials_path).await?;
//! let document = client.collection(&settings.collection).document(&settings.document);
//!
//! let handler = ProximityHandler::new(settings.reference, settings.threshold_m);
//! Tracker::new(document, handler)
//!     .run_until(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `firestore` (default): the Firestore change feed and the
//!   `truck-tracker` binary.

#![warn(missing_docs, rust_2024_compatibility)]
#![deny(unsafe_code)]

pub mod core;
pub mod error;
pub mod feed;
pub mod geodesy;
pub mod handler;
pub mod tracker;

/// Convenient re-exports for common usage patterns.
pub mod prelude {
    pub use crate::core::{SettingsBuilder, TrackerSettings, Validate};
    pub use crate::error::{Result, TrackerError, ValidationError};
    pub use crate::feed::{
        ChangeBatch, ChangeFeed, LocalFeed, Snapshot, SubscriptionHandle, UpdateHandler,
    };
    pub use crate::geodesy::{Coordinate, Geodesy, KarneyGeodesic};
    pub use crate::handler::{ProximityHandler, ProximityStatus};
    pub use crate::tracker::Tracker;

    #[cfg(feature = "firestore")]
    pub use crate::feed::firestore::FirestoreClient;
}

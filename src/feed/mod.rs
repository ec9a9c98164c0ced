//! Document change feeds.
//!
//! A [`ChangeFeed`] pushes a [`ChangeBatch`] to a registered
//! [`UpdateHandler`] every time the watched document changes. Subscribing
//! returns a [`SubscriptionHandle`]; cancelling or dropping it stops delivery.

pub mod local;
pub mod subscription;

#[cfg(feature = "firestore")]
pub mod firestore;

pub use local::LocalFeed;
pub use subscription::SubscriptionHandle;

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Full content of one document at the time of a notification.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Document id within its collection.
    pub id: String,
    /// Whether the document exists. A missing document has no fields.
    pub exists: bool,
    /// Document fields.
    pub fields: Map<String, Value>,
    /// Last server-side update time, when known.
    pub update_time: Option<DateTime<Utc>>,
}

impl Snapshot {
    /// Snapshot of an existing document.
    pub fn new(id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            exists: true,
            fields,
            update_time: None,
        }
    }

    /// Snapshot built from a JSON object. Non-object values give no fields.
    pub fn from_json(id: impl Into<String>, value: Value) -> Self {
        let fields = match value {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self::new(id, fields)
    }

    /// Snapshot of a document that does not exist.
    pub fn missing(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            exists: false,
            fields: Map::new(),
            update_time: None,
        }
    }

    /// Attach an update time.
    pub fn with_update_time(mut self, update_time: DateTime<Utc>) -> Self {
        self.update_time = Some(update_time);
        self
    }
}

/// What happened to a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// First seen.
    Added,
    /// Content changed.
    Modified,
    /// Deleted.
    Removed,
}

/// A single change descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentChange {
    /// Kind of change.
    pub kind: ChangeKind,
    /// Id of the affected document.
    pub document_id: String,
}

/// One notification from a change feed.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeBatch {
    /// Snapshots in delivery order.
    pub snapshots: Vec<Snapshot>,
    /// Change descriptors, passed through untouched.
    pub changes: Vec<DocumentChange>,
    /// When the feed read this state.
    pub read_time: DateTime<Utc>,
}

impl ChangeBatch {
    /// Batch of snapshots, each reported as modified, read now.
    pub fn of(snapshots: Vec<Snapshot>) -> Self {
        let changes = snapshots
            .iter()
            .map(|s| DocumentChange {
                kind: ChangeKind::Modified,
                document_id: s.id.clone(),
            })
            .collect();
        Self {
            snapshots,
            changes,
            read_time: Utc::now(),
        }
    }
}

/// Callback invoked by a change feed.
///
/// Implementations run synchronously on the feed's delivery task and must be
/// safe to call at any time.
pub trait UpdateHandler: Send + Sync {
    /// Handle one batch of snapshots.
    fn on_snapshot(&self, batch: &ChangeBatch);
}

impl<F> UpdateHandler for F
where
    F: Fn(&ChangeBatch) + Send + Sync,
{
    fn on_snapshot(&self, batch: &ChangeBatch) {
        self(batch)
    }
}

/// Source of document change notifications.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Register `handler` and start delivering notifications to it.
    ///
    /// # Errors
    ///
    /// Returns an error if the subscription cannot be established.
    async fn subscribe(&self, handler: Arc<dyn UpdateHandler>) -> Result<SubscriptionHandle>;

    /// Human-readable description of what is being watched.
    fn describe(&self) -> String;
}

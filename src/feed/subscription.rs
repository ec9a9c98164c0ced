//! Cancellable subscription handles.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

static NEXT_ID: AtomicUsize = AtomicUsize::new(0);

type Cancel = Box<dyn FnOnce() + Send + 'static>;

/// Handle for an active subscription.
///
/// Call [`unsubscribe`](Self::unsubscribe) to stop delivery. Dropping the
/// handle unsubscribes as well.
///
/// # Examples
///
/// ```rust
/// use truck_tracker::feed::SubscriptionHandle;
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicBool, Ordering};
///
/// let stopped = Arc::new(AtomicBool::new(false));
/// let flag = Arc::clone(&stopped);
/// let handle = SubscriptionHandle::new(move || flag.store(true, Ordering::SeqCst));
///
/// handle.unsubscribe();
/// assert!(stopped.load(Ordering::SeqCst));
/// ```
pub struct SubscriptionHandle {
    id: usize,
    cancel: Option<Cancel>,
}

impl SubscriptionHandle {
    /// Create a handle that runs `cancel` exactly once when unsubscribed or dropped.
    pub fn new<F>(cancel: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Process-unique id of this subscription.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Stop receiving notifications.
    pub fn unsubscribe(mut self) {
        self.cancel_now();
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            tracing::debug!(subscription = self.id, "unsubscribing");
            cancel();
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.id)
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

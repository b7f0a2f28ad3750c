//! Notification system for lease changes.
//!
//! The applier publishes an event every time a lease is installed, so the
//! command-processing layer can reject or redirect operations that were
//! waiting on the previous leaseholder.

use rangelease_core::lease::Lease;
use rangelease_core::{LeaseSequence, RangeId, StoreId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

/// How the holder of a range changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseChangeKind {
    /// A replica took the lease without a handoff from a live holder
    Acquired,
    /// The holder renewed its own lease
    Extended,
    /// The lease was handed over by the previous holder
    Transferred,
}

/// A lease installed by the applier.
#[derive(Debug, Clone)]
pub struct LeaseChangeEvent {
    pub range_id: RangeId,
    pub kind: LeaseChangeKind,
    pub previous: Lease,
    pub current: Lease,
    /// Milliseconds since the Unix epoch
    pub timestamp: u64,
}

impl LeaseChangeEvent {
    pub fn new(range_id: RangeId, kind: LeaseChangeKind, previous: Lease, current: Lease) -> Self {
        Self {
            range_id,
            kind,
            previous,
            current,
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or_default(),
        }
    }

    pub fn sequence(&self) -> LeaseSequence {
        self.current.sequence
    }

    /// Returns true if the lease moved to or away from `store_id`.
    pub fn involves_store(&self, store_id: StoreId) -> bool {
        self.current.owned_by(store_id) || self.previous.owned_by(store_id)
    }
}

/// Subscription filter for lease-change events
#[derive(Clone)]
pub enum NotificationFilter {
    All,
    Range(RangeId),
    /// Events where the store gains or loses a lease
    Store(StoreId),
    Custom(Arc<dyn Fn(&LeaseChangeEvent) -> bool + Send + Sync>),
}

impl NotificationFilter {
    fn matches(&self, event: &LeaseChangeEvent) -> bool {
        match self {
            NotificationFilter::All => true,
            NotificationFilter::Range(range_id) => event.range_id == *range_id,
            NotificationFilter::Store(store_id) => event.involves_store(*store_id),
            NotificationFilter::Custom(func) => func(event),
        }
    }
}

/// Unique identifier for a subscription
pub type SubscriptionId = Uuid;

/// Statistics about notification delivery
#[derive(Debug, Default, Clone)]
pub struct NotificationStats {
    pub notifications_sent: u64,
    pub notifications_delivered: u64,
    pub notifications_dropped: u64,
    pub active_subscriptions: usize,
    pub total_subscriptions: u64,
}

type SubscriberMap =
    HashMap<SubscriptionId, (NotificationFilter, mpsc::UnboundedSender<LeaseChangeEvent>)>;

/// Notification bus for lease-change events
pub struct LeaseNotificationBus {
    broadcast_tx: broadcast::Sender<LeaseChangeEvent>,
    subscribers: Arc<RwLock<SubscriberMap>>,
    stats: Arc<RwLock<NotificationStats>>,
}

impl Default for LeaseNotificationBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LeaseNotificationBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaseNotificationBus")
            .field("receivers", &self.broadcast_tx.receiver_count())
            .finish()
    }
}

impl LeaseNotificationBus {
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    /// Create with custom broadcast buffer size
    pub fn with_capacity(capacity: usize) -> Self {
        let (broadcast_tx, _) = broadcast::channel(capacity);

        Self {
            broadcast_tx,
            subscribers: Arc::new(RwLock::new(HashMap::new())),
            stats: Arc::new(RwLock::new(NotificationStats::default())),
        }
    }

    /// Subscribe to events with a filter
    pub async fn subscribe(
        &self,
        filter: NotificationFilter,
    ) -> (SubscriptionId, mpsc::UnboundedReceiver<LeaseChangeEvent>) {
        let subscription_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();

        {
            let mut subscribers = self.subscribers.write().await;
            subscribers.insert(subscription_id, (filter, tx));

            let mut stats = self.stats.write().await;
            stats.active_subscriptions = subscribers.len();
            stats.total_subscriptions += 1;
        }

        debug!("Created lease subscription {}", subscription_id);

        (subscription_id, rx)
    }

    /// Receive every event through the broadcast channel. Slow receivers may
    /// observe `Lagged` errors.
    pub fn subscribe_broadcast(&self) -> broadcast::Receiver<LeaseChangeEvent> {
        self.broadcast_tx.subscribe()
    }

    pub async fn unsubscribe(&self, subscription_id: SubscriptionId) {
        let mut subscribers = self.subscribers.write().await;

        if subscribers.remove(&subscription_id).is_some() {
            debug!("Removed lease subscription {}", subscription_id);

            let mut stats = self.stats.write().await;
            stats.active_subscriptions = subscribers.len();
        }
    }

    /// Publish an event to all matching subscribers
    pub async fn publish(&self, event: LeaseChangeEvent) {
        {
            let mut stats = self.stats.write().await;
            stats.notifications_sent += 1;
        }

        // Broadcasting without receivers is not an error worth reporting.
        if self.broadcast_tx.receiver_count() > 0 && self.broadcast_tx.send(event.clone()).is_err()
        {
            warn!("Failed to send lease change to broadcast channel");
        }

        let mut delivered = 0;
        let mut dropped = 0;
        {
            let subscribers = self.subscribers.read().await;
            for (filter, tx) in subscribers.values() {
                if filter.matches(&event) {
                    match tx.send(event.clone()) {
                        Ok(_) => delivered += 1,
                        Err(_) => {
                            dropped += 1;
                            warn!("Failed to deliver lease change to subscriber");
                        }
                    }
                }
            }
        }

        {
            let mut stats = self.stats.write().await;
            stats.notifications_delivered += delivered;
            stats.notifications_dropped += dropped;
        }

        if dropped > 0 {
            self.cleanup_closed_subscribers().await;
        }

        debug!(
            "Published lease change for {} seq={}: delivered={}, dropped={}",
            event.range_id,
            event.sequence(),
            delivered,
            dropped
        );
    }

    /// Removes subscribers whose receivers were dropped.
    pub async fn cleanup_closed_subscribers(&self) -> usize {
        let mut subscribers = self.subscribers.write().await;
        let before = subscribers.len();
        subscribers.retain(|_, (_, tx)| !tx.is_closed());
        let removed = before - subscribers.len();
        if removed > 0 {
            debug!("Cleaned up {} closed lease subscriptions", removed);
            let mut stats = self.stats.write().await;
            stats.active_subscriptions = subscribers.len();
        }
        removed
    }

    pub async fn get_stats(&self) -> NotificationStats {
        self.stats.read().await.clone()
    }

    pub async fn subscription_count(&self) -> usize {
        self.subscribers.read().await.len()
    }
}

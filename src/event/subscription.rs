use std::future::Future;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;
use tracing::trace;

use crate::Clock;
use crate::GameEvent;
use crate::Result;

/// Event type that matches every event
pub const WILDCARD_EVENT_TYPE: &str = "*";

pub type SubscriptionId = u64;

/// Subscriber callback
///
/// Errors and panics are contained per handler: they are logged and counted
/// but never reach the emitter or sibling handlers.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    async fn handle(
        &self,
        event: Arc<GameEvent>,
    ) -> Result<()>;
}

#[async_trait]
impl<F, Fut> EventHandler for F
where
    F: Fn(Arc<GameEvent>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn handle(
        &self,
        event: Arc<GameEvent>,
    ) -> Result<()> {
        (self)(event).await
    }
}

struct Subscription {
    id: SubscriptionId,
    handler: Arc<dyn EventHandler>,
    /// Epoch milliseconds
    subscribed_at: u64,
}

/// Event type -> handler set bookkeeping
///
/// Sets are removed as soon as they become empty, atomically with the removal
/// of their last subscription, so a concurrent `subscribe` can never add to a
/// set that is about to vanish.
pub struct SubscriptionRegistry {
    subscriptions: DashMap<String, Vec<Subscription>>,
    next_id: AtomicU64,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for SubscriptionRegistry {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("event_types", &self.subscriptions.len())
            .field("subscriptions", &self.count())
            .finish()
    }
}

impl SubscriptionRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            subscriptions: DashMap::new(),
            next_id: AtomicU64::new(1),
            clock,
        }
    }

    pub fn subscribe<H: EventHandler>(
        &self,
        event_type: &str,
        handler: H,
    ) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let subscription = Subscription {
            id,
            handler: Arc::new(handler),
            subscribed_at: self.clock.now_ms(),
        };
        self.subscriptions
            .entry(event_type.to_string())
            .or_default()
            .push(subscription);
        trace!(event_type, subscription_id = id, "subscribed");
        id
    }

    /// Returns whether a subscription was removed
    pub fn unsubscribe(
        &self,
        event_type: &str,
        id: SubscriptionId,
    ) -> bool {
        let mut removed = false;
        self.subscriptions.remove_if_mut(event_type, |_, subs| {
            let before = subs.len();
            subs.retain(|s| s.id != id);
            removed = subs.len() != before;
            subs.is_empty()
        });
        if removed {
            trace!(event_type, subscription_id = id, "unsubscribed");
        }
        removed
    }

    /// Handlers for `event_type` followed by the wildcard handlers
    pub fn handlers_for(
        &self,
        event_type: &str,
    ) -> Vec<Arc<dyn EventHandler>> {
        let mut handlers = Vec::new();
        if let Some(subs) = self.subscriptions.get(event_type) {
            handlers.extend(subs.iter().map(|s| s.handler.clone()));
        }
        if event_type != WILDCARD_EVENT_TYPE {
            if let Some(subs) = self.subscriptions.get(WILDCARD_EVENT_TYPE) {
                handlers.extend(subs.iter().map(|s| s.handler.clone()));
            }
        }
        handlers
    }

    /// Remove subscriptions older than `stale_after`. Coarse leak guard;
    /// returns how many were removed.
    pub fn sweep_stale(
        &self,
        stale_after: Duration,
    ) -> usize {
        let cutoff = self.clock.now_ms().saturating_sub(stale_after.as_millis() as u64);
        let event_types: Vec<String> = self.subscriptions.iter().map(|e| e.key().clone()).collect();

        let mut removed = 0;
        for event_type in event_types {
            self.subscriptions.remove_if_mut(&event_type, |_, subs| {
                let before = subs.len();
                subs.retain(|s| s.subscribed_at > cutoff);
                removed += before - subs.len();
                subs.is_empty()
            });
        }
        if removed > 0 {
            debug!(removed, "swept stale subscriptions");
        }
        removed
    }

    /// Total live subscriptions across all event types
    pub fn count(&self) -> usize {
        self.subscriptions.iter().map(|e| e.value().len()).sum()
    }

    pub fn event_types(&self) -> usize {
        self.subscriptions.len()
    }
}

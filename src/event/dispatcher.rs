use std::collections::HashMap;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::DashSet;
use futures::future::join_all;
use futures::FutureExt;
use tracing::debug;
use tracing::error;
use tracing::trace;
use tracing::warn;

use crate::async_task::backoff;
use crate::event_key;
use crate::get_json;
use crate::history_key;
use crate::set_json;
use crate::BackoffPolicy;
use crate::Clock;
use crate::DeliveryOutcome;
use crate::EventConfig;
use crate::GameEvent;
use crate::QueuePhase;
use crate::QueuedEvent;
use crate::Result;
use crate::SubscriptionRegistry;
use crate::VersionedStore;
use crate::EVENTS_DISPATCHED_TOTAL;
use crate::EVENTS_DROPPED_TOTAL;
use crate::HANDLER_FAILURES_TOTAL;

/// Clears a game's drain flag on every exit path, including cancellation
struct DrainFlag<'a> {
    flags: &'a DashSet<String>,
    game_id: &'a str,
}

impl<'a> DrainFlag<'a> {
    fn try_take(
        flags: &'a DashSet<String>,
        game_id: &'a str,
    ) -> Option<Self> {
        flags.insert(game_id.to_string()).then_some(Self { flags, game_id })
    }
}

impl Drop for DrainFlag<'_> {
    fn drop(&mut self) {
        self.flags.remove(self.game_id);
    }
}

/// Per-game FIFO event queues with single-flight draining
///
/// An event stays at the head of its queue until it is persisted, so a drain
/// that is cancelled or fails leaves it for the next trigger. After
/// persistence it is popped before fan-out, so no subscriber sees it twice.
pub struct EventDispatcher {
    store: Arc<dyn VersionedStore>,
    clock: Arc<dyn Clock>,
    subscriptions: Arc<SubscriptionRegistry>,
    config: EventConfig,
    policy: BackoffPolicy,
    queues: DashMap<String, VecDeque<QueuedEvent>>,
    draining: DashSet<String>,
    persisted: AtomicU64,
    dropped: AtomicU64,
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("queues", &self.queues.len())
            .field("draining", &self.draining.len())
            .field("persisted", &self.persisted)
            .field("dropped", &self.dropped)
            .finish_non_exhaustive()
    }
}

impl EventDispatcher {
    pub fn new(
        store: Arc<dyn VersionedStore>,
        clock: Arc<dyn Clock>,
        subscriptions: Arc<SubscriptionRegistry>,
        config: EventConfig,
        policy: BackoffPolicy,
    ) -> Self {
        Self {
            store,
            clock,
            subscriptions,
            config,
            policy,
            queues: DashMap::new(),
            draining: DashSet::new(),
            persisted: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Validate, enqueue and drain `event`'s game.
    ///
    /// Returns once the drain this call triggered has finished, or right
    /// after enqueueing when another drain already owns the game. Only
    /// validation errors are returned; delivery problems are handled inside
    /// the drain.
    pub async fn emit(
        &self,
        event: GameEvent,
    ) -> Result<()> {
        let game_id = event.game_id.clone();
        self.enqueue(event)?;
        self.process_event_queue(&game_id).await;
        Ok(())
    }

    /// Validate and append `event` to its game's queue without draining
    pub fn enqueue(
        &self,
        mut event: GameEvent,
    ) -> Result<()> {
        event.validate()?;
        let now = self.clock.now_ms();
        if event.timestamp == 0 {
            event.timestamp = now;
        }
        trace!(game_id = %event.game_id, event_id = %event.id, event_type = %event.event_type, "event queued");
        let queued = QueuedEvent {
            event: Arc::new(event),
            retry_count: 0,
            queued_at: now,
        };
        self.queues
            .entry(queued.event.game_id.clone())
            .or_default()
            .push_back(queued);
        Ok(())
    }

    /// Drain `game_id`'s queue in FIFO order.
    ///
    /// A call that finds another drain in progress is a no-op. Persistence
    /// failures requeue the head event up to `event_persist.max_retries`
    /// times; after that it is dropped and this drain stops, leaving later
    /// events queued for the next trigger.
    pub async fn process_event_queue(
        &self,
        game_id: &str,
    ) -> Vec<DeliveryOutcome> {
        let mut outcomes = Vec::new();
        loop {
            let Some(flag) = DrainFlag::try_take(&self.draining, game_id) else {
                trace!(game_id, "drain already in progress");
                return outcomes;
            };

            let stopped = self.drain(game_id, &mut outcomes).await;
            self.queues.remove_if(game_id, |_, q| q.is_empty());
            drop(flag);

            // An event enqueued while the flag was being released would
            // otherwise wait for the next emit.
            if stopped || self.queued_len(game_id) == 0 {
                return outcomes;
            }
        }
    }

    /// Returns true when draining stopped on a dropped event
    async fn drain(
        &self,
        game_id: &str,
        outcomes: &mut Vec<DeliveryOutcome>,
    ) -> bool {
        while let Some(head) = self.head(game_id) {
            match self.persist(&head.event).await {
                Ok(()) => {
                    self.pop_head(game_id);
                    self.persisted.fetch_add(1, Ordering::Relaxed);
                    let handlers_failed = self.dispatch(head.event).await;
                    outcomes.push(DeliveryOutcome::Persisted { handlers_failed });
                }
                Err(e) => {
                    let retry_count = self.bump_head_retry(game_id);
                    if retry_count > self.policy.max_retries {
                        self.pop_head(game_id);
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        EVENTS_DROPPED_TOTAL.inc();
                        error!(
                            game_id,
                            event_id = %head.event.id,
                            retry_count,
                            "dropping event after persistence retries: {:?}",
                            e
                        );
                        outcomes.push(DeliveryOutcome::Dropped);
                        return true;
                    }
                    warn!(game_id, event_id = %head.event.id, retry_count, "event persistence failed: {:?}", e);
                    backoff(&self.policy, retry_count - 1).await;
                }
            }
        }
        false
    }

    fn head(
        &self,
        game_id: &str,
    ) -> Option<QueuedEvent> {
        self.queues.get(game_id).and_then(|q| q.front().cloned())
    }

    fn pop_head(
        &self,
        game_id: &str,
    ) {
        if let Some(mut q) = self.queues.get_mut(game_id) {
            q.pop_front();
        }
    }

    fn bump_head_retry(
        &self,
        game_id: &str,
    ) -> u32 {
        self.queues
            .get_mut(game_id)
            .and_then(|mut q| {
                q.front_mut().map(|head| {
                    head.retry_count += 1;
                    head.retry_count
                })
            })
            .unwrap_or(u32::MAX)
    }

    /// Write `event:<id>` and append to the game's bounded history
    async fn persist(
        &self,
        event: &GameEvent,
    ) -> Result<()> {
        let ttl = self.config.event_ttl();
        set_json(self.store.as_ref(), &event_key(&event.id), event, Some(ttl)).await?;

        let key = history_key(&event.game_id);
        let mut history: Vec<GameEvent> = get_json(self.store.as_ref(), &key).await?.unwrap_or_default();
        history.push(event.clone());
        let len = history.len();
        if len > self.config.history_cap {
            history.drain(..len - self.config.history_cap);
        }
        set_json(self.store.as_ref(), &key, &history, Some(ttl)).await
    }

    /// Run every matching handler concurrently; returns how many failed
    async fn dispatch(
        &self,
        event: Arc<GameEvent>,
    ) -> usize {
        let handlers = self.subscriptions.handlers_for(&event.event_type);
        if handlers.is_empty() {
            trace!(event_id = %event.id, event_type = %event.event_type, "no subscribers");
            return 0;
        }

        let calls = handlers.into_iter().map(|handler| {
            let event = event.clone();
            async move { AssertUnwindSafe(handler.handle(event)).catch_unwind().await }
        });

        let mut failed = 0;
        for (index, result) in join_all(calls).await.into_iter().enumerate() {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    failed += 1;
                    warn!(event_id = %event.id, event_type = %event.event_type, handler = index, "event handler failed: {}", e);
                }
                Err(_) => {
                    failed += 1;
                    warn!(event_id = %event.id, event_type = %event.event_type, handler = index, "event handler panicked");
                }
            }
        }

        EVENTS_DISPATCHED_TOTAL.inc();
        HANDLER_FAILURES_TOTAL.inc_by(failed as u64);
        debug!(event_id = %event.id, game_id = %event.game_id, failed, "event dispatched");
        failed
    }

    /// Up to `limit` (default `event.default_history_limit`) most recent
    /// events of `game_id`, oldest first
    pub async fn get_event_history(
        &self,
        game_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<GameEvent>> {
        let limit = limit.unwrap_or(self.config.default_history_limit);
        let mut history: Vec<GameEvent> = get_json(self.store.as_ref(), &history_key(game_id))
            .await?
            .unwrap_or_default();
        let len = history.len();
        if len > limit {
            history.drain(..len - limit);
        }
        Ok(history)
    }

    pub fn queue_phase(
        &self,
        game_id: &str,
    ) -> QueuePhase {
        if self.draining.contains(game_id) {
            QueuePhase::Draining
        } else if self.queued_len(game_id) > 0 {
            QueuePhase::Queued
        } else {
            QueuePhase::Idle
        }
    }

    pub fn queued_len(
        &self,
        game_id: &str,
    ) -> usize {
        self.queues.get(game_id).map_or(0, |q| q.len())
    }

    /// Queued event count per game, games with empty queues omitted
    pub fn queued_events(&self) -> HashMap<String, usize> {
        self.queues
            .iter()
            .filter(|e| !e.value().is_empty())
            .map(|e| (e.key().clone(), e.value().len()))
            .collect()
    }

    pub fn events_persisted(&self) -> u64 {
        self.persisted.load(Ordering::Relaxed)
    }

    pub fn events_dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn subscriptions(&self) -> &Arc<SubscriptionRegistry> {
        &self.subscriptions
    }
}

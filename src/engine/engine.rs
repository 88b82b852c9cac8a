use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::async_task::spawn_task;
use crate::AtomicExecutor;
use crate::AtomicOperation;
use crate::Clock;
use crate::ConcurrencyResult;
use crate::EngineConfig;
use crate::EngineStats;
use crate::EventDispatcher;
use crate::EventHandler;
use crate::GameAction;
use crate::GameEvent;
use crate::GameState;
use crate::LockInfo;
use crate::LockManager;
use crate::Result;
use crate::StateRepository;
use crate::SubscriptionId;
use crate::SubscriptionRegistry;
use crate::VersionedStore;

struct Sweepers {
    shutdown_tx: watch::Sender<()>,
    handles: Vec<JoinHandle<()>>,
}

/// Turn-based game engine
///
/// ## Example
/// ```rust,ignore
/// let engine = GameEngine::new(EngineConfig::new()?.validate()?, store, Arc::new(SystemClock));
/// engine.start();
/// engine.create_game("g1", "lobby", json!({})).await?;
/// let op = AtomicOperation::new("g1", "p1", 0, |s| Ok(s.next_version()));
/// let result = engine.execute_atomic(op).await;
/// engine.stop().await;
/// ```
pub struct GameEngine {
    config: EngineConfig,
    locks: Arc<LockManager>,
    states: StateRepository,
    executor: AtomicExecutor,
    subscriptions: Arc<SubscriptionRegistry>,
    events: EventDispatcher,
    sweepers: Mutex<Option<Sweepers>>,
}

impl std::fmt::Debug for GameEngine {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("GameEngine")
            .field("config", &self.config)
            .field("locks", &self.locks)
            .field("executor", &self.executor)
            .field("events", &self.events)
            .field("running", &self.is_running())
            .finish()
    }
}

impl GameEngine {
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn VersionedStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let locks = Arc::new(LockManager::new(store.clone(), clock.clone(), config.lock.clone()));
        let states = StateRepository::new(store.clone());
        let executor = AtomicExecutor::new(
            locks.clone(),
            states.clone(),
            clock.clone(),
            config.retry.atomic,
            config.game.clone(),
        );
        let subscriptions = Arc::new(SubscriptionRegistry::new(clock.clone()));
        let events = EventDispatcher::new(
            store,
            clock,
            subscriptions.clone(),
            config.event.clone(),
            config.retry.event_persist,
        );

        Self {
            config,
            locks,
            states,
            executor,
            subscriptions,
            events,
            sweepers: Mutex::new(None),
        }
    }

    /// Spawn the lock and subscription sweepers. Calling it on a running
    /// engine does nothing.
    pub fn start(&self) {
        let mut sweepers = self.sweepers.lock();
        if sweepers.is_some() {
            warn!("engine already started");
            return;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(());

        let locks = self.locks.clone();
        let lock_sweeper = spawn_task("lock-sweeper", {
            let period = self.config.lock.sweep_interval();
            let shutdown = shutdown_rx.clone();
            move || run_sweeper("lock-sweeper", period, shutdown, move || locks.sweep_expired())
        });

        let subscriptions = self.subscriptions.clone();
        let stale_after = Duration::from_millis(self.config.event.subscription_stale_after_ms);
        let subscription_sweeper = spawn_task("subscription-sweeper", {
            let period = self.config.event.subscription_sweep_interval();
            move || {
                run_sweeper("subscription-sweeper", period, shutdown_rx, move || {
                    subscriptions.sweep_stale(stale_after)
                })
            }
        });

        *sweepers = Some(Sweepers {
            shutdown_tx,
            handles: vec![lock_sweeper, subscription_sweeper],
        });
        info!("engine started");
    }

    /// Stop the sweepers and wait for them to exit
    pub async fn stop(&self) {
        let Some(Sweepers { shutdown_tx, handles }) = self.sweepers.lock().take() else {
            debug!("engine not running");
            return;
        };
        if shutdown_tx.send(()).is_err() {
            debug!("sweepers already gone");
        }
        for handle in handles {
            if let Err(e) = handle.await {
                error!("sweeper task failed: {:?}", e);
            }
        }
        info!("engine stopped");
    }

    pub fn is_running(&self) -> bool {
        self.sweepers.lock().is_some()
    }

    pub async fn acquire_lock(
        &self,
        game_id: &str,
        holder_id: &str,
        operation: &str,
        ttl: Option<Duration>,
    ) -> Result<LockInfo> {
        self.locks.acquire_lock(game_id, holder_id, operation, ttl).await
    }

    pub async fn release_lock(
        &self,
        lock: &LockInfo,
    ) -> Result<()> {
        self.locks.release_lock(lock).await
    }

    pub async fn create_game(
        &self,
        game_id: &str,
        phase: &str,
        data: Value,
    ) -> Result<GameState> {
        self.executor.create_game(game_id, phase, data).await
    }

    pub async fn get_state(
        &self,
        game_id: &str,
    ) -> Result<Option<GameState>> {
        self.states.load(game_id).await
    }

    pub async fn execute_atomic(
        &self,
        op: AtomicOperation,
    ) -> ConcurrencyResult<GameState> {
        self.executor.execute_atomic(op).await
    }

    pub async fn execute_batch(
        &self,
        game_id: &str,
        actor_id: &str,
        actions: Vec<GameAction>,
    ) -> ConcurrencyResult<GameState> {
        self.executor.execute_batch(game_id, actor_id, actions).await
    }

    /// Run `op` and, only if it committed, emit the event `build_event`
    /// derives from the new state.
    ///
    /// The operation result is returned unchanged; a rejected event is logged
    /// since the state change already stands.
    pub async fn execute_and_emit<F>(
        &self,
        op: AtomicOperation,
        build_event: F,
    ) -> ConcurrencyResult<GameState>
    where
        F: FnOnce(&GameState) -> GameEvent,
    {
        let result = self.executor.execute_atomic(op).await;
        if let Some(state) = result.data() {
            let event = build_event(state);
            if let Err(e) = self.events.emit(event).await {
                error!(game_id = %state.game_id, version = state.version(), "event for committed state rejected: {}", e);
            }
        }
        result
    }

    pub async fn emit(
        &self,
        event: GameEvent,
    ) -> Result<()> {
        self.events.emit(event).await
    }

    pub fn subscribe<H: EventHandler>(
        &self,
        event_type: &str,
        handler: H,
    ) -> SubscriptionId {
        self.subscriptions.subscribe(event_type, handler)
    }

    pub fn unsubscribe(
        &self,
        event_type: &str,
        id: SubscriptionId,
    ) -> bool {
        self.subscriptions.unsubscribe(event_type, id)
    }

    pub async fn get_event_history(
        &self,
        game_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<GameEvent>> {
        self.events.get_event_history(game_id, limit).await
    }

    pub fn get_stats(&self) -> EngineStats {
        EngineStats {
            active_locks: self.locks.active_locks(),
            queued_operations: self.executor.in_flight(),
            queued_events: self.events.queued_events(),
            subscriptions: self.subscriptions.count(),
            events_persisted: self.events.events_persisted(),
            events_dropped: self.events.events_dropped(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn lock_manager(&self) -> &Arc<LockManager> {
        &self.locks
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.events
    }
}

impl Drop for GameEngine {
    fn drop(&mut self) {
        if let Some(sweepers) = self.sweepers.get_mut().take() {
            // tasks exit on their next poll; nobody is left to join them
            let _ = sweepers.shutdown_tx.send(());
        }
    }
}

async fn run_sweeper<F>(
    name: &'static str,
    period: Duration,
    mut shutdown: watch::Receiver<()>,
    sweep: F,
) -> Result<()>
where
    F: Fn() -> usize + Send + 'static,
{
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => {
                debug!("{name} received shutdown signal");
                return Ok(());
            }
            _ = ticker.tick() => {
                let removed = sweep();
                debug!(removed, "{name} pass finished");
            }
        }
    }
}

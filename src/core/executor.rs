use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use nanoid::nanoid;
use serde_json::Value;
use tokio::time::timeout;
use tokio::time::Instant;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::trace;
use tracing::warn;

use crate::async_task::backoff;
use crate::ActionRecord;
use crate::AtomicOperation;
use crate::BackoffPolicy;
use crate::Clock;
use crate::ConcurrencyError;
use crate::ConcurrencyResult;
use crate::Error;
use crate::GameAction;
use crate::GameConfig;
use crate::GameState;
use crate::LockLease;
use crate::LockManager;
use crate::Result;
use crate::StateRepository;
use crate::ATOMIC_OPERATION_DURATION_MS;
use crate::LOCK_CONTENTION_TOTAL;
use crate::VERSION_CONFLICT_TOTAL;

/// Lease holder recorded while a game is being created
const CREATOR_ID: &str = "engine";

/// Why a single locked attempt did not commit
enum AttemptError {
    /// Stored version differs from the expected one; retryable
    Conflict { actual: u64 },
    Failed(Error),
}

impl From<Error> for AttemptError {
    fn from(e: Error) -> Self {
        AttemptError::Failed(e)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Optimistic-concurrency executor
///
/// Each attempt takes the game's lease, checks the stored version against
/// the operation's expectation, runs the transition, verifies the version
/// delta, re-checks the lease and persists. Lease contention and version
/// conflicts are retried with exponential backoff; everything else fails
/// the operation immediately.
pub struct AtomicExecutor {
    locks: Arc<LockManager>,
    states: StateRepository,
    clock: Arc<dyn Clock>,
    policy: BackoffPolicy,
    game: GameConfig,
    in_flight: AtomicUsize,
}

impl std::fmt::Debug for AtomicExecutor {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("AtomicExecutor")
            .field("policy", &self.policy)
            .field("in_flight", &self.in_flight)
            .finish_non_exhaustive()
    }
}

impl AtomicExecutor {
    pub fn new(
        locks: Arc<LockManager>,
        states: StateRepository,
        clock: Arc<dyn Clock>,
        policy: BackoffPolicy,
        game: GameConfig,
    ) -> Self {
        Self {
            locks,
            states,
            clock,
            policy,
            game,
            in_flight: AtomicUsize::new(0),
        }
    }

    /// Operations currently inside `execute_atomic`
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Run `op` under the game's lease with bounded retries.
    ///
    /// The deadline covers lease acquisition, the transition and the fence
    /// check. The state write starts only after that race is won and is
    /// never cut short by it, so a timeout is never reported for a write the
    /// store may have applied.
    pub async fn execute_atomic(
        &self,
        op: AtomicOperation,
    ) -> ConcurrencyResult<GameState> {
        let started = Instant::now();
        let _in_flight = InFlight::enter(&self.in_flight);
        let deadline = op.timeout.unwrap_or_else(|| self.policy.timeout());
        let mut retry_count = 0u32;

        let attempt = timeout(deadline, self.run_attempts(&op, &mut retry_count)).await;
        let result = match attempt {
            Ok(Ok((next, lease))) => match self.commit(next, lease).await {
                Ok(state) => {
                    trace!(
                        game_id = %op.game_id,
                        operation_id = %op.operation_id,
                        version = state.version(),
                        retry_count,
                        "atomic operation committed"
                    );
                    ConcurrencyResult {
                        outcome: Ok(state),
                        retry_count,
                        duration: started.elapsed(),
                    }
                }
                Err(e) => {
                    warn!(game_id = %op.game_id, operation_id = %op.operation_id, "state write failed: {}", e);
                    ConcurrencyResult::failure(&e, retry_count, started.elapsed())
                }
            },
            Ok(Err(e)) => {
                debug!(game_id = %op.game_id, operation_id = %op.operation_id, "atomic operation failed: {}", e);
                ConcurrencyResult::failure(&e, retry_count, started.elapsed())
            }
            Err(_) => {
                warn!(game_id = %op.game_id, operation_id = %op.operation_id, ?deadline, "atomic operation timed out");
                let e: Error = ConcurrencyError::Timeout(deadline).into();
                ConcurrencyResult::failure(&e, retry_count, started.elapsed())
            }
        };

        let outcome = match result.error() {
            None => "success".to_string(),
            Some(e) => e.code.to_string(),
        };
        ATOMIC_OPERATION_DURATION_MS
            .with_label_values(&[outcome.as_str()])
            .observe(result.duration.as_secs_f64() * 1000.0);
        result
    }

    /// Write a fresh game at version 0, turn 0.
    ///
    /// Runs under the game's lease like any other write, so a create racing
    /// another create or a commit can never overwrite a stored state. Fails
    /// with [`ConcurrencyError::GameExists`] if the game is already stored.
    pub async fn create_game(
        &self,
        game_id: &str,
        phase: &str,
        data: Value,
    ) -> Result<GameState> {
        let mut retry_count = 0u32;
        let lease = self
            .acquire_with_backoff(game_id, CREATOR_ID, "create_game", self.policy.max_retries, &mut retry_count)
            .await?;

        let created = self.create_under_lease(game_id, phase, data, &lease).await;
        if let Err(e) = lease.release().await {
            warn!(game_id, "failed to release lease after create: {:?}", e);
        }
        if created.is_ok() {
            info!(game_id, created_at = self.clock.now_ms(), "game created");
        }
        created
    }

    async fn create_under_lease(
        &self,
        game_id: &str,
        phase: &str,
        data: Value,
        lease: &LockLease,
    ) -> Result<GameState> {
        if self.states.exists(game_id).await? {
            return Err(ConcurrencyError::GameExists(game_id.to_string()).into());
        }
        let state = GameState::new(game_id, phase, data);
        self.locks.verify_fence(lease.info()).await?;
        self.states.save(&state).await?;
        Ok(state)
    }

    /// Fold `actions` into one atomic operation: each action advances the
    /// turn and the version by one and is appended to the action history.
    /// Version conflicts retry the whole batch against the fresh version.
    pub async fn execute_batch(
        &self,
        game_id: &str,
        actor_id: &str,
        actions: Vec<GameAction>,
    ) -> ConcurrencyResult<GameState> {
        let started = Instant::now();
        if actions.is_empty() {
            let e: Error = ConcurrencyError::EmptyBatch.into();
            return ConcurrencyResult::failure(&e, 0, started.elapsed());
        }

        let expected_version = match self.states.load(game_id).await {
            Ok(Some(state)) => state.version(),
            Ok(None) => {
                let e: Error = ConcurrencyError::GameNotFound(game_id.to_string()).into();
                return ConcurrencyResult::failure(&e, 0, started.elapsed());
            }
            Err(e) => return ConcurrencyResult::failure(&e, 0, started.elapsed()),
        };

        let increment = actions.len() as u64;
        let actions = Arc::new(actions);
        let actor = actor_id.to_string();
        let clock = self.clock.clone();
        let cap = self.game.action_history_cap;

        let op = AtomicOperation::new(game_id, actor_id, expected_version, move |mut state| {
            for action in actions.iter() {
                state.turn += 1;
                state.metadata.version += 1;
                let record = ActionRecord {
                    action_id: nanoid!(),
                    actor_id: actor.clone(),
                    action_type: action.action_type.clone(),
                    payload: action.payload.clone(),
                    turn: state.turn,
                    timestamp: clock.now_ms(),
                };
                state.record_action(record, cap);
            }
            Ok(state)
        })
        .with_name("batch")
        .with_version_increment(increment)
        .rebase_on_conflict();

        let mut result = self.execute_atomic(op).await;
        result.duration = started.elapsed();
        result
    }

    /// Take the game's lease, backing off on contention while the shared
    /// retry budget lasts
    async fn acquire_with_backoff(
        &self,
        game_id: &str,
        holder_id: &str,
        operation: &str,
        max_retries: u32,
        retry_count: &mut u32,
    ) -> Result<LockLease> {
        loop {
            match self.locks.acquire_lease(game_id, holder_id, operation, None).await {
                Ok(lease) => return Ok(lease),
                Err(e) if e.is_lock_contention() => {
                    LOCK_CONTENTION_TOTAL.inc();
                    if *retry_count >= max_retries {
                        return Err(e);
                    }
                    debug!(game_id, retry = *retry_count, "lock contention, backing off");
                    backoff(&self.policy, *retry_count).await;
                    *retry_count += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Persist a validated state, then release its lease.
    ///
    /// The write runs on its own task: once started it completes even if the
    /// caller stops waiting.
    async fn commit(
        &self,
        next: GameState,
        lease: LockLease,
    ) -> Result<GameState> {
        let states = self.states.clone();
        let game_id = next.game_id.clone();
        let handle = tokio::spawn(async move {
            let saved = states.save(&next).await;
            if let Err(e) = lease.release().await {
                // the lease will lapse through its TTL
                warn!(game_id = %next.game_id, "failed to release lease after write: {:?}", e);
            }
            saved.map(|_| next)
        });
        handle
            .await
            .map_err(|e| Error::Fatal(format!("state write task for {game_id} failed: {e}")))?
    }

    async fn run_attempts(
        &self,
        op: &AtomicOperation,
        retry_count: &mut u32,
    ) -> Result<(GameState, LockLease)> {
        let max_retries = op.max_retries.unwrap_or(self.policy.max_retries);
        let mut expected = op.expected_version;

        loop {
            let lease = self
                .acquire_with_backoff(&op.game_id, &op.actor_id, &op.name, max_retries, retry_count)
                .await?;

            match self.attempt(op, expected, &lease).await {
                Ok(state) => return Ok((state, lease)),
                Err(AttemptError::Conflict { actual }) => {
                    lease.release().await?;
                    VERSION_CONFLICT_TOTAL.inc();
                    if *retry_count >= max_retries {
                        return Err(ConcurrencyError::VersionConflict {
                            expected,
                            actual,
                            retries: *retry_count,
                        }
                        .into());
                    }
                    debug!(
                        game_id = %op.game_id,
                        expected,
                        actual,
                        retry = *retry_count,
                        "version conflict, backing off"
                    );
                    if op.rebase_on_conflict {
                        expected = actual;
                    }
                    backoff(&self.policy, *retry_count).await;
                    *retry_count += 1;
                }
                Err(AttemptError::Failed(e)) => {
                    if let Err(release_err) = lease.release().await {
                        warn!(game_id = %op.game_id, "failed to release lease after error: {:?}", release_err);
                    }
                    return Err(e);
                }
            }
        }
    }

    /// One pass under an acquired lease: returns the validated next state
    /// without writing it. Leaves the lease untouched.
    async fn attempt(
        &self,
        op: &AtomicOperation,
        expected: u64,
        lease: &LockLease,
    ) -> std::result::Result<GameState, AttemptError> {
        let current = self
            .states
            .load(&op.game_id)
            .await?
            .ok_or_else(|| Error::from(ConcurrencyError::GameNotFound(op.game_id.clone())))?;

        let current_version = current.version();
        if current_version != expected {
            return Err(AttemptError::Conflict {
                actual: current_version,
            });
        }
        let current_turn = current.turn;

        let next = (op.transition)(current).await?;

        let want = current_version + op.version_increment;
        if next.version() != want {
            error!(
                game_id = %op.game_id,
                operation_id = %op.operation_id,
                current = current_version,
                expected = want,
                returned = next.version(),
                "transition produced an invalid version increment"
            );
            return Err(Error::from(ConcurrencyError::InvalidVersionIncrement {
                current: current_version,
                expected: want,
                returned: next.version(),
            })
            .into());
        }
        if next.game_id != op.game_id {
            return Err(Error::from(ConcurrencyError::Transition(format!(
                "transition changed game id from {} to {}",
                op.game_id, next.game_id
            )))
            .into());
        }
        if next.turn < current_turn {
            return Err(Error::from(ConcurrencyError::Transition(format!(
                "turn must not decrease ({} -> {})",
                current_turn, next.turn
            )))
            .into());
        }

        self.locks.verify_fence(lease.info()).await?;
        Ok(next)
    }
}

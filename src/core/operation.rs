use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use nanoid::nanoid;

use crate::Error;
use crate::GameState;
use crate::OperationError;
use crate::Result;

pub type TransitionFuture = BoxFuture<'static, Result<GameState>>;

/// State transition run under the game's lease. It may be invoked once per
/// attempt, so it must not assume it runs only once.
pub type Transition = Arc<dyn Fn(GameState) -> TransitionFuture + Send + Sync>;

/// Description of one intended mutation
#[derive(Clone)]
pub struct AtomicOperation {
    pub operation_id: String,
    pub game_id: String,
    pub actor_id: String,
    /// Label recorded on the lease, shown to contenders
    pub name: String,
    pub expected_version: u64,
    /// `None` uses `retry.atomic.max_retries`
    pub max_retries: Option<u32>,
    /// `None` uses `retry.atomic.timeout_ms`
    pub timeout: Option<Duration>,
    /// Exact version delta the transition must produce
    pub version_increment: u64,
    /// On version conflict, retry against the current version instead of
    /// failing the comparison again
    pub rebase_on_conflict: bool,
    pub(crate) transition: Transition,
}

impl fmt::Debug for AtomicOperation {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("AtomicOperation")
            .field("operation_id", &self.operation_id)
            .field("game_id", &self.game_id)
            .field("actor_id", &self.actor_id)
            .field("name", &self.name)
            .field("expected_version", &self.expected_version)
            .field("version_increment", &self.version_increment)
            .finish_non_exhaustive()
    }
}

impl AtomicOperation {
    /// Operation with a synchronous transition
    pub fn new<F>(
        game_id: impl Into<String>,
        actor_id: impl Into<String>,
        expected_version: u64,
        transition: F,
    ) -> Self
    where
        F: Fn(GameState) -> Result<GameState> + Send + Sync + 'static,
    {
        let transition: Transition = Arc::new(move |state| -> TransitionFuture {
            let next = transition(state);
            Box::pin(async move { next })
        });
        Self::with_transition(game_id.into(), actor_id.into(), expected_version, transition)
    }

    /// Operation whose transition performs I/O
    pub fn with_async_transition<F, Fut>(
        game_id: impl Into<String>,
        actor_id: impl Into<String>,
        expected_version: u64,
        transition: F,
    ) -> Self
    where
        F: Fn(GameState) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<GameState>> + Send + 'static,
    {
        let transition: Transition = Arc::new(move |state| -> TransitionFuture { Box::pin(transition(state)) });
        Self::with_transition(game_id.into(), actor_id.into(), expected_version, transition)
    }

    fn with_transition(
        game_id: String,
        actor_id: String,
        expected_version: u64,
        transition: Transition,
    ) -> Self {
        Self {
            operation_id: nanoid!(),
            game_id,
            actor_id,
            name: "atomic".to_string(),
            expected_version,
            max_retries: None,
            timeout: None,
            version_increment: 1,
            rebase_on_conflict: false,
            transition,
        }
    }

    pub fn with_name(
        mut self,
        name: impl Into<String>,
    ) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_max_retries(
        mut self,
        max_retries: u32,
    ) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_timeout(
        mut self,
        timeout: Duration,
    ) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_version_increment(
        mut self,
        increment: u64,
    ) -> Self {
        self.version_increment = increment;
        self
    }

    pub fn rebase_on_conflict(mut self) -> Self {
        self.rebase_on_conflict = true;
        self
    }
}

/// Outcome of an executor call
///
/// Either the new state was durably persisted and `outcome` is `Ok`, or it
/// was not and `outcome` carries the failure.
#[derive(Debug, Clone)]
pub struct ConcurrencyResult<T> {
    pub outcome: std::result::Result<T, OperationError>,
    /// Retries performed after the first attempt
    pub retry_count: u32,
    pub duration: Duration,
}

impl<T> ConcurrencyResult<T> {
    pub(crate) fn failure(
        error: &Error,
        retry_count: u32,
        duration: Duration,
    ) -> Self {
        Self {
            outcome: Err(OperationError::from(error)),
            retry_count,
            duration,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn data(&self) -> Option<&T> {
        self.outcome.as_ref().ok()
    }

    pub fn error(&self) -> Option<&OperationError> {
        self.outcome.as_ref().err()
    }

    pub fn into_result(self) -> std::result::Result<T, OperationError> {
        self.outcome
    }
}

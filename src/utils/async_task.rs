use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::task::JoinHandle;
use tracing::error;

use crate::BackoffPolicy;
use crate::Result;

/// Delay before retry number `attempt` (0-based):
/// `base * 2^attempt`, capped at `max_delay_ms`, plus up to `jitter_ratio` of
/// that value drawn at random.
pub fn backoff_delay(
    policy: &BackoffPolicy,
    attempt: u32,
) -> Duration {
    let exp = policy
        .base_delay_ms
        .saturating_mul(1u64.checked_shl(attempt).unwrap_or(u64::MAX));
    let capped = exp.min(policy.max_delay_ms);

    let max_jitter = (capped as f64 * policy.jitter_ratio) as u64;
    let jitter = if max_jitter > 0 {
        rand::thread_rng().gen_range(0..=max_jitter)
    } else {
        0
    };
    Duration::from_millis(capped + jitter)
}

/// Sleep for the backoff of retry number `attempt`
pub(crate) async fn backoff(
    policy: &BackoffPolicy,
    attempt: u32,
) {
    tokio::time::sleep(backoff_delay(policy, attempt)).await;
}

/// Spawn a named background task, logging its failure
pub(crate) fn spawn_task<F, Fut>(
    name: &str,
    task_fn: F,
) -> JoinHandle<()>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let name = name.to_string();
    tokio::spawn(async move {
        if let Err(e) = task_fn().await {
            error!("spawned task: {name} stopped or encountered an error: {:?}", e);
        }
    })
}

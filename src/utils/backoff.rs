use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tokio::time::timeout;
use tracing::warn;

use crate::BackoffPolicy;
use crate::Error;
use crate::Result;

/// Delay before the next retry, growing exponentially with the number of
/// consecutive failures. Jittered by up to 10% so resyncing nodes do not
/// stampede the store in lockstep.
pub fn delay(retries: usize, policy: &BackoffPolicy) -> Duration {
    if retries == 0 {
        return Duration::from_millis(policy.base_delay_ms);
    }
    let exp = retries.saturating_sub(1).min(16) as u32;
    let raw = policy
        .base_delay_ms
        .saturating_mul(2u64.saturating_pow(exp))
        .min(policy.max_delay_ms);
    let jitter = rand::thread_rng().gen_range(0..=raw / 10 + 1);
    Duration::from_millis(raw + jitter)
}

/// General one
pub(crate) async fn task_with_timeout_and_exponential_backoff<F, T, P>(
    task: F,
    max_retries: usize,
    delay_duration: Duration,
    timeout_duration: Duration,
) -> Result<P>
where
    F: Fn() -> T,                               // The type of the async function
    T: std::future::Future<Output = Result<P>>, // The future returned by the async function
{
    let mut retries = 0;
    let mut delay = delay_duration; // Initial delay
    let mut e = Error::Fatal("Task failed after max retries".to_string());
    while retries < max_retries {
        match timeout(timeout_duration, task()).await {
            Ok(Ok(r)) => {
                return Ok(r); // Exit on success
            }
            Ok(Err(error)) => {
                warn!("failed with error: {:?}", &error);
                e = error;
            }
            Err(error) => {
                warn!("task_with_timeout_and_exponential_backoff timeout: {:?}", &error);
                e = Error::RetryTimeout(timeout_duration);
            }
        };

        retries += 1;
        if retries < max_retries {
            sleep(delay).await;
            delay *= 2; // Exponential backoff (double the delay each time)
        } else {
            warn!("Task failed after {} retries", retries);
        }
    }
    Err(e) // Fallback error message if no task returns Ok
}

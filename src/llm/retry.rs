//! Retry with exponential backoff and jitter around adapter calls.
//!
//! Only transient failures (transport, timeout) are retried; provider
//! rejections surface immediately. The cancellation token is observed before
//! every attempt — an in-flight call completes, but no new attempt starts
//! after cancellation.

use std::time::Duration;

use rand::Rng;
use tracing::warn;

use super::{LlmClient, LlmError, LlmReply};
use crate::control::CancelToken;

/// Retry policy derived from an adapter's [`super::LlmConfig`].
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub timeout: Duration,
    /// First backoff delay; doubles per attempt, capped at 30s.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            timeout: Duration::from_secs(320),
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Backoff before attempt `attempt` (1-based), with up to 25% jitter.
    fn backoff(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.as_millis() as u64 * 2u64.saturating_pow(attempt - 1);
        let capped = exp.min(30_000);
        let jitter = rand::rng().random_range(0..=capped / 4);
        Duration::from_millis(capped + jitter)
    }
}

/// Call `client.generate` (or the temperature variant) under `policy`.
///
/// Returns the first successful reply, or [`LlmError::Exhausted`] once the
/// attempt budget is spent. Each attempt is bounded by the policy timeout.
pub async fn generate_with_retry(
    client: &dyn LlmClient,
    prompt: &str,
    temperature: Option<f64>,
    policy: RetryPolicy,
    cancel: &CancelToken,
) -> Result<LlmReply, LlmError> {
    let mut last_error = String::new();

    for attempt in 0..=policy.max_retries {
        cancel.ensure_active()?;

        if attempt > 0 {
            let delay = policy.backoff(attempt);
            warn!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                "retrying LLM call after backoff"
            );
            tokio::time::sleep(delay).await;
            cancel.ensure_active()?;
        }

        let call = async {
            match temperature {
                Some(t) => client.generate_with_temperature(prompt, t).await,
                None => client.generate(prompt).await,
            }
        };

        let outcome = match tokio::time::timeout(policy.timeout, call).await {
            Ok(result) => result,
            Err(_elapsed) => Err(LlmError::Timeout {
                seconds: policy.timeout.as_secs(),
            }),
        };

        match outcome {
            Ok(reply) => return Ok(reply),
            Err(err) if err.is_transient() => {
                last_error = err.to_string();
                warn!(attempt, error = %last_error, "transient LLM failure");
            }
            Err(err) => return Err(err),
        }
    }

    Err(LlmError::Exhausted {
        attempts: policy.max_retries + 1,
        last_error,
    })
}

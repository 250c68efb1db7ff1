//! Retry for idempotent provider reads. Transactions are never retried.

use std::future::Future;
use std::time::Duration;
use tracing::warn;
use tv_chain_client::ProviderError;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
        }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(1 << (attempt - 1).min(16))
    }
}

/// Network-level failures are worth another attempt; rejections and
/// contract errors are not.
pub fn is_transient(err: &ProviderError) -> bool {
    match err {
        ProviderError::Transport(_) => true,
        ProviderError::Rpc { message, .. } => {
            let message = message.to_lowercase();
            !err.is_user_rejection()
                && !message.contains("user rejected")
                && !message.contains("user denied")
                && (message.contains("network")
                    || message.contains("timeout")
                    || message.contains("rate limit"))
        }
        ProviderError::Unavailable | ProviderError::Decode(_) => false,
    }
}

pub async fn retry_read<T, F, Fut>(
    policy: &RetryPolicy,
    method: &str,
    mut op: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < policy.max_attempts && is_transient(&err) => {
                let delay = policy.delay_for(attempt);
                warn!("{method} attempt {attempt} failed: {err}; retrying in {delay:?}");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn retries_transport_errors_until_success() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = retry_read(&fast(), "eth_call", move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(ProviderError::Transport("connection reset".into()))
            } else {
                Ok(7_u32)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = retry_read(&fast(), "eth_call", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ProviderError::rpc(-32000, "request timeout"))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn never_retries_rejections() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = retry_read(&fast(), "eth_call", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ProviderError::rpc(4001, "User denied network switch"))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}

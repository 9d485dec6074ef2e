use std::future::Future;

use power_tuning_core::config::RetryPolicy;
use power_tuning_core::error::TuningError;
use tracing::warn;

use crate::adapters::function_control::PlatformError;

/// Last error of a retried platform call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryExhausted {
    pub error: PlatformError,
    pub attempts: u32,
}

impl RetryExhausted {
    pub fn into_tuning_error(self, operation: &str, power_value: Option<u32>) -> TuningError {
        TuningError::OperationFailed {
            operation: operation.to_string(),
            power_value,
            attempts: self.attempts,
            message: self.error.to_string(),
        }
    }
}

/// Runs `call` until it succeeds, fails with an error `should_retry` rejects,
/// or the policy's attempts are used up. Delays double after each failure.
pub async fn retry_platform_call<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    should_retry: fn(&PlatformError) -> bool,
    mut call: F,
) -> Result<T, RetryExhausted>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, PlatformError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(error) if attempt < max_attempts && should_retry(&error) => {
                let delay = policy.delay_before_retry(attempt);
                warn!(
                    event = "platform_call_retry",
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                attempt += 1;
            }
            Err(error) => {
                return Err(RetryExhausted {
                    error,
                    attempts: attempt,
                })
            }
        }
    }
}

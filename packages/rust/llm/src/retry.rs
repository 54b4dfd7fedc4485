//! Per-attempt timeout and bounded retry for model-service calls.

use std::future::Future;

use evmanual_shared::{EvManualError, RequestPolicy, Result};
use tracing::warn;

/// Run `call` under `policy`: each attempt gets the policy timeout, and
/// transient failures are retried with exponential backoff.
///
/// Content-level outcomes (including refusals) are successes and never retried.
pub(crate) async fn with_retry<T, F, Fut>(
    policy: &RequestPolicy,
    operation: &str,
    mut call: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        let outcome = match tokio::time::timeout(policy.timeout, call()).await {
            Ok(outcome) => outcome,
            Err(_) => Err(EvManualError::Timeout {
                operation: operation.to_string(),
                after_ms: policy.timeout.as_millis() as u64,
            }),
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.max_retries => {
                attempt += 1;
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Map a reqwest send/body error to the error model.
pub(crate) fn transport_error(context: &str, err: reqwest::Error) -> EvManualError {
    EvManualError::Network(format!("{context}: {err}"))
}

/// Map a non-success response to [`EvManualError::Api`], keeping a bounded body excerpt.
pub(crate) async fn api_error(response: reqwest::Response) -> EvManualError {
    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<body unavailable>".to_string());
    let message: String = body.chars().take(500).collect();
    EvManualError::Api { status, message }
}

//! Retry-with-backoff driver
//!
//! Runs one model until it succeeds, fails fatally, or uses up its attempt
//! budget. Transient failures sleep `base_delay * 2^(n-1)` after attempt `n`;
//! nothing sleeps after the final attempt.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use cognizance_config::RetrySettings;

use crate::backend::{CompletionRequest, GenerationResult, LlmBackend};
use crate::LlmError;

/// Attempt budget and backoff base, shared by every model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Always at least 1
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self::new(settings.max_attempts, settings.base_delay())
    }

    /// Single attempt, no backoff
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Delay after failed attempt `attempt` (1-indexed)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&RetrySettings::default())
    }
}

/// Result of running one model to completion
#[derive(Debug, Clone, PartialEq)]
pub struct RetryOutcome {
    pub result: Result<GenerationResult, LlmError>,
    /// Provider calls made, including the last one
    pub attempts: u32,
}

/// Drives retries against a single backend
#[derive(Clone)]
pub struct RetryDriver {
    backend: Arc<dyn LlmBackend>,
    policy: RetryPolicy,
    /// Extra guard on top of any client-level timeout
    attempt_timeout: Option<Duration>,
}

impl RetryDriver {
    pub fn new(backend: Arc<dyn LlmBackend>, policy: RetryPolicy) -> Self {
        Self {
            backend,
            policy,
            attempt_timeout: None,
        }
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `request.model` until success, fatal error, exhaustion or cancellation
    pub async fn run(
        &self,
        request: &CompletionRequest,
        cancel: &CancellationToken,
    ) -> RetryOutcome {
        let model = request.model.as_str();
        let provider = self.backend.provider_name();
        let max_attempts = self.policy.max_attempts();
        let mut attempt = 0;

        loop {
            if cancel.is_cancelled() {
                return RetryOutcome {
                    result: Err(LlmError::Cancelled),
                    attempts: attempt,
                };
            }

            attempt += 1;
            let result = self.call_once(request, cancel).await;

            let error = match result {
                Ok(generation) => {
                    if generation.is_truncated() {
                        tracing::warn!(
                            provider,
                            model,
                            attempt,
                            "LLM response truncated at the token limit"
                        );
                        metrics::counter!(
                            "cognizance_llm_truncated_total",
                            "model" => request.model.clone()
                        )
                        .increment(1);
                    } else {
                        tracing::debug!(provider, model, attempt, "LLM call succeeded");
                    }
                    return RetryOutcome {
                        result: Ok(generation),
                        attempts: attempt,
                    };
                }
                Err(e) => e,
            };

            if error == LlmError::Cancelled {
                return RetryOutcome {
                    result: Err(error),
                    attempts: attempt,
                };
            }

            if !error.is_transient() {
                tracing::warn!(
                    provider,
                    model,
                    attempt,
                    error = %error,
                    "LLM call failed with non-retryable error"
                );
                return RetryOutcome {
                    result: Err(error),
                    attempts: attempt,
                };
            }

            if attempt >= max_attempts {
                tracing::warn!(provider, model, attempt, error = %error, "LLM retries exhausted");
                return RetryOutcome {
                    result: Err(error),
                    attempts: attempt,
                };
            }

            let delay = self.policy.delay_for(attempt);
            tracing::warn!(
                provider,
                model,
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "LLM call failed, retrying"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return RetryOutcome {
                        result: Err(LlmError::Cancelled),
                        attempts: attempt,
                    };
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn call_once(
        &self,
        request: &CompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerationResult, LlmError> {
        let started = Instant::now();
        let call = self.backend.complete(request);

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(LlmError::Cancelled),
            r = async move {
                match self.attempt_timeout {
                    Some(limit) => tokio::time::timeout(limit, call)
                        .await
                        .unwrap_or(Err(LlmError::Timeout)),
                    None => call.await,
                }
            } => r,
        };

        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.kind(),
        };
        metrics::counter!(
            "cognizance_llm_attempts_total",
            "provider" => self.backend.provider_name().to_string(),
            "model" => request.model.clone(),
            "outcome" => outcome
        )
        .increment(1);
        metrics::histogram!("cognizance_llm_latency_seconds", "model" => request.model.clone())
            .record(started.elapsed().as_secs_f64());

        result
    }
}

//! Ordered multi-model fallback
//!
//! Every request walks the same candidate list from the primary down. Each
//! candidate gets one full retry cycle from [`RetryDriver`]. A fatal error
//! only rules out the model that raised it; cancellation ends the walk.

use tokio_util::sync::CancellationToken;

use cognizance_config::LlmSettings;

use crate::backend::CompletionRequest;
use crate::retry::RetryDriver;
use crate::LlmError;

/// Ordered, non-empty list of model identifiers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelCandidates {
    models: Vec<String>,
}

impl ModelCandidates {
    /// Blank identifiers are dropped; an empty result is an error
    pub fn new<I, S>(models: I) -> Result<Self, LlmError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let models: Vec<String> = models
            .into_iter()
            .map(Into::into)
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .collect();

        if models.is_empty() {
            return Err(LlmError::Configuration(
                "at least one model must be configured".to_string(),
            ));
        }
        Ok(Self { models })
    }

    pub fn single(model: impl Into<String>) -> Result<Self, LlmError> {
        Self::new([model.into()])
    }

    /// Primary followed by the fallbacks
    pub fn from_settings(settings: &LlmSettings) -> Result<Self, LlmError> {
        Self::new(settings.model_candidates())
    }

    pub fn primary(&self) -> &str {
        &self.models[0]
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.models.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Why one candidate could not serve the request
#[derive(Debug, Clone, PartialEq)]
pub struct ModelFailure {
    pub model: String,
    pub error: LlmError,
    pub attempts: u32,
}

/// Result of walking the candidate list
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Success {
        text: String,
        model_used: String,
        /// Provider calls across all candidates tried
        attempts: u32,
    },
    /// One entry per candidate, in candidate order
    Exhausted(Vec<ModelFailure>),
}

impl DispatchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, DispatchOutcome::Success { .. })
    }

    /// Total provider calls made
    pub fn attempts(&self) -> u32 {
        match self {
            DispatchOutcome::Success { attempts, .. } => *attempts,
            DispatchOutcome::Exhausted(failures) => failures.iter().map(|f| f.attempts).sum(),
        }
    }
}

/// Walks [`ModelCandidates`] with a shared [`RetryDriver`]
#[derive(Clone)]
pub struct FallbackDispatcher {
    driver: RetryDriver,
    candidates: ModelCandidates,
}

impl FallbackDispatcher {
    pub fn new(driver: RetryDriver, candidates: ModelCandidates) -> Self {
        Self { driver, candidates }
    }

    pub fn candidates(&self) -> &ModelCandidates {
        &self.candidates
    }

    /// Dispatch over the configured candidates.
    ///
    /// `request.model` is ignored. Returns `Err` only for cancellation.
    pub async fn dispatch(
        &self,
        request: &CompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<DispatchOutcome, LlmError> {
        self.dispatch_with(&self.candidates, request, cancel).await
    }

    /// Dispatch over an explicit candidate list
    pub async fn dispatch_with(
        &self,
        candidates: &ModelCandidates,
        request: &CompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<DispatchOutcome, LlmError> {
        let mut failures = Vec::with_capacity(candidates.len());
        let mut attempts = 0;

        for (index, model) in candidates.iter().enumerate() {
            let outcome = self.driver.run(&request.for_model(model), cancel).await;
            attempts += outcome.attempts;

            match outcome.result {
                Ok(generation) => {
                    if index > 0 {
                        tracing::info!(
                            model,
                            primary = candidates.primary(),
                            attempts,
                            "Served by fallback model"
                        );
                        metrics::counter!(
                            "cognizance_fallbacks_total",
                            "model" => model.to_string()
                        )
                        .increment(1);
                    }
                    return Ok(DispatchOutcome::Success {
                        text: generation.text,
                        model_used: model.to_string(),
                        attempts,
                    });
                }
                Err(LlmError::Cancelled) => {
                    tracing::debug!(model, attempts, "Dispatch cancelled");
                    return Err(LlmError::Cancelled);
                }
                Err(error) => {
                    tracing::warn!(
                        model,
                        error = %error,
                        "Model unavailable, trying next candidate"
                    );
                    failures.push(ModelFailure {
                        model: model.to_string(),
                        error,
                        attempts: outcome.attempts,
                    });
                }
            }
        }

        metrics::counter!("cognizance_exhaustions_total").increment(1);
        Ok(DispatchOutcome::Exhausted(failures))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidates_require_a_model() {
        assert!(ModelCandidates::new(Vec::<String>::new()).is_err());
        assert!(ModelCandidates::new(["", "  "]).is_err());
    }

    #[test]
    fn test_candidates_preserve_order() {
        let candidates =
            ModelCandidates::new(["gemini-2.5-flash", " ", "gemini-2.0-flash"]).unwrap();
        assert_eq!(candidates.primary(), "gemini-2.5-flash");
        assert_eq!(
            candidates.iter().collect::<Vec<_>>(),
            vec!["gemini-2.5-flash", "gemini-2.0-flash"]
        );
    }

    #[test]
    fn test_exhausted_attempt_total() {
        let outcome = DispatchOutcome::Exhausted(vec![
            ModelFailure {
                model: "a".into(),
                error: LlmError::RateLimited("429".into()),
                attempts: 3,
            },
            ModelFailure {
                model: "b".into(),
                error: LlmError::AuthError("401".into()),
                attempts: 1,
            },
        ]);
        assert!(!outcome.is_success());
        assert_eq!(outcome.attempts(), 4);
    }
}

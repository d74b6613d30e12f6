//! Provider error classification
//!
//! Maps the raw signals of a failed provider call onto the [`LlmError`]
//! taxonomy using the rules in [`ClassificationConfig`]. Signals are tried
//! in order of specificity: provider status string, then message text, then
//! HTTP status, then the generic 5xx/4xx split.

use cognizance_config::{ClassificationConfig, ClassificationRule};

use crate::LlmError;

/// Raw signals from a failed provider call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderFailure {
    pub http_status: Option<u16>,
    /// Provider status string, e.g. `RESOURCE_EXHAUSTED`
    pub status: Option<String>,
    pub message: String,
}

impl ProviderFailure {
    pub fn new(http_status: u16, status: Option<String>, message: impl Into<String>) -> Self {
        Self {
            http_status: Some(http_status),
            status,
            message: message.into(),
        }
    }

    fn describe(&self) -> String {
        match (self.http_status, self.status.as_deref()) {
            (Some(code), Some(status)) => format!("HTTP {} {}: {}", code, status, self.message),
            (Some(code), None) => format!("HTTP {}: {}", code, self.message),
            (None, Some(status)) => format!("{}: {}", status, self.message),
            (None, None) => self.message.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bucket {
    Auth,
    ContentPolicy,
    InvalidRequest,
    QuotaExceeded,
    RateLimited,
    ServerOverloaded,
}

/// Rule-driven classifier
#[derive(Debug, Clone, Default)]
pub struct ErrorClassifier {
    config: ClassificationConfig,
}

impl ErrorClassifier {
    pub fn new(config: ClassificationConfig) -> Self {
        Self { config }
    }

    /// Fatal buckets are checked first so an ambiguous message never turns
    /// a hard failure into a retry loop.
    fn rules(&self) -> [(Bucket, &ClassificationRule); 6] {
        [
            (Bucket::Auth, &self.config.auth),
            (Bucket::ContentPolicy, &self.config.content_policy),
            (Bucket::InvalidRequest, &self.config.invalid_request),
            (Bucket::QuotaExceeded, &self.config.quota_exceeded),
            (Bucket::RateLimited, &self.config.rate_limited),
            (Bucket::ServerOverloaded, &self.config.server_overloaded),
        ]
    }

    pub fn classify(&self, failure: &ProviderFailure) -> LlmError {
        let detail = failure.describe();
        match self.bucket_for(failure) {
            Some(Bucket::Auth) => LlmError::AuthError(detail),
            Some(Bucket::ContentPolicy) => LlmError::ContentPolicy(detail),
            Some(Bucket::InvalidRequest) => LlmError::InvalidRequest(detail),
            Some(Bucket::QuotaExceeded) => LlmError::QuotaExceeded(detail),
            Some(Bucket::RateLimited) => LlmError::RateLimited(detail),
            Some(Bucket::ServerOverloaded) => LlmError::ServerOverloaded(detail),
            None => LlmError::InvalidResponse(detail),
        }
    }

    fn bucket_for(&self, failure: &ProviderFailure) -> Option<Bucket> {
        let rules = self.rules();

        if let Some(status) = failure.status.as_deref().filter(|s| !s.is_empty()) {
            if let Some((bucket, _)) = rules.iter().find(|(_, r)| r.matches_status(status)) {
                return Some(*bucket);
            }
        }

        let message = failure.message.to_lowercase();
        if !message.is_empty() {
            if let Some((bucket, _)) = rules.iter().find(|(_, r)| r.matches_message(&message)) {
                return Some(*bucket);
            }
        }

        let code = failure.http_status?;
        if let Some((bucket, _)) = rules.iter().find(|(_, r)| r.matches_http(code)) {
            return Some(*bucket);
        }

        match code {
            500..=599 => Some(Bucket::ServerOverloaded),
            400..=499 => Some(Bucket::InvalidRequest),
            _ => None,
        }
    }
}

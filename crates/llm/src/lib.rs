//! LLM integration with retry and multi-model fallback
//!
//! Features:
//! - Gemini `generateContent` backend
//! - Configurable transient/fatal error classification
//! - Per-model retry with exponential backoff and cancellation
//! - Ordered fallback across model candidates
//! - System prompt assembly from the festival dataset

pub mod backend;
pub mod classify;
pub mod fallback;
pub mod gemini;
pub mod prompt;
pub mod retry;

pub use backend::{CompletionRequest, FinishReason, GenerationResult, LlmBackend};
pub use classify::{ErrorClassifier, ProviderFailure};
pub use fallback::{DispatchOutcome, FallbackDispatcher, ModelCandidates, ModelFailure};
pub use gemini::{GeminiBackend, GeminiConfig};
pub use prompt::PromptBuilder;
pub use retry::{RetryDriver, RetryPolicy};

use thiserror::Error;

/// Whether retrying the same model can help
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Transient,
    Fatal,
}

/// LLM errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Server overloaded: {0}")]
    ServerOverloaded(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timeout")]
    Timeout,

    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Blocked by content policy: {0}")]
    ContentPolicy(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Cancelled")]
    Cancelled,
}

impl LlmError {
    pub fn class(&self) -> ErrorClass {
        match self {
            LlmError::RateLimited(_)
            | LlmError::QuotaExceeded(_)
            | LlmError::ServerOverloaded(_)
            | LlmError::Network(_)
            | LlmError::Timeout => ErrorClass::Transient,
            LlmError::AuthError(_)
            | LlmError::InvalidRequest(_)
            | LlmError::ContentPolicy(_)
            | LlmError::InvalidResponse(_)
            | LlmError::Configuration(_)
            | LlmError::Cancelled => ErrorClass::Fatal,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transient
    }

    /// Short label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            LlmError::RateLimited(_) => "rate_limited",
            LlmError::QuotaExceeded(_) => "quota_exceeded",
            LlmError::ServerOverloaded(_) => "server_overloaded",
            LlmError::Network(_) => "network",
            LlmError::Timeout => "timeout",
            LlmError::AuthError(_) => "auth",
            LlmError::InvalidRequest(_) => "invalid_request",
            LlmError::ContentPolicy(_) => "content_policy",
            LlmError::InvalidResponse(_) => "invalid_response",
            LlmError::Configuration(_) => "configuration",
            LlmError::Cancelled => "cancelled",
        }
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<LlmError> for cognizance_core::Error {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Cancelled => cognizance_core::Error::Cancelled,
            other => cognizance_core::Error::Llm(other.to_string()),
        }
    }
}

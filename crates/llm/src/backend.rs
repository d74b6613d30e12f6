//! Remote completion client boundary
//!
//! A backend performs exactly one provider call. Retries, fallback and
//! cancellation live above it in [`crate::retry`] and [`crate::fallback`].

use async_trait::async_trait;
use cognizance_core::ConversationTurn;

use crate::LlmError;

/// One provider call
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Model identifier, e.g. `gemini-2.5-flash`
    pub model: String,
    pub system_prompt: String,
    /// Chronological turns, the last one being the message to answer
    pub turns: Vec<ConversationTurn>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn new(
        model: impl Into<String>,
        system_prompt: impl Into<String>,
        turns: Vec<ConversationTurn>,
    ) -> Self {
        Self {
            model: model.into(),
            system_prompt: system_prompt.into(),
            turns,
            temperature: cognizance_config::constants::models::TEMPERATURE,
            max_tokens: cognizance_config::constants::models::MAX_TOKENS,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Same payload addressed to another model
    pub fn for_model(&self, model: &str) -> Self {
        Self {
            model: model.to_string(),
            ..self.clone()
        }
    }
}

/// LLM generation result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationResult {
    pub text: String,
    pub finish_reason: FinishReason,
}

impl GenerationResult {
    pub fn stop(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            finish_reason: FinishReason::Stop,
        }
    }

    /// Output stopped at the token budget
    pub fn is_truncated(&self) -> bool {
        self.finish_reason == FinishReason::Length
    }
}

/// Finish reason
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    /// Token budget reached, text is truncated
    Length,
    Other,
}

/// LLM Backend trait
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Perform a single completion call
    async fn complete(&self, request: &CompletionRequest) -> Result<GenerationResult, LlmError>;

    /// Provider name for logs
    fn provider_name(&self) -> &str;
}

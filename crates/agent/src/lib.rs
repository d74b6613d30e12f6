//! Query orchestration for the festival assistant
//!
//! Features:
//! - Conversation summary cache with TTL expiry and periodic sweep
//! - Query orchestrator: history compression, fallback dispatch and
//!   background summary generation

pub mod orchestrator;
pub mod summary_cache;

pub use orchestrator::{
    OrchestratorConfig, QueryOrchestrator, QueryResponse, SkipReason, SummaryEvent,
    MODELS_UNAVAILABLE,
};
pub use summary_cache::{InMemorySummaryCache, SummaryStore};

use thiserror::Error;

/// Agent errors
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Summary cache error: {0}")]
    Cache(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Cancelled")]
    Cancelled,
}

impl From<cognizance_llm::LlmError> for AgentError {
    fn from(err: cognizance_llm::LlmError) -> Self {
        match err {
            cognizance_llm::LlmError::Cancelled => AgentError::Cancelled,
            other => AgentError::Llm(other.to_string()),
        }
    }
}

impl From<AgentError> for cognizance_core::Error {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::InvalidInput(msg) => cognizance_core::Error::InvalidInput(msg),
            AgentError::Cache(msg) => cognizance_core::Error::Cache(msg),
            AgentError::Llm(msg) => cognizance_core::Error::Llm(msg),
            AgentError::Cancelled => cognizance_core::Error::Cancelled,
        }
    }
}

//! Cognizance Assistant Server
//!
//! HTTP surface for the festival assistant: chat, festival info, health and
//! Prometheus metrics, with per-IP rate limiting on the chat route.

pub mod http;
pub mod metrics;
pub mod rate_limit;
pub mod state;

pub use http::{create_router, ChatRequest, ChatResponse};
pub use metrics::{init_metrics, record_request};
pub use rate_limit::{client_ip, RateLimiter};
pub use state::{build_orchestrator, AppState};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use cognizance_agent::AgentError;

/// Message returned with every 429
pub const RATE_LIMIT_MESSAGE: &str =
    "Too many requests. Please slow down and try again in a minute.";

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Rate limit exceeded")]
    RateLimit,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Request deadline exceeded")]
    Timeout,

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ServerError {
    /// Stable code carried in the `error` field of the response body
    pub fn code(&self) -> &'static str {
        match self {
            ServerError::RateLimit => "rate_limited",
            ServerError::InvalidRequest(_) => "invalid_request",
            ServerError::Timeout => "timeout",
            ServerError::Internal(_) | ServerError::Config(_) => "internal_error",
        }
    }

    /// Text safe to show to an end user
    pub fn public_message(&self) -> String {
        match self {
            ServerError::RateLimit => RATE_LIMIT_MESSAGE.to_string(),
            ServerError::InvalidRequest(message) => message.clone(),
            ServerError::Timeout => {
                "The assistant took too long to answer. Please try again.".to_string()
            }
            ServerError::Internal(_) | ServerError::Config(_) => {
                "Something went wrong on our side. Please try again later.".to_string()
            }
        }
    }
}

impl From<ServerError> for StatusCode {
    fn from(err: ServerError) -> Self {
        StatusCode::from(&err)
    }
}

impl From<&ServerError> for StatusCode {
    fn from(err: &ServerError) -> Self {
        match err {
            ServerError::RateLimit => StatusCode::TOO_MANY_REQUESTS,
            ServerError::InvalidRequest(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServerError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ServerError::Internal(_) | ServerError::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<AgentError> for ServerError {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::InvalidInput(message) => ServerError::InvalidRequest(message),
            AgentError::Cancelled => ServerError::Timeout,
            other => ServerError::Internal(other.to_string()),
        }
    }
}

impl From<cognizance_llm::LlmError> for ServerError {
    fn from(err: cognizance_llm::LlmError) -> Self {
        ServerError::Config(err.to_string())
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = StatusCode::from(&self);
        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "Request failed");
        }
        let body = ChatResponse::failure(self.public_message(), self.code());
        (status, Json(body)).into_response()
    }
}

impl From<ServerError> for cognizance_core::Error {
    fn from(err: ServerError) -> Self {
        cognizance_core::Error::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(StatusCode::from(ServerError::RateLimit), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            StatusCode::from(ServerError::InvalidRequest("x".into())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(StatusCode::from(ServerError::Timeout), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            StatusCode::from(ServerError::Internal("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_agent_errors_convert() {
        assert!(matches!(
            ServerError::from(AgentError::Cancelled),
            ServerError::Timeout
        ));
        assert!(matches!(
            ServerError::from(AgentError::InvalidInput("empty".into())),
            ServerError::InvalidRequest(_)
        ));
        assert!(matches!(
            ServerError::from(AgentError::Cache("down".into())),
            ServerError::Internal(_)
        ));
    }

    #[test]
    fn test_internal_detail_not_public() {
        let err = ServerError::Internal("provider said HTTP 500".into());
        assert!(!err.public_message().contains("HTTP 500"));
        assert_eq!(err.code(), "internal_error");
    }
}

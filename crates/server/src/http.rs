//! HTTP Endpoints
//!
//! REST API for the festival assistant.

use axum::{
    extract::{Json, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use cognizance_core::ConversationHistory;

use crate::metrics::{metrics_handler, record_request};
use crate::rate_limit::rate_limit_middleware;
use crate::state::AppState;
use crate::ServerError;

const EMPTY_MESSAGE: &str = "Message must not be empty";

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let server = &state.settings.server;
    let cors_layer = build_cors_layer(
        &server.cors_origins,
        server.cors_enabled,
        server.cors_allow_credentials,
    );

    let chat_route = post(chat).route_layer(middleware::from_fn_with_state(
        state.clone(),
        rate_limit_middleware,
    ));

    Router::new()
        .route("/", get(root))
        .route("/api/v1/chat", chat_route)
        .route("/api/v1/info", get(festival_info))
        .route("/api/v1/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
}

/// Build CORS layer from configured origins
///
/// - `enabled == false` returns a permissive layer (development only)
/// - `"*"` allows any origin and never sends credentials
/// - invalid origins are skipped; if none survive, only localhost:3000 is allowed
fn build_cors_layer(origins: &[String], enabled: bool, allow_credentials: bool) -> CorsLayer {
    if !enabled {
        tracing::warn!("CORS is disabled - allowing all origins (NOT FOR PRODUCTION)");
        return CorsLayer::permissive();
    }

    let base = CorsLayer::new().allow_methods([Method::GET, Method::POST, Method::OPTIONS]);

    if origins.iter().any(|origin| origin.trim() == "*") {
        tracing::info!("CORS configured for any origin");
        return base.allow_origin(Any).allow_headers(Any);
    }

    let mut parsed_origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            origin.trim().parse::<HeaderValue>().ok().or_else(|| {
                tracing::warn!("Invalid CORS origin: {}", origin);
                None
            })
        })
        .collect();

    if parsed_origins.is_empty() {
        tracing::error!("No valid CORS origins configured, falling back to localhost");
        parsed_origins.push(HeaderValue::from_static("http://localhost:3000"));
    }

    tracing::info!("CORS configured with {} origins", parsed_origins.len());
    let layer = base.allow_origin(parsed_origins);
    if allow_credentials {
        // Wildcard headers cannot be combined with credentials
        layer
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
            .allow_credentials(true)
    } else {
        layer.allow_headers(Any)
    }
}

/// Chat request body
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub chat_history: Option<ConversationHistory>,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

/// Chat response body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub success: bool,
    pub response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChatResponse {
    pub fn success(response: impl Into<String>) -> Self {
        Self {
            success: true,
            response: response.into(),
            error: None,
        }
    }

    pub fn failure(response: impl Into<String>, code: &str) -> Self {
        Self {
            success: false,
            response: response.into(),
            error: Some(code.to_string()),
        }
    }
}

/// `POST /api/v1/chat`
async fn chat(State(state): State<AppState>, Json(request): Json<ChatRequest>) -> Response {
    let response = match answer(&state, request).await {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(err) => err.into_response(),
    };
    record_request("chat", response.status());
    response
}

async fn answer(state: &AppState, request: ChatRequest) -> Result<ChatResponse, ServerError> {
    if request.message.trim().is_empty() {
        return Err(ServerError::InvalidRequest(EMPTY_MESSAGE.to_string()));
    }

    let history = request.chat_history.unwrap_or_default();

    // Cancelled on deadline, and when the handler is dropped because the
    // client went away
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    spawn_deadline(cancel.clone(), state.settings.server.request_timeout());

    let result = state
        .orchestrator
        .process_query(
            request.conversation_id.as_deref(),
            &request.message,
            &history,
            &cancel,
        )
        .await?;

    Ok(match result.error {
        None => ChatResponse::success(result.text),
        Some(code) => ChatResponse::failure(result.text, code),
    })
}

fn spawn_deadline(cancel: CancellationToken, deadline: std::time::Duration) {
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(deadline) => {
                tracing::warn!(
                    deadline_secs = deadline.as_secs(),
                    "Chat request deadline exceeded"
                );
                cancel.cancel();
            }
        }
    });
}

/// `GET /`
async fn root(State(state): State<AppState>) -> impl IntoResponse {
    record_request("root", StatusCode::OK);
    let festival = &state.festival;
    Json(serde_json::json!({
        "service": state.settings.app_name,
        "version": env!("CARGO_PKG_VERSION"),
        "description": format!("AI Assistant for {}", festival.edition),
        "endpoints": {
            "chat": "/api/v1/chat",
            "info": "/api/v1/info",
            "health": "/api/v1/health",
            "metrics": "/metrics",
        },
        "festival": {
            "name": festival.festival_name,
            "dates": festival.dates,
            "website": festival.website,
        },
    }))
}

/// `GET /api/v1/info`
async fn festival_info(State(state): State<AppState>) -> impl IntoResponse {
    record_request("info", StatusCode::OK);
    Json(state.festival.as_ref().clone())
}

/// `GET /api/v1/health`
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": state.settings.app_name,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

//! Gemini backend
//!
//! Implements a single non-streaming `models/{model}:generateContent` call.
//! Provider failures are decoded from the `{"error": {...}}` envelope and
//! mapped through [`ErrorClassifier`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use cognizance_config::{ClassificationConfig, LlmSettings};
use cognizance_core::TurnRole;

use crate::backend::{CompletionRequest, FinishReason, GenerationResult, LlmBackend};
use crate::classify::{ErrorClassifier, ProviderFailure};
use crate::LlmError;

/// Finish reasons that mean the output was withheld by a safety filter
const BLOCKED_FINISH_REASONS: &[&str] = &["SAFETY", "PROHIBITED_CONTENT", "BLOCKLIST", "SPII"];

/// Configuration for Gemini backend
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    /// API base, overridable for proxies and tests
    pub endpoint: String,
    pub api_version: String,
    /// Deadline for one call
    pub timeout: Duration,
    pub classification: ClassificationConfig,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint: cognizance_config::constants::endpoints::GEMINI_DEFAULT.to_string(),
            api_version: cognizance_config::constants::endpoints::GEMINI_API_VERSION.to_string(),
            timeout: Duration::from_secs(
                cognizance_config::constants::models::ATTEMPT_TIMEOUT_SECS,
            ),
            classification: ClassificationConfig::default(),
        }
    }
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Default::default()
        }
    }

    pub fn from_settings(settings: &LlmSettings) -> Self {
        Self {
            api_key: settings.api_key.clone().unwrap_or_default(),
            endpoint: settings.endpoint.clone(),
            api_version: settings.api_version.clone(),
            timeout: settings.attempt_timeout(),
            classification: settings.classification.clone(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Gemini `generateContent` client
pub struct GeminiBackend {
    config: GeminiConfig,
    client: Client,
    classifier: ErrorClassifier,
}

impl GeminiBackend {
    pub fn new(config: GeminiConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Configuration(e.to_string()))?;

        let classifier = ErrorClassifier::new(config.classification.clone());

        Ok(Self {
            config,
            client,
            classifier,
        })
    }

    fn api_url(&self, model: &str) -> String {
        format!(
            "{}/{}/models/{}:generateContent",
            self.config.endpoint.trim_end_matches('/'),
            self.config.api_version,
            model
        )
    }

    fn build_request(request: &CompletionRequest) -> GeminiRequest {
        let system_instruction = if request.system_prompt.is_empty() {
            None
        } else {
            Some(GeminiContent {
                role: None,
                parts: vec![GeminiPart {
                    text: Some(request.system_prompt.clone()),
                }],
            })
        };

        let contents = request
            .turns
            .iter()
            .map(|turn| GeminiContent {
                role: Some(
                    match turn.role() {
                        TurnRole::User => "user",
                        TurnRole::Assistant => "model",
                    }
                    .to_string(),
                ),
                parts: vec![GeminiPart {
                    text: Some(turn.content().to_string()),
                }],
            })
            .collect();

        GeminiRequest {
            system_instruction,
            contents,
            generation_config: GeminiGenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens,
            },
        }
    }

    fn parse_response(response: GeminiResponse) -> Result<GenerationResult, LlmError> {
        if let Some(reason) = response
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_deref())
        {
            return Err(LlmError::ContentPolicy(format!("prompt blocked: {}", reason)));
        }

        let candidate = response
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("no candidates in response".to_string()))?;

        let finish = candidate.finish_reason.as_deref().unwrap_or("STOP");
        if BLOCKED_FINISH_REASONS.contains(&finish) {
            return Err(LlmError::ContentPolicy(format!("response blocked: {}", finish)));
        }

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(LlmError::InvalidResponse(format!(
                "empty response (finish reason {})",
                finish
            )));
        }

        let finish_reason = match finish {
            "STOP" => FinishReason::Stop,
            "MAX_TOKENS" => FinishReason::Length,
            _ => FinishReason::Other,
        };

        Ok(GenerationResult {
            text,
            finish_reason,
        })
    }

    fn decode_failure(status: reqwest::StatusCode, body: &str) -> ProviderFailure {
        let envelope: Option<GeminiErrorEnvelope> = serde_json::from_str(body).ok();
        match envelope {
            Some(GeminiErrorEnvelope { error }) => ProviderFailure {
                http_status: Some(error.code.unwrap_or(status.as_u16())),
                status: error.status,
                message: error.message.unwrap_or_default(),
            },
            None => ProviderFailure::new(status.as_u16(), None, body.trim()),
        }
    }
}

#[async_trait]
impl LlmBackend for GeminiBackend {
    async fn complete(&self, request: &CompletionRequest) -> Result<GenerationResult, LlmError> {
        if self.config.api_key.is_empty() {
            return Err(LlmError::AuthError("API key is not configured".to_string()));
        }

        let body = Self::build_request(request);

        let response = self
            .client
            .post(self.api_url(&request.model))
            .header("x-goog-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let failure = Self::decode_failure(status, &error_text);
            return Err(self.classifier.classify(&failure));
        }

        let response: GeminiResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        Self::parse_response(response)
    }

    fn provider_name(&self) -> &str {
        "gemini"
    }
}

// =============================================================================
// Gemini API Types
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    contents: Vec<GeminiContent>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    prompt_feedback: Option<GeminiPromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorEnvelope {
    error: GeminiError,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    #[serde(default)]
    code: Option<u16>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

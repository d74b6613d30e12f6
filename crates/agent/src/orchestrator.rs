//! Query orchestrator
//!
//! Entry point for one chat turn:
//! 1. compress long histories with a cached summary, or schedule one
//! 2. assemble system prompt + history + new message
//! 3. walk the model candidates through the fallback dispatcher
//! 4. turn exhaustion into a single user-facing message
//!
//! Summary generation runs as a detached task with its own cancellation
//! token. It never delays or fails the request that scheduled it.

use std::sync::Arc;

use dashmap::DashSet;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use cognizance_config::Settings;
use cognizance_core::{ConversationHistory, ConversationTurn};
use cognizance_llm::prompt::{summary_turn, SUMMARY_INSTRUCTION};
use cognizance_llm::{CompletionRequest, DispatchOutcome, FallbackDispatcher, ModelCandidates};

use crate::summary_cache::SummaryStore;
use crate::AgentError;

/// Stable error code returned when every model failed
pub const MODELS_UNAVAILABLE: &str = "models_unavailable";

/// Orchestrator configuration, fixed at startup
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub system_prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub support_email: String,
    pub summary_enabled: bool,
    /// Histories longer than this are compressed
    pub summary_threshold: usize,
    /// Turns kept verbatim next to the summary
    pub keep_recent: usize,
    pub summary_model: String,
    pub summary_temperature: f32,
    pub summary_max_tokens: u32,
}

impl OrchestratorConfig {
    pub fn from_settings(settings: &Settings, system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            temperature: settings.llm.temperature,
            max_tokens: settings.llm.max_tokens,
            support_email: settings.support_email.clone(),
            summary_enabled: settings.summary.enabled,
            summary_threshold: settings.summary.threshold_turns,
            keep_recent: settings.summary.keep_recent_turns,
            summary_model: settings.summary.resolve_model(&settings.llm),
            summary_temperature: settings.summary.temperature,
            summary_max_tokens: settings.summary.max_tokens,
        }
    }

    /// Message shown when no model could answer
    pub fn exhaustion_message(&self) -> String {
        format!(
            "All available models are busy right now. Please try again in a few minutes. \
             If the problem continues, contact the Cognizance team at {}.",
            self.support_email
        )
    }
}

/// What the caller gets back for one query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryResponse {
    pub text: String,
    /// Set only on success
    pub model_used: Option<String>,
    /// Stable machine-readable code, set only on failure
    pub error: Option<&'static str>,
}

impl QueryResponse {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Background summarization progress, for logging and tests
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SummaryEvent {
    Stored {
        conversation_id: String,
        model: String,
    },
    Failed {
        conversation_id: String,
        reason: String,
    },
    Skipped {
        conversation_id: String,
        reason: SkipReason,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another task is already summarizing this conversation
    AlreadyRunning,
    /// The model answered with an empty summary
    EmptySummary,
}

/// Clears the in-flight marker however the task ends
struct InFlightGuard {
    in_flight: Arc<DashSet<String>>,
    conversation_id: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.remove(&self.conversation_id);
    }
}

/// Query orchestrator
#[derive(Clone)]
pub struct QueryOrchestrator {
    config: Arc<OrchestratorConfig>,
    dispatcher: FallbackDispatcher,
    cache: Arc<dyn SummaryStore>,
    summary_candidates: ModelCandidates,
    in_flight: Arc<DashSet<String>>,
    event_tx: broadcast::Sender<SummaryEvent>,
    /// Parent of every background task token; cancelled on shutdown
    background: CancellationToken,
}

impl QueryOrchestrator {
    pub fn new(
        config: OrchestratorConfig,
        dispatcher: FallbackDispatcher,
        cache: Arc<dyn SummaryStore>,
    ) -> Result<Self, AgentError> {
        let summary_candidates = ModelCandidates::single(config.summary_model.clone())?;
        let (event_tx, _) = broadcast::channel(100);

        Ok(Self {
            config: Arc::new(config),
            dispatcher,
            cache,
            summary_candidates,
            in_flight: Arc::new(DashSet::new()),
            event_tx,
            background: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Subscribe to background summarization events
    pub fn subscribe(&self) -> broadcast::Receiver<SummaryEvent> {
        self.event_tx.subscribe()
    }

    /// Cancel running background summaries
    pub fn shutdown(&self) {
        self.background.cancel();
    }

    /// Answer `message` given the caller's history.
    ///
    /// Exhaustion is an `Ok` response carrying [`MODELS_UNAVAILABLE`]. `Err`
    /// is reserved for invalid input and cancellation.
    pub async fn process_query(
        &self,
        conversation_id: Option<&str>,
        message: &str,
        history: &ConversationHistory,
        cancel: &CancellationToken,
    ) -> Result<QueryResponse, AgentError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(AgentError::InvalidInput("message must not be empty".to_string()));
        }

        let conversation_id = conversation_id.map(str::trim).filter(|id| !id.is_empty());

        let mut turns = self.prepare_history(conversation_id, history).await;
        turns.push(ConversationTurn::user(message));

        tracing::debug!(
            conversation_id = conversation_id.unwrap_or("-"),
            history_turns = history.len(),
            prompt_turns = turns.len(),
            "Dispatching query"
        );

        let request = CompletionRequest::new(
            self.dispatcher.candidates().primary(),
            self.config.system_prompt.clone(),
            turns,
        )
        .with_temperature(self.config.temperature)
        .with_max_tokens(self.config.max_tokens);

        match self.dispatcher.dispatch(&request, cancel).await? {
            DispatchOutcome::Success {
                text,
                model_used,
                attempts,
            } => {
                tracing::info!(
                    conversation_id = conversation_id.unwrap_or("-"),
                    model = %model_used,
                    attempts,
                    "Query answered"
                );
                Ok(QueryResponse {
                    text,
                    model_used: Some(model_used),
                    error: None,
                })
            }
            DispatchOutcome::Exhausted(failures) => {
                let detail = failures
                    .iter()
                    .map(|f| format!("{} ({} attempts): {}", f.model, f.attempts, f.error))
                    .collect::<Vec<_>>()
                    .join("; ");
                tracing::error!(
                    conversation_id = conversation_id.unwrap_or("-"),
                    models = failures.len(),
                    detail = %detail,
                    "All models exhausted"
                );
                Ok(QueryResponse {
                    text: self.config.exhaustion_message(),
                    model_used: None,
                    error: Some(MODELS_UNAVAILABLE),
                })
            }
        }
    }

    /// History to send for this call.
    ///
    /// Short histories, and calls without a conversation id, go out whole.
    /// On a cache hit the stored summary replaces everything but the last
    /// `keep_recent` turns. The summary is not checked against the history
    /// length, so turns added after it was generated and older than the
    /// recent window are not sent until a new summary covers them. On a miss
    /// the full history goes out and a summary is scheduled.
    async fn prepare_history(
        &self,
        conversation_id: Option<&str>,
        history: &ConversationHistory,
    ) -> Vec<ConversationTurn> {
        let full = || history.turns().to_vec();

        if !self.config.summary_enabled || history.len() <= self.config.summary_threshold {
            return full();
        }

        let Some(conversation_id) = conversation_id else {
            return full();
        };

        let (older, recent) = history.split_recent(self.config.keep_recent);

        match self.cache.get(conversation_id).await {
            Ok(Some(summary)) => {
                metrics::counter!("cognizance_summary_cache_total", "result" => "hit")
                    .increment(1);
                tracing::debug!(
                    conversation_id,
                    replaced_turns = older.len(),
                    "Using cached summary"
                );
                let mut turns = Vec::with_capacity(recent.len() + 2);
                turns.push(summary_turn(&summary));
                turns.extend(recent.iter().cloned());
                turns
            }
            Ok(None) => {
                metrics::counter!("cognizance_summary_cache_total", "result" => "miss")
                    .increment(1);
                self.schedule_summary(conversation_id, older.to_vec());
                full()
            }
            Err(e) => {
                tracing::warn!(conversation_id, error = %e, "Summary cache lookup failed");
                full()
            }
        }
    }

    /// Spawn a detached summarization of `older` unless one is already running
    fn schedule_summary(&self, conversation_id: &str, older: Vec<ConversationTurn>) {
        if !self.in_flight.insert(conversation_id.to_string()) {
            tracing::debug!(conversation_id, "Summary already in progress");
            let _ = self.event_tx.send(SummaryEvent::Skipped {
                conversation_id: conversation_id.to_string(),
                reason: SkipReason::AlreadyRunning,
            });
            return;
        }

        let guard = InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
            conversation_id: conversation_id.to_string(),
        };
        let this = self.clone();
        let cancel = self.background.child_token();

        tokio::spawn(async move {
            let event = this.summarize(&guard.conversation_id, older, &cancel).await;
            match &event {
                SummaryEvent::Stored { conversation_id, model } => {
                    tracing::info!(
                        conversation_id = %conversation_id,
                        model = %model,
                        "Stored conversation summary"
                    );
                }
                SummaryEvent::Failed { conversation_id, reason } => {
                    tracing::warn!(
                        conversation_id = %conversation_id,
                        reason = %reason,
                        "Summary generation failed"
                    );
                }
                SummaryEvent::Skipped { conversation_id, reason } => {
                    tracing::debug!(
                        conversation_id = %conversation_id,
                        reason = ?reason,
                        "Summary skipped"
                    );
                }
            }
            drop(guard);
            let _ = this.event_tx.send(event);
        });
    }

    async fn summarize(
        &self,
        conversation_id: &str,
        mut older: Vec<ConversationTurn>,
        cancel: &CancellationToken,
    ) -> SummaryEvent {
        older.push(ConversationTurn::user(SUMMARY_INSTRUCTION));

        let request = CompletionRequest::new(
            self.summary_candidates.primary(),
            self.config.system_prompt.clone(),
            older,
        )
        .with_temperature(self.config.summary_temperature)
        .with_max_tokens(self.config.summary_max_tokens);

        let failed = |reason: String| SummaryEvent::Failed {
            conversation_id: conversation_id.to_string(),
            reason,
        };

        let outcome = match self
            .dispatcher
            .dispatch_with(&self.summary_candidates, &request, cancel)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => return failed(e.to_string()),
        };

        let (text, model) = match outcome {
            DispatchOutcome::Success {
                text, model_used, ..
            } => (text, model_used),
            DispatchOutcome::Exhausted(failures) => {
                let reason = failures
                    .last()
                    .map(|f| f.error.to_string())
                    .unwrap_or_else(|| "no model available".to_string());
                return failed(reason);
            }
        };

        let summary = text.trim();
        if summary.is_empty() {
            return SummaryEvent::Skipped {
                conversation_id: conversation_id.to_string(),
                reason: SkipReason::EmptySummary,
            };
        }

        match self.cache.put(conversation_id, summary.to_string()).await {
            Ok(()) => SummaryEvent::Stored {
                conversation_id: conversation_id.to_string(),
                model,
            },
            Err(e) => failed(e.to_string()),
        }
    }
}

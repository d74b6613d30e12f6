//! End-to-end orchestrator scenarios with an in-process backend

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use cognizance_agent::orchestrator::{SkipReason, MODELS_UNAVAILABLE};
use cognizance_agent::{
    AgentError, InMemorySummaryCache, OrchestratorConfig, QueryOrchestrator, SummaryEvent,
    SummaryStore,
};
use cognizance_config::Settings;
use cognizance_core::{ConversationHistory, ConversationTurn, TurnRole};
use cognizance_llm::prompt::SUMMARY_INSTRUCTION;
use cognizance_llm::{
    CompletionRequest, FallbackDispatcher, GenerationResult, LlmBackend, LlmError,
    ModelCandidates, RetryDriver, RetryPolicy,
};

const SUMMARY_TEXT: &str =
    "The user is planning to attend the robotics events and asked about registration.";
const ANSWER_TEXT: &str = "Cognizance runs 13th - 15th March 2026.";

type Response = Result<GenerationResult, LlmError>;
type Responder = dyn Fn(&CompletionRequest) -> Response + Send + Sync;

/// Records every request; summary calls are recognised by their final turn
struct RecordingBackend {
    requests: Mutex<Vec<CompletionRequest>>,
    answer: Box<Responder>,
    summary: Box<Responder>,
    summary_delay: Duration,
}

impl RecordingBackend {
    fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            answer: Box::new(|_: &CompletionRequest| Ok(GenerationResult::stop(ANSWER_TEXT))),
            summary: Box::new(|_: &CompletionRequest| {
                Ok(GenerationResult::stop(format!("  {}  ", SUMMARY_TEXT)))
            }),
            summary_delay: Duration::ZERO,
        }
    }

    fn answering(
        mut self,
        f: impl Fn(&CompletionRequest) -> Response + Send + Sync + 'static,
    ) -> Self {
        self.answer = Box::new(f);
        self
    }

    fn summarizing(
        mut self,
        f: impl Fn(&CompletionRequest) -> Response + Send + Sync + 'static,
    ) -> Self {
        self.summary = Box::new(f);
        self
    }

    fn with_summary_delay(mut self, delay: Duration) -> Self {
        self.summary_delay = delay;
        self
    }

    fn main_requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| !is_summary_request(r))
            .cloned()
            .collect()
    }

    fn summary_requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| is_summary_request(r))
            .cloned()
            .collect()
    }
}

fn is_summary_request(request: &CompletionRequest) -> bool {
    request
        .turns
        .last()
        .map_or(false, |t| t.content() == SUMMARY_INSTRUCTION)
}

#[async_trait]
impl LlmBackend for RecordingBackend {
    async fn complete(&self, request: &CompletionRequest) -> Result<GenerationResult, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        if is_summary_request(request) {
            if !self.summary_delay.is_zero() {
                tokio::time::sleep(self.summary_delay).await;
            }
            (self.summary)(request)
        } else {
            (self.answer)(request)
        }
    }

    fn provider_name(&self) -> &str {
        "recording"
    }
}

fn settings() -> Settings {
    let mut settings = Settings::default();
    settings.llm.primary_model = "gemini-2.5-flash".to_string();
    settings.llm.fallback_models = vec![
        "gemini-2.0-flash".to_string(),
        "gemini-1.5-flash".to_string(),
        "gemini-2.0-flash-lite".to_string(),
    ];
    settings.summary.threshold_turns = 20;
    settings.summary.keep_recent_turns = 8;
    settings.support_email = "no-reply.cognizance@iitr.ac.in".to_string();
    settings
}

fn orchestrator(
    backend: Arc<RecordingBackend>,
    cache: Arc<InMemorySummaryCache>,
) -> QueryOrchestrator {
    let settings = settings();
    let driver = RetryDriver::new(backend, RetryPolicy::from_settings(&settings.retry));
    let dispatcher =
        FallbackDispatcher::new(driver, ModelCandidates::from_settings(&settings.llm).unwrap());
    let config = OrchestratorConfig::from_settings(&settings, "You are the festival assistant.");
    QueryOrchestrator::new(config, dispatcher, cache).unwrap()
}

fn long_history(turns: usize) -> ConversationHistory {
    (0..turns)
        .map(|i| {
            if i % 2 == 0 {
                ConversationTurn::user(format!("question {}", i))
            } else {
                ConversationTurn::assistant(format!("answer {}", i))
            }
        })
        .collect()
}

async fn next_event(rx: &mut broadcast::Receiver<SummaryEvent>) -> SummaryEvent {
    tokio::time::timeout(Duration::from_secs(600), rx.recv())
        .await
        .expect("summary event within timeout")
        .expect("event channel open")
}

fn six_hour_cache() -> Arc<InMemorySummaryCache> {
    Arc::new(InMemorySummaryCache::new(Duration::from_secs(6 * 3600)))
}

#[tokio::test(start_paused = true)]
async fn test_long_history_uses_full_history_then_cached_summary() {
    let backend = Arc::new(RecordingBackend::new());
    let cache = six_hour_cache();
    let orchestrator = orchestrator(backend.clone(), cache.clone());
    let mut events = orchestrator.subscribe();
    let cancel = CancellationToken::new();
    let history = long_history(40);

    // Miss: full history goes out, summary is generated in the background
    let first = orchestrator
        .process_query(Some("conv-42"), "How do I register?", &history, &cancel)
        .await
        .unwrap();
    assert!(first.is_success());
    assert_eq!(first.model_used.as_deref(), Some("gemini-2.5-flash"));

    let main = backend.main_requests();
    assert_eq!(main.len(), 1);
    assert_eq!(main[0].turns.len(), 41);
    assert_eq!(main[0].turns[..40], *history.turns());

    assert_eq!(
        next_event(&mut events).await,
        SummaryEvent::Stored {
            conversation_id: "conv-42".to_string(),
            model: "gemini-2.0-flash-lite".to_string(),
        }
    );

    let summary_calls = backend.summary_requests();
    assert_eq!(summary_calls.len(), 1);
    assert_eq!(summary_calls[0].model, "gemini-2.0-flash-lite");
    assert_eq!(summary_calls[0].turns.len(), 32 + 1);
    assert_eq!(summary_calls[0].max_tokens, 200);
    assert_eq!(summary_calls[0].temperature, 0.2);
    assert_eq!(
        cache.get("conv-42").await.unwrap().as_deref(),
        Some(SUMMARY_TEXT)
    );

    // Hit within the TTL: summary turn + last 8 turns + new message
    tokio::time::advance(Duration::from_secs(3600)).await;
    orchestrator
        .process_query(Some("conv-42"), "And the fee?", &history, &cancel)
        .await
        .unwrap();

    let main = backend.main_requests();
    let second = &main[1];
    assert_eq!(second.turns.len(), 1 + 8 + 1);
    assert_eq!(second.turns[0].role(), TurnRole::Assistant);
    assert_eq!(
        second.turns[0].content(),
        format!("Summary of the earlier conversation: {}", SUMMARY_TEXT)
    );
    assert_eq!(second.turns[1..9], history.turns()[32..]);
    assert_eq!(second.turns[9].content(), "And the fee?");
    assert_eq!(backend.summary_requests().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stale_summary_skips_turns_outside_recent_window() {
    let backend = Arc::new(RecordingBackend::new());
    let cache = six_hour_cache();
    let orchestrator = orchestrator(backend.clone(), cache.clone());
    let mut events = orchestrator.subscribe();
    let cancel = CancellationToken::new();

    // Summary generated from turns 0..32 of a 40 turn history
    orchestrator
        .process_query(Some("conv-7"), "first", &long_history(40), &cancel)
        .await
        .unwrap();
    assert!(matches!(next_event(&mut events).await, SummaryEvent::Stored { .. }));

    // Conversation grew to 60 turns while the summary is still live
    let grown = long_history(60);
    orchestrator
        .process_query(Some("conv-7"), "second", &grown, &cancel)
        .await
        .unwrap();

    let main = backend.main_requests();
    let second = &main[1];
    assert_eq!(second.turns.len(), 1 + 8 + 1);
    assert_eq!(
        second.turns[0].content(),
        format!("Summary of the earlier conversation: {}", SUMMARY_TEXT)
    );
    assert_eq!(second.turns[1..9], grown.turns()[52..]);
    for dropped in &grown.turns()[32..52] {
        assert!(
            !second.turns.iter().any(|t| t.content() == dropped.content()),
            "{:?} was sent",
            dropped.content()
        );
    }
    // The cached summary is reused as is, no regeneration
    tokio::task::yield_now().await;
    assert_eq!(backend.summary_requests().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_expired_summary_is_regenerated() {
    let backend = Arc::new(RecordingBackend::new());
    let cache = six_hour_cache();
    let orchestrator = orchestrator(backend.clone(), cache.clone());
    let mut events = orchestrator.subscribe();
    let cancel = CancellationToken::new();
    let history = long_history(30);

    orchestrator
        .process_query(Some("conv"), "hi", &history, &cancel)
        .await
        .unwrap();
    assert!(matches!(next_event(&mut events).await, SummaryEvent::Stored { .. }));

    tokio::time::advance(Duration::from_secs(6 * 3600)).await;

    orchestrator
        .process_query(Some("conv"), "hi again", &history, &cancel)
        .await
        .unwrap();
    assert!(matches!(next_event(&mut events).await, SummaryEvent::Stored { .. }));

    let main = backend.main_requests();
    assert_eq!(main[1].turns.len(), 31);
    assert_eq!(backend.summary_requests().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_short_history_is_passed_through() {
    let backend = Arc::new(RecordingBackend::new());
    let orchestrator = orchestrator(backend.clone(), six_hour_cache());
    let history = long_history(20);

    orchestrator
        .process_query(Some("conv"), "hello", &history, &CancellationToken::new())
        .await
        .unwrap();
    tokio::task::yield_now().await;

    assert_eq!(backend.main_requests()[0].turns.len(), 21);
    assert!(backend.summary_requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_no_conversation_id_means_no_summary() {
    let backend = Arc::new(RecordingBackend::new());
    let cache = six_hour_cache();
    let orchestrator = orchestrator(backend.clone(), cache.clone());
    let history = long_history(40);

    for id in [None, Some("   ")] {
        orchestrator
            .process_query(id, "hello", &history, &CancellationToken::new())
            .await
            .unwrap();
    }
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert!(backend.main_requests().iter().all(|r| r.turns.len() == 41));
    assert!(backend.summary_requests().is_empty());
    assert!(cache.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_one_summary_in_flight_per_conversation() {
    let backend = Arc::new(RecordingBackend::new().with_summary_delay(Duration::from_secs(5)));
    let orchestrator = orchestrator(backend.clone(), six_hour_cache());
    let mut events = orchestrator.subscribe();
    let cancel = CancellationToken::new();
    let history = long_history(40);

    orchestrator
        .process_query(Some("conv"), "first", &history, &cancel)
        .await
        .unwrap();
    orchestrator
        .process_query(Some("conv"), "second", &history, &cancel)
        .await
        .unwrap();

    assert_eq!(
        next_event(&mut events).await,
        SummaryEvent::Skipped {
            conversation_id: "conv".to_string(),
            reason: SkipReason::AlreadyRunning,
        }
    );
    assert!(matches!(next_event(&mut events).await, SummaryEvent::Stored { .. }));
    assert_eq!(backend.summary_requests().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_summary_failure_does_not_affect_answer() {
    let backend = Arc::new(
        RecordingBackend::new().summarizing(|_| Err(LlmError::AuthError("bad key".into()))),
    );
    let cache = six_hour_cache();
    let orchestrator = orchestrator(backend.clone(), cache.clone());
    let mut events = orchestrator.subscribe();
    let history = long_history(40);

    let response = orchestrator
        .process_query(Some("conv"), "hello", &history, &CancellationToken::new())
        .await
        .unwrap();
    assert!(response.is_success());

    assert!(matches!(next_event(&mut events).await, SummaryEvent::Failed { .. }));
    assert!(cache.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_empty_summary_is_not_cached() {
    let backend =
        Arc::new(RecordingBackend::new().summarizing(|_| Ok(GenerationResult::stop("   "))));
    let cache = six_hour_cache();
    let orchestrator = orchestrator(backend.clone(), cache.clone());
    let mut events = orchestrator.subscribe();

    orchestrator
        .process_query(
            Some("conv"),
            "hello",
            &long_history(40),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(
        next_event(&mut events).await,
        SummaryEvent::Skipped {
            conversation_id: "conv".to_string(),
            reason: SkipReason::EmptySummary,
        }
    );
    assert!(cache.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_exhaustion_returns_single_generic_message() {
    let backend = Arc::new(RecordingBackend::new().answering(|request| {
        if request.model == "gemini-1.5-flash" {
            Err(LlmError::AuthError("API key not valid".into()))
        } else {
            Err(LlmError::QuotaExceeded(format!(
                "HTTP 429 RESOURCE_EXHAUSTED: quota for {}",
                request.model
            )))
        }
    }));
    let orchestrator = orchestrator(backend.clone(), six_hour_cache());

    let response = orchestrator
        .process_query(
            None,
            "Tell me about the fest",
            &long_history(4),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(!response.is_success());
    assert_eq!(response.error, Some(MODELS_UNAVAILABLE));
    assert_eq!(response.model_used, None);
    assert_eq!(
        response.text,
        "All available models are busy right now. Please try again in a few minutes. \
         If the problem continues, contact the Cognizance team at no-reply.cognizance@iitr.ac.in."
    );
    for leak in ["429", "RESOURCE_EXHAUSTED", "quota", "API key", "gemini"] {
        assert!(!response.text.contains(leak), "response leaked {:?}", leak);
    }

    // 3 + 3 + 1 + 3 provider calls across the four models
    assert_eq!(backend.main_requests().len(), 10);
}

#[tokio::test(start_paused = true)]
async fn test_empty_message_is_rejected() {
    let backend = Arc::new(RecordingBackend::new());
    let orchestrator = orchestrator(backend.clone(), six_hour_cache());

    let err = orchestrator
        .process_query(None, "  \n", &ConversationHistory::default(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::InvalidInput(_)));
    assert!(backend.main_requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_request_deadline_cancels_dispatch() {
    let backend = Arc::new(
        RecordingBackend::new().answering(|_| Err(LlmError::RateLimited("429".into()))),
    );
    let orchestrator = orchestrator(backend.clone(), six_hour_cache());

    let cancel = CancellationToken::new();
    let deadline = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(2500)).await;
        deadline.cancel();
    });

    let err = orchestrator
        .process_query(None, "hello", &ConversationHistory::default(), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::Cancelled));
    // Attempts at t=0s and t=1s on the primary; cancelled during the 2s backoff
    assert_eq!(backend.main_requests().len(), 2);
}

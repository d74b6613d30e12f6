//! Application State
//!
//! Shared state across all handlers.

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;

use cognizance_agent::{InMemorySummaryCache, OrchestratorConfig, QueryOrchestrator};
use cognizance_config::{festival_context, FestivalInfo, Settings};
use cognizance_llm::{
    FallbackDispatcher, LlmBackend, ModelCandidates, PromptBuilder, RetryDriver, RetryPolicy,
};

use crate::rate_limit::RateLimiter;
use crate::ServerError;

/// Application state
#[derive(Clone)]
pub struct AppState {
    /// Immutable after startup
    pub settings: Arc<Settings>,
    pub orchestrator: QueryOrchestrator,
    pub rate_limiter: Arc<RateLimiter>,
    /// `None` when the Prometheus recorder is not installed
    pub metrics: Option<PrometheusHandle>,
    pub festival: Arc<FestivalInfo>,
}

impl AppState {
    pub fn new(settings: Settings, orchestrator: QueryOrchestrator) -> Self {
        let rate_limiter = Arc::new(RateLimiter::from_config(&settings.rate_limit));
        Self {
            settings: Arc::new(settings),
            orchestrator,
            rate_limiter,
            metrics: None,
            festival: Arc::new(FestivalInfo::cognizance()),
        }
    }

    pub fn with_metrics(mut self, handle: Option<PrometheusHandle>) -> Self {
        self.metrics = handle;
        self
    }
}

/// Wire backend, retry driver, fallback dispatcher and summary cache into
/// an orchestrator.
///
/// The cache is returned so the caller can own its sweep task.
pub fn build_orchestrator(
    settings: &Settings,
    backend: Arc<dyn LlmBackend>,
) -> Result<(QueryOrchestrator, Arc<InMemorySummaryCache>), ServerError> {
    let driver = RetryDriver::new(backend, RetryPolicy::from_settings(&settings.retry))
        .with_attempt_timeout(settings.llm.attempt_timeout());
    let candidates = ModelCandidates::from_settings(&settings.llm)?;
    let primary = candidates.primary().to_string();
    let models = candidates.len();
    let dispatcher = FallbackDispatcher::new(driver, candidates);

    let system_prompt = PromptBuilder::new()
        .with_support_email(settings.support_email.clone())
        .with_context(festival_context())
        .build();

    let cache = Arc::new(InMemorySummaryCache::new(settings.summary.ttl()));
    let orchestrator = QueryOrchestrator::new(
        OrchestratorConfig::from_settings(settings, system_prompt),
        dispatcher,
        cache.clone(),
    )?;

    tracing::info!(
        primary = %primary,
        candidates = models,
        max_attempts = settings.retry.max_attempts,
        summary_model = %orchestrator.config().summary_model,
        "Query orchestrator ready"
    );

    Ok((orchestrator, cache))
}

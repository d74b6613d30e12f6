//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::constants::{contact, endpoints, models, rate_limit, retry, summary};
use crate::ConfigError;

/// Runtime environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    /// Relaxed validation, warnings only
    #[default]
    Development,
    Staging,
    /// All validations enforced
    Production,
}

impl RuntimeEnvironment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Contact address shown when every model is unavailable
    #[serde(default = "default_support_email")]
    pub support_email: String,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub llm: LlmSettings,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub summary: SummarySettings,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

fn default_app_name() -> String {
    contact::APP_NAME.to_string()
}

fn default_support_email() -> String {
    contact::SUPPORT_EMAIL.to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            environment: RuntimeEnvironment::default(),
            app_name: default_app_name(),
            support_email: default_support_email(),
            server: ServerConfig::default(),
            rate_limit: RateLimitConfig::default(),
            llm: LlmSettings::default(),
            retry: RetrySettings::default(),
            summary: SummarySettings::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    #[serde(default = "default_true")]
    pub cors_allow_credentials: bool,

    /// Deadline for one chat request, including every retry and fallback
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_true() -> bool {
    true
}

fn default_cors_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}

fn default_request_timeout() -> u64 {
    60
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_enabled: true,
            cors_origins: default_cors_origins(),
            cors_allow_credentials: true,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Per-IP token bucket on the chat endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Refill rate
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,

    /// Bucket capacity
    #[serde(default = "default_requests_per_minute")]
    pub burst: u32,

    /// Buckets untouched for this long are dropped
    #[serde(default = "default_idle_eviction")]
    pub idle_eviction_secs: u64,

    /// Key buckets on the first `X-Forwarded-For` entry instead of the
    /// socket peer. Only safe behind a proxy that overwrites the header.
    #[serde(default)]
    pub trust_forwarded_for: bool,
}

fn default_requests_per_minute() -> u32 {
    rate_limit::REQUESTS_PER_MINUTE
}

fn default_idle_eviction() -> u64 {
    rate_limit::IDLE_EVICTION_SECS
}

impl RateLimitConfig {
    pub fn idle_eviction(&self) -> Duration {
        Duration::from_secs(self.idle_eviction_secs)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_minute: default_requests_per_minute(),
            burst: default_requests_per_minute(),
            idle_eviction_secs: default_idle_eviction(),
            trust_forwarded_for: false,
        }
    }
}

/// Provider and model list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    /// Falls back to GOOGLE_API_KEY
    #[serde(default = "default_api_key")]
    pub api_key: Option<String>,

    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Always tried first. Falls back to GOOGLE_MODEL
    #[serde(default = "default_primary_model")]
    pub primary_model: String,

    /// Tried in order after the primary. Falls back to GOOGLE_FALLBACK_MODELS
    #[serde(default = "default_fallback_models")]
    pub fallback_models: Vec<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Deadline for a single provider call
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_secs: u64,

    #[serde(default)]
    pub classification: ClassificationConfig,
}

fn default_api_key() -> Option<String> {
    std::env::var("GOOGLE_API_KEY")
        .ok()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
}

fn default_endpoint() -> String {
    endpoints::GEMINI_DEFAULT.to_string()
}

fn default_api_version() -> String {
    endpoints::GEMINI_API_VERSION.to_string()
}

fn default_primary_model() -> String {
    std::env::var("GOOGLE_MODEL")
        .ok()
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| models::PRIMARY.to_string())
}

fn default_fallback_models() -> Vec<String> {
    match std::env::var("GOOGLE_FALLBACK_MODELS") {
        Ok(raw) => split_model_list(&raw),
        Err(_) => models::FALLBACKS.iter().map(|m| m.to_string()).collect(),
    }
}

fn split_model_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .collect()
}

fn default_temperature() -> f32 {
    models::TEMPERATURE
}

fn default_max_tokens() -> u32 {
    models::MAX_TOKENS
}

fn default_attempt_timeout() -> u64 {
    models::ATTEMPT_TIMEOUT_SECS
}

impl LlmSettings {
    /// Primary first, then fallbacks in configured order.
    ///
    /// Blank entries and repeats of an earlier model are skipped so a model
    /// never gets two retry cycles for one request.
    pub fn model_candidates(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::with_capacity(1 + self.fallback_models.len());
        for model in std::iter::once(&self.primary_model).chain(self.fallback_models.iter()) {
            let model = model.trim();
            if model.is_empty() || out.iter().any(|m| m == model) {
                continue;
            }
            out.push(model.to_string());
        }
        out
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            api_key: default_api_key(),
            endpoint: default_endpoint(),
            api_version: default_api_version(),
            primary_model: default_primary_model(),
            fallback_models: default_fallback_models(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            attempt_timeout_secs: default_attempt_timeout(),
            classification: ClassificationConfig::default(),
        }
    }
}

/// One taxonomy bucket: any matching signal selects it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationRule {
    /// Provider status strings, e.g. `RESOURCE_EXHAUSTED`
    #[serde(default)]
    pub statuses: Vec<String>,

    #[serde(default)]
    pub http_codes: Vec<u16>,

    /// Case-insensitive substrings of the provider message
    #[serde(default)]
    pub messages: Vec<String>,
}

impl ClassificationRule {
    fn new(statuses: &[&str], http_codes: &[u16], messages: &[&str]) -> Self {
        Self {
            statuses: statuses.iter().map(|s| s.to_string()).collect(),
            http_codes: http_codes.to_vec(),
            messages: messages.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn matches_status(&self, status: &str) -> bool {
        self.statuses.iter().any(|s| s.eq_ignore_ascii_case(status))
    }

    pub fn matches_http(&self, code: u16) -> bool {
        self.http_codes.contains(&code)
    }

    /// `message` is expected lowercased
    pub fn matches_message(&self, message: &str) -> bool {
        self.messages
            .iter()
            .any(|m| !m.is_empty() && message.contains(&m.to_lowercase()))
    }
}

/// Mapping from provider error signals to the transient/fatal taxonomy.
///
/// Provider error codes change independently of this service, so the
/// mapping is data rather than code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationConfig {
    #[serde(default = "default_rule_rate_limited")]
    pub rate_limited: ClassificationRule,

    #[serde(default = "default_rule_quota_exceeded")]
    pub quota_exceeded: ClassificationRule,

    #[serde(default = "default_rule_server_overloaded")]
    pub server_overloaded: ClassificationRule,

    #[serde(default = "default_rule_auth")]
    pub auth: ClassificationRule,

    #[serde(default = "default_rule_content_policy")]
    pub content_policy: ClassificationRule,

    #[serde(default = "default_rule_invalid_request")]
    pub invalid_request: ClassificationRule,
}

fn default_rule_rate_limited() -> ClassificationRule {
    ClassificationRule::new(&[], &[429], &["rate limit", "too many requests"])
}

fn default_rule_quota_exceeded() -> ClassificationRule {
    ClassificationRule::new(&["RESOURCE_EXHAUSTED"], &[], &["quota"])
}

fn default_rule_server_overloaded() -> ClassificationRule {
    ClassificationRule::new(
        &["UNAVAILABLE", "INTERNAL", "DEADLINE_EXCEEDED"],
        &[500, 502, 503, 504],
        &["overloaded"],
    )
}

fn default_rule_auth() -> ClassificationRule {
    ClassificationRule::new(
        &["UNAUTHENTICATED", "PERMISSION_DENIED"],
        &[401, 403],
        &["api key not valid"],
    )
}

fn default_rule_content_policy() -> ClassificationRule {
    ClassificationRule::new(&[], &[], &["safety", "blocked"])
}

fn default_rule_invalid_request() -> ClassificationRule {
    ClassificationRule::new(
        &["INVALID_ARGUMENT", "FAILED_PRECONDITION", "NOT_FOUND"],
        &[400, 404],
        &[],
    )
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            rate_limited: default_rule_rate_limited(),
            quota_exceeded: default_rule_quota_exceeded(),
            server_overloaded: default_rule_server_overloaded(),
            auth: default_rule_auth(),
            content_policy: default_rule_content_policy(),
            invalid_request: default_rule_invalid_request(),
        }
    }
}

/// Retry-with-backoff settings, shared by every model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the second attempt; doubles after each further attempt
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    retry::MAX_ATTEMPTS
}

fn default_base_delay_ms() -> u64 {
    retry::BASE_DELAY_MS
}

impl RetrySettings {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

/// Conversation summary cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarySettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Histories longer than this are compressed
    #[serde(default = "default_threshold_turns")]
    pub threshold_turns: usize,

    /// Turns sent verbatim next to a cached summary
    #[serde(default = "default_keep_recent_turns")]
    pub keep_recent_turns: usize,

    #[serde(default = "default_summary_ttl")]
    pub ttl_secs: u64,

    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Model used for summaries. Defaults to the last fallback.
    #[serde(default)]
    pub model: Option<String>,

    #[serde(default = "default_summary_temperature")]
    pub temperature: f32,

    #[serde(default = "default_summary_max_tokens")]
    pub max_tokens: u32,
}

fn default_threshold_turns() -> usize {
    summary::THRESHOLD_TURNS
}

fn default_keep_recent_turns() -> usize {
    summary::KEEP_RECENT_TURNS
}

fn default_summary_ttl() -> u64 {
    summary::TTL_SECS
}

fn default_sweep_interval() -> u64 {
    summary::SWEEP_INTERVAL_SECS
}

fn default_summary_temperature() -> f32 {
    summary::TEMPERATURE
}

fn default_summary_max_tokens() -> u32 {
    summary::MAX_TOKENS
}

impl SummarySettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Explicit model, else the cheapest configured fallback, else the primary
    pub fn resolve_model(&self, llm: &LlmSettings) -> String {
        if let Some(model) = self.model.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
            return model.to_string();
        }
        llm.model_candidates()
            .pop()
            .unwrap_or_else(|| llm.primary_model.clone())
    }
}

impl Default for SummarySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold_turns: default_threshold_turns(),
            keep_recent_turns: default_keep_recent_turns(),
            ttl_secs: default_summary_ttl(),
            sweep_interval_secs: default_sweep_interval(),
            model: None,
            temperature: default_summary_temperature(),
            max_tokens: default_summary_max_tokens(),
        }
    }
}

/// Logging and metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_json: bool,

    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            metrics_enabled: true,
        }
    }
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_llm()?;
        self.validate_retry()?;
        self.validate_summary()?;
        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(invalid("server.port", "Port cannot be 0"));
        }

        if self.server.request_timeout_secs == 0 {
            return Err(invalid(
                "server.request_timeout_secs",
                "Timeout must be at least 1 second",
            ));
        }

        if self.rate_limit.enabled {
            if self.rate_limit.requests_per_minute == 0 {
                return Err(invalid(
                    "rate_limit.requests_per_minute",
                    "Must be at least 1 when rate limiting is enabled",
                ));
            }
            if self.rate_limit.burst == 0 {
                return Err(invalid(
                    "rate_limit.burst",
                    "Must be at least 1 when rate limiting is enabled",
                ));
            }
        }

        if self.environment.is_production()
            && self.server.cors_enabled
            && self.server.cors_origins.is_empty()
        {
            tracing::warn!(
                "CORS is enabled in production but no origins are configured. \
                 Browser clients will be rejected."
            );
        }

        Ok(())
    }

    fn validate_llm(&self) -> Result<(), ConfigError> {
        let llm = &self.llm;

        if llm.primary_model.trim().is_empty() {
            return Err(ConfigError::MissingField("llm.primary_model".to_string()));
        }

        check_temperature("llm.temperature", llm.temperature)?;

        if llm.max_tokens == 0 {
            return Err(invalid("llm.max_tokens", "Must be at least 1"));
        }

        if llm.attempt_timeout_secs == 0 {
            return Err(invalid(
                "llm.attempt_timeout_secs",
                "Timeout must be at least 1 second",
            ));
        }

        if llm.api_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
            if self.environment.is_production() {
                return Err(ConfigError::MissingField("llm.api_key".to_string()));
            }
            tracing::warn!("llm.api_key is not set; provider calls will fail with an auth error");
        }

        Ok(())
    }

    fn validate_retry(&self) -> Result<(), ConfigError> {
        if self.retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts", "Must be at least 1"));
        }
        Ok(())
    }

    fn validate_summary(&self) -> Result<(), ConfigError> {
        let summary = &self.summary;

        if summary.keep_recent_turns >= summary.threshold_turns {
            return Err(invalid(
                "summary.keep_recent_turns",
                &format!(
                    "Must be smaller than summary.threshold_turns ({})",
                    summary.threshold_turns
                ),
            ));
        }

        if summary.ttl_secs == 0 {
            return Err(invalid("summary.ttl_secs", "TTL must be at least 1 second"));
        }

        if summary.sweep_interval_secs == 0 {
            return Err(invalid(
                "summary.sweep_interval_secs",
                "Interval must be at least 1 second",
            ));
        }

        check_temperature("summary.temperature", summary.temperature)?;

        if summary.max_tokens == 0 {
            return Err(invalid("summary.max_tokens", "Must be at least 1"));
        }

        Ok(())
    }
}

fn invalid(field: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message: message.to_string(),
    }
}

fn check_temperature(field: &str, value: f32) -> Result<(), ConfigError> {
    if !(0.0..=2.0).contains(&value) {
        return Err(invalid(
            field,
            &format!("Must be between 0.0 and 2.0, got {}", value),
        ));
    }
    Ok(())
}

/// Load settings from `config/` in the working directory and the environment
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    load_settings_from(Path::new("config"), env)
}

/// Load settings from `dir/default.*`, `dir/{env}.*` and `COGNIZANCE__*` variables
pub fn load_settings_from(dir: &Path, env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::from(dir.join("default")).required(false));

    if let Some(env_name) = env {
        builder = builder.add_source(File::from(dir.join(env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("COGNIZANCE")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("llm.fallback_models")
            .with_list_parse_key("server.cors_origins")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn valid_settings() -> Settings {
        let mut settings = Settings::default();
        settings.llm.api_key = Some("test-key".to_string());
        settings.llm.primary_model = "gemini-2.5-flash".to_string();
        settings.llm.fallback_models = vec![
            "gemini-2.0-flash".to_string(),
            "gemini-1.5-flash".to_string(),
            "gemini-2.0-flash-lite".to_string(),
        ];
        settings
    }

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 8000);
        assert_eq!(settings.retry.max_attempts, 3);
        assert_eq!(settings.retry.base_delay(), Duration::from_secs(1));
        assert_eq!(settings.summary.ttl(), Duration::from_secs(6 * 3600));
        assert_eq!(settings.support_email, "no-reply.cognizance@iitr.ac.in");
        assert!(settings.rate_limit.enabled);
        assert!(!settings.rate_limit.trust_forwarded_for);
    }

    #[test]
    fn test_model_candidates_order() {
        let settings = valid_settings();
        assert_eq!(
            settings.llm.model_candidates(),
            vec![
                "gemini-2.5-flash",
                "gemini-2.0-flash",
                "gemini-1.5-flash",
                "gemini-2.0-flash-lite"
            ]
        );
    }

    #[test]
    fn test_model_candidates_skip_blank_and_repeats() {
        let mut settings = valid_settings();
        settings.llm.fallback_models = vec![
            " ".to_string(),
            "gemini-2.5-flash".to_string(),
            "gemini-2.0-flash".to_string(),
            "gemini-2.0-flash".to_string(),
        ];
        assert_eq!(
            settings.llm.model_candidates(),
            vec!["gemini-2.5-flash", "gemini-2.0-flash"]
        );
    }

    #[test]
    fn test_summary_model_resolution() {
        let mut settings = valid_settings();
        assert_eq!(
            settings.summary.resolve_model(&settings.llm),
            "gemini-2.0-flash-lite"
        );

        settings.llm.fallback_models.clear();
        assert_eq!(
            settings.summary.resolve_model(&settings.llm),
            "gemini-2.5-flash"
        );

        settings.summary.model = Some("gemini-1.5-flash".to_string());
        assert_eq!(
            settings.summary.resolve_model(&settings.llm),
            "gemini-1.5-flash"
        );
    }

    #[test]
    fn test_split_model_list() {
        assert_eq!(
            split_model_list("a, b,,c "),
            vec!["a".to_string(), "b".to_string(), "c".to_string()]
        );
        assert!(split_model_list("").is_empty());
    }

    #[test]
    fn test_settings_validation() {
        let settings = valid_settings();
        assert!(settings.validate().is_ok());

        let mut settings = valid_settings();
        settings.llm.primary_model = "  ".to_string();
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::MissingField(_))
        ));

        let mut settings = valid_settings();
        settings.retry.max_attempts = 0;
        assert!(settings.validate().is_err());

        let mut settings = valid_settings();
        settings.server.port = 0;
        assert!(settings.validate().is_err());

        let mut settings = valid_settings();
        settings.summary.ttl_secs = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_summary_window_validation() {
        let mut settings = valid_settings();
        settings.summary.threshold_turns = 8;
        settings.summary.keep_recent_turns = 8;
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("summary.keep_recent_turns"));

        settings.summary.keep_recent_turns = 7;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_temperature_validation() {
        let mut settings = valid_settings();
        settings.llm.temperature = 2.5;
        assert!(settings.validate().is_err());

        settings.llm.temperature = 0.0;
        settings.summary.temperature = -0.1;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_rate_limit_validation() {
        let mut settings = valid_settings();
        settings.rate_limit.requests_per_minute = 0;
        assert!(settings.validate().is_err());

        settings.rate_limit.enabled = false;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_api_key_required_in_production() {
        let mut settings = valid_settings();
        settings.llm.api_key = None;
        assert!(settings.validate().is_ok());

        settings.environment = RuntimeEnvironment::Production;
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::MissingField(field)) if field == "llm.api_key"
        ));
    }

    #[test]
    fn test_classification_rule_matching() {
        let rules = ClassificationConfig::default();
        assert!(rules.quota_exceeded.matches_status("resource_exhausted"));
        assert!(rules.rate_limited.matches_http(429));
        assert!(rules.content_policy.matches_message("response blocked by filter"));
        assert!(!rules.invalid_request.matches_message("anything"));
    }

    #[test]
    fn test_classification_deserializes_partial_override() {
        let yaml = r#"
quota_exceeded:
  statuses: ["RESOURCE_EXHAUSTED", "QUOTA"]
"#;
        let rules: ClassificationConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(rules.quota_exceeded.matches_status("QUOTA"));
        assert!(rules.quota_exceeded.messages.is_empty());
        assert_eq!(rules.auth, ClassificationConfig::default().auth);
    }

    #[test]
    fn test_load_settings_from_files() {
        let dir = tempfile::tempdir().unwrap();

        let mut default_file =
            std::fs::File::create(dir.path().join("default.yaml")).unwrap();
        writeln!(
            default_file,
            concat!(
                "llm:\n  api_key: file-key\n  primary_model: gemini-2.0-flash\n",
                "summary:\n  threshold_turns: 20\n",
            )
        )
        .unwrap();

        let mut staging_file =
            std::fs::File::create(dir.path().join("staging.yaml")).unwrap();
        writeln!(staging_file, "environment: staging\nserver:\n  port: 9100\n").unwrap();

        let settings = load_settings_from(dir.path(), Some("staging")).unwrap();
        assert_eq!(settings.environment, RuntimeEnvironment::Staging);
        assert_eq!(settings.server.port, 9100);
        assert_eq!(settings.llm.primary_model, "gemini-2.0-flash");
        assert_eq!(settings.llm.api_key.as_deref(), Some("file-key"));
        assert_eq!(settings.summary.threshold_turns, 20);
        assert_eq!(settings.summary.keep_recent_turns, 8);
    }

    #[test]
    fn test_load_settings_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("default.yaml")).unwrap();
        writeln!(file, "retry:\n  max_attempts: 0\n").unwrap();

        assert!(load_settings_from(dir.path(), None).is_err());
    }
}

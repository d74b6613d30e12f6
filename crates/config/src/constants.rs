//! Centralized defaults for the assistant
//!
//! Single source of truth for values that appear in more than one place:
//! settings defaults, the system prompt and the exhaustion message.

/// Festival contact details
pub mod contact {
    /// Support address given to users when an issue stays unresolved
    pub const SUPPORT_EMAIL: &str = "no-reply.cognizance@iitr.ac.in";

    pub const APP_NAME: &str = "Cognizance AI Assistant";
}

/// Provider endpoints
pub mod endpoints {
    pub const GEMINI_DEFAULT: &str = "https://generativelanguage.googleapis.com";
    pub const GEMINI_API_VERSION: &str = "v1beta";
}

/// Model defaults
pub mod models {
    pub const PRIMARY: &str = "gemini-2.5-flash";
    pub const FALLBACKS: &[&str] = &[
        "gemini-2.0-flash",
        "gemini-1.5-flash",
        "gemini-2.0-flash-lite",
    ];
    pub const TEMPERATURE: f32 = 0.7;
    pub const MAX_TOKENS: u32 = 2000;
    pub const ATTEMPT_TIMEOUT_SECS: u64 = 30;
}

/// Retry defaults
pub mod retry {
    pub const MAX_ATTEMPTS: u32 = 3;
    pub const BASE_DELAY_MS: u64 = 1000;
}

/// Conversation summary defaults
pub mod summary {
    /// History longer than this triggers summarization
    pub const THRESHOLD_TURNS: usize = 15;
    /// Turns kept verbatim next to a summary
    pub const KEEP_RECENT_TURNS: usize = 8;
    /// Six hours
    pub const TTL_SECS: u64 = 6 * 3600;
    pub const SWEEP_INTERVAL_SECS: u64 = 6000;
    pub const TEMPERATURE: f32 = 0.2;
    pub const MAX_TOKENS: u32 = 200;
}

/// Per-IP rate limit defaults
pub mod rate_limit {
    pub const REQUESTS_PER_MINUTE: u32 = 15;
    pub const IDLE_EVICTION_SECS: u64 = 600;
}

//! Per-IP rate limiting
//!
//! Token bucket per client address: `burst` capacity, refilled at
//! `requests_per_minute / 60` tokens per second. Buckets that stay idle are
//! dropped by a background task.
//!
//! The client address is the socket peer. `X-Forwarded-For` is only read
//! when `trust_forwarded_for` is set, since any caller can write it.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use dashmap::DashMap;
use tokio::sync::watch;
use tokio::time::Instant;

use cognizance_config::RateLimitConfig;

use crate::metrics::record_request;
use crate::state::AppState;
use crate::ServerError;

const UNKNOWN_CLIENT: &str = "unknown";

#[derive(Debug, Clone, Copy)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket limiter keyed by client address
pub struct RateLimiter {
    buckets: DashMap<String, Bucket>,
    capacity: f64,
    refill_per_sec: f64,
    enabled: bool,
    trust_forwarded_for: bool,
}

impl RateLimiter {
    pub fn new(requests_per_minute: u32, burst: u32) -> Self {
        Self {
            buckets: DashMap::new(),
            capacity: f64::from(burst.max(1)),
            refill_per_sec: f64::from(requests_per_minute) / 60.0,
            enabled: true,
            trust_forwarded_for: false,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        let mut limiter = Self::new(config.requests_per_minute, config.burst);
        limiter.enabled = config.enabled;
        limiter.trust_forwarded_for = config.trust_forwarded_for;
        limiter
    }

    /// Key clients on the first `X-Forwarded-For` entry when present
    pub fn with_trusted_forwarded_for(mut self, trusted: bool) -> Self {
        self.trust_forwarded_for = trusted;
        self
    }

    /// Bucket key for a request
    pub fn client_key(&self, headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
        client_ip(headers, peer, self.trust_forwarded_for)
    }

    /// Limiter that admits everything
    pub fn disabled() -> Self {
        let mut limiter = Self::new(0, 1);
        limiter.enabled = false;
        limiter
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Clients currently tracked
    pub fn tracked_clients(&self) -> usize {
        self.buckets.len()
    }

    /// Take one token for `client`, or fail with [`ServerError::RateLimit`]
    pub fn check(&self, client: &str) -> Result<(), ServerError> {
        if !self.enabled {
            return Ok(());
        }

        let now = Instant::now();
        let mut bucket = self.buckets.entry(client.to_string()).or_insert(Bucket {
            tokens: self.capacity,
            last_refill: now,
        });

        let elapsed = now.saturating_duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Ok(())
        } else {
            Err(ServerError::RateLimit)
        }
    }

    /// Drop buckets untouched for at least `idle`, returning how many
    pub fn evict_idle(&self, idle: Duration) -> usize {
        let now = Instant::now();
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| now.saturating_duration_since(bucket.last_refill) < idle);
        before.saturating_sub(self.buckets.len())
    }

    /// Start a background task that evicts idle buckets every `idle` period.
    ///
    /// Returns a shutdown sender; send `true` to stop the task.
    pub fn start_eviction_task(self: &Arc<Self>, idle: Duration) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let limiter = Arc::clone(self);

        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(idle);
            interval_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = interval_timer.tick() => {
                        let evicted = limiter.evict_idle(idle);
                        if evicted > 0 {
                            tracing::debug!(
                                evicted,
                                tracked = limiter.tracked_clients(),
                                "Evicted idle rate limit buckets"
                            );
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            tracing::info!("Rate limit eviction task shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }
}

/// Client address.
///
/// The socket peer, or the first `X-Forwarded-For` entry when
/// `trust_forwarded_for` is set and the header is usable.
pub fn client_ip(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_forwarded_for: bool,
) -> String {
    let forwarded = trust_forwarded_for
        .then(|| headers.get("x-forwarded-for"))
        .flatten()
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());

    match (forwarded, peer) {
        (Some(ip), _) => ip.to_string(),
        (None, Some(addr)) => addr.ip().to_string(),
        (None, None) => UNKNOWN_CLIENT.to_string(),
    }
}

/// Rejects over-limit clients before the handler runs
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client = state.rate_limiter.client_key(request.headers(), peer);

    if let Err(err) = state.rate_limiter.check(&client) {
        tracing::warn!(client_ip = %client, path = %request.uri().path(), "Rate limit exceeded");
        ::metrics::counter!("cognizance_rate_limited_total").increment(1);
        record_request("chat", StatusCode::TOO_MANY_REQUESTS);
        return err.into_response();
    }

    next.run(request).await
}

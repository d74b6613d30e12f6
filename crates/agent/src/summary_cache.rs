//! Conversation summary cache
//!
//! Maps a caller-supplied conversation id to a short generated summary.
//! Entries expire `ttl` after they were written; an expired entry is never
//! returned even if the sweep has not reclaimed it yet.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::AgentError;

/// Storage capability used by the orchestrator.
///
/// The in-memory implementation is the baseline; a networked store can be
/// swapped in without touching the orchestrator.
#[async_trait]
pub trait SummaryStore: Send + Sync {
    /// Fresh summary for `conversation_id`, if any
    async fn get(&self, conversation_id: &str) -> Result<Option<String>, AgentError>;

    /// Replace the summary and restart its TTL
    async fn put(&self, conversation_id: &str, summary: String) -> Result<(), AgentError>;
}

#[derive(Debug, Clone)]
struct CacheEntry {
    summary_text: String,
    created_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.created_at) >= ttl
    }
}

/// Sharded in-process store
///
/// Different conversations land on independent shards, so concurrent
/// requests do not serialize on one lock. Same-key writes are last write wins.
pub struct InMemorySummaryCache {
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
}

impl InMemorySummaryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Entries currently held, expired ones included until swept
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every expired entry, returning how many were removed
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now, self.ttl));
        before.saturating_sub(self.entries.len())
    }

    /// Start a background task that sweeps expired entries every `interval`.
    ///
    /// Returns a shutdown sender; send `true` to stop the task.
    pub fn start_sweep_task(self: &Arc<Self>, interval: Duration) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let cache = Arc::clone(self);

        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(interval);
            interval_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = interval_timer.tick() => {
                        let removed = cache.sweep_expired();
                        if removed > 0 {
                            tracing::info!(
                                removed,
                                remaining = cache.len(),
                                "Summary cache sweep removed expired entries"
                            );
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            tracing::info!("Summary cache sweep task shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }
}

#[async_trait]
impl SummaryStore for InMemorySummaryCache {
    async fn get(&self, conversation_id: &str) -> Result<Option<String>, AgentError> {
        let now = Instant::now();
        let fresh = self
            .entries
            .get(conversation_id)
            .filter(|entry| !entry.is_expired(now, self.ttl))
            .map(|entry| entry.summary_text.clone());

        if fresh.is_none() {
            self.entries
                .remove_if(conversation_id, |_, entry| entry.is_expired(now, self.ttl));
        }

        Ok(fresh)
    }

    async fn put(&self, conversation_id: &str, summary: String) -> Result<(), AgentError> {
        self.entries.insert(
            conversation_id.to_string(),
            CacheEntry {
                summary_text: summary,
                created_at: Instant::now(),
            },
        );
        Ok(())
    }
}

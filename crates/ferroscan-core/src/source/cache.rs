//! In-memory memoisation of grouped daily snapshots.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::source::{DailyBarSource, DailySnapshot, SourceFuture};
use crate::TradeDate;

/// How a lookup interacts with the snapshot cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    /// Serve a live entry when present; otherwise fetch and store. (Default)
    #[default]
    Use,
    /// Always fetch, then overwrite the entry.
    Refresh,
    /// Always fetch; neither read nor write the cache.
    Bypass,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    snapshot: DailySnapshot,
    expires_at: Instant,
}

/// Wraps a [`DailyBarSource`] and memoises snapshots by trading day.
///
/// Repeated scans over overlapping windows hit the upstream once per day
/// while entries live. Failed fetches are never cached.
pub struct CachedDailySource {
    inner: Arc<dyn DailyBarSource>,
    entries: tokio::sync::RwLock<HashMap<TradeDate, CacheEntry>>,
    ttl: Duration,
    mode: CacheMode,
}

impl CachedDailySource {
    pub fn new(inner: Arc<dyn DailyBarSource>, ttl: Duration) -> Self {
        Self {
            inner,
            entries: tokio::sync::RwLock::new(HashMap::new()),
            ttl,
            mode: CacheMode::Use,
        }
    }

    pub fn with_mode(mut self, mode: CacheMode) -> Self {
        self.mode = mode;
        self
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn clear_expired(&self) {
        let now = Instant::now();
        self.entries
            .write()
            .await
            .retain(|_, entry| entry.expires_at > now);
    }

    async fn lookup(&self, date: TradeDate) -> Option<DailySnapshot> {
        let entries = self.entries.read().await;
        entries
            .get(&date)
            .filter(|entry| Instant::now() <= entry.expires_at)
            .map(|entry| entry.snapshot.clone())
    }

    async fn store(&self, snapshot: DailySnapshot) {
        if self.ttl.is_zero() {
            return;
        }
        let expires_at = Instant::now() + self.ttl;
        self.entries.write().await.insert(
            snapshot.date,
            CacheEntry {
                snapshot,
                expires_at,
            },
        );
    }
}

impl DailyBarSource for CachedDailySource {
    fn id(&self) -> &'static str {
        self.inner.id()
    }

    fn grouped_daily<'a>(&'a self, date: TradeDate) -> SourceFuture<'a, DailySnapshot> {
        Box::pin(async move {
            if self.mode == CacheMode::Use {
                if let Some(snapshot) = self.lookup(date).await {
                    tracing::trace!(%date, "grouped daily cache hit");
                    return Ok(snapshot);
                }
            }

            let snapshot = self.inner.grouped_daily(date).await?;
            if self.mode != CacheMode::Bypass {
                self.store(snapshot.clone()).await;
            }
            Ok(snapshot)
        })
    }
}

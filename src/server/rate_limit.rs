//! Per-client fixed-window admission gate
//!
//! Records live behind [`RateLimitStore`] so a multi-instance deployment can swap the
//! in-process map for a shared store. The check-then-increment is a single `hit` call
//! at that boundary.

use axum::http::HeaderMap;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::config::RateLimitConfig;
use crate::storage::debounce::lock;

/// Key used when the client cannot be identified
pub const UNKNOWN_CLIENT: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRecord {
    pub count: u32,
    pub window_reset_at: Instant,
}

/// Storage for rate-limit records
pub trait RateLimitStore: Send + Sync {
    /// Admit or deny one request from `key`, updating its record atomically
    fn hit(&self, key: &str, now: Instant, window: Duration, max_requests: u32) -> bool;

    /// Drop records whose window has ended; returns how many were removed
    fn purge_expired(&self, now: Instant) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Process-local record map; state is lost on restart
#[derive(Default)]
pub struct MemoryRateLimitStore {
    records: Mutex<HashMap<String, RateLimitRecord>>,
}

impl MemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, key: &str) -> Option<RateLimitRecord> {
        lock(&self.records).get(key).copied()
    }
}

impl RateLimitStore for MemoryRateLimitStore {
    fn hit(&self, key: &str, now: Instant, window: Duration, max_requests: u32) -> bool {
        let mut records = lock(&self.records);
        match records.get_mut(key) {
            Some(record) if now < record.window_reset_at => {
                if record.count >= max_requests {
                    return false;
                }
                record.count += 1;
                true
            }
            _ => {
                records.insert(
                    key.to_string(),
                    RateLimitRecord { count: 1, window_reset_at: now + window },
                );
                true
            }
        }
    }

    fn purge_expired(&self, now: Instant) -> usize {
        let mut records = lock(&self.records);
        let before = records.len();
        records.retain(|_, record| now < record.window_reset_at);
        before - records.len()
    }

    fn len(&self) -> usize {
        lock(&self.records).len()
    }
}

pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    window: Duration,
    max_requests: u32,
}

impl RateLimiter {
    /// In-memory limiter from configuration
    pub fn new(config: &RateLimitConfig) -> Self {
        Self::with_store(
            Arc::new(MemoryRateLimitStore::new()),
            Duration::from_millis(config.window_ms),
            config.max_requests,
        )
    }

    pub fn with_store(store: Arc<dyn RateLimitStore>, window: Duration, max_requests: u32) -> Self {
        Self { store, window, max_requests }
    }

    pub fn allow(&self, client_key: &str) -> bool {
        self.allow_at(client_key, Instant::now())
    }

    pub fn allow_at(&self, client_key: &str, now: Instant) -> bool {
        let allowed = self.store.hit(client_key, now, self.window, self.max_requests);
        if !allowed {
            debug!(client = client_key, "Rate limit exceeded");
        }
        allowed
    }

    pub fn purge_expired(&self) -> usize {
        self.store.purge_expired(Instant::now())
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn tracked_clients(&self) -> usize {
        self.store.len()
    }
}

/// Periodically purge expired records, once per window
pub fn spawn_sweeper(limiter: Arc<RateLimiter>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(limiter.window());
        // First tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let purged = limiter.purge_expired();
            if purged > 0 {
                debug!(purged, remaining = limiter.tracked_clients(), "Purged expired rate-limit records");
            }
        }
    })
}

/// First forwarded-for address, else the real-IP header, else [`UNKNOWN_CLIENT`]
pub fn client_key(headers: &HeaderMap) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    forwarded
        .or_else(real_ip)
        .unwrap_or(UNKNOWN_CLIENT)
        .to_string()
}

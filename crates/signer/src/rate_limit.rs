//! # Rate Limiting Module
//!
//! Token bucket rate limiter di depan endpoint signer.
//!
//! ## Prinsip
//!
//! - Thread-safe menggunakan parking_lot RwLock
//! - Token bucket dengan refill deterministik berdasarkan elapsed time
//! - Per-IP dan global limiting
//! - Jumlah bucket dibatasi: bucket yang sudah penuh kembali dibuang,
//!   dan key baru ditolak selama tabel masih penuh
//! - Header `x-forwarded-for` / `x-real-ip` hanya dipakai jika dipercaya;
//!   default-nya alamat peer TCP (`ConnectInfo`)
//!
//! Ini hanya perlindungan terhadap flood request. Keamanan replay ada di
//! nonce/cooldown milik verifier.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::DEFAULT_RATE_LIMIT_MAX_TRACKED_KEYS;
use crate::error::ApiError;
use crate::metrics::SignerMetrics;

/// Retry hint when the bucket table is saturated with active keys.
pub const SATURATED_RETRY_AFTER_MS: u64 = 1000;

// ════════════════════════════════════════════════════════════════════════════
// RATE LIMIT KEY
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitKey {
    /// Per client IP.
    Ip,
    /// Semua request.
    Global,
}

impl RateLimitKey {
    pub fn extract(&self, ip: Option<&str>) -> String {
        match self {
            RateLimitKey::Ip => format!("ip:{}", ip.unwrap_or("unknown")),
            RateLimitKey::Global => "global".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateLimitError {
    #[error("rate limit exceeded for {key}, retry after {retry_after_ms}ms")]
    LimitExceeded { key: String, retry_after_ms: u64 },
}

// ════════════════════════════════════════════════════════════════════════════
// LIMIT CONFIG
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct LimitConfig {
    pub requests_per_second: u32,
    pub burst_size: u32,
    pub by: RateLimitKey,
}

impl LimitConfig {
    pub fn per_ip(requests_per_second: u32, burst_size: u32) -> Self {
        Self {
            requests_per_second,
            burst_size,
            by: RateLimitKey::Ip,
        }
    }

    pub fn global(requests_per_second: u32, burst_size: u32) -> Self {
        Self {
            requests_per_second,
            burst_size,
            by: RateLimitKey::Global,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// TOKEN BUCKET
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
struct TokenBucket {
    tokens: f64,
    last_refill_ms: u64,
    /// Tokens per millisecond.
    refill_rate: f64,
    max_tokens: f64,
}

impl TokenBucket {
    fn new(config: &LimitConfig, now_ms: u64) -> Self {
        Self {
            tokens: config.burst_size as f64,
            last_refill_ms: now_ms,
            refill_rate: config.requests_per_second as f64 / 1000.0,
            max_tokens: config.burst_size as f64,
        }
    }

    fn refill(&mut self, now_ms: u64) {
        if now_ms <= self.last_refill_ms {
            return;
        }
        let elapsed_ms = now_ms - self.last_refill_ms;
        self.tokens = (self.tokens + elapsed_ms as f64 * self.refill_rate).min(self.max_tokens);
        self.last_refill_ms = now_ms;
    }

    fn try_consume(&mut self, now_ms: u64) -> bool {
        self.refill(now_ms);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// A full bucket is indistinguishable from a fresh one.
    fn is_idle(&mut self, now_ms: u64) -> bool {
        self.refill(now_ms);
        self.tokens >= self.max_tokens
    }

    fn retry_after_ms(&self) -> u64 {
        if self.tokens >= 1.0 {
            return 0;
        }
        if self.refill_rate > 0.0 {
            ((1.0 - self.tokens) / self.refill_rate).ceil() as u64
        } else {
            u64::MAX
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// RATE LIMITER
// ════════════════════════════════════════════════════════════════════════════

/// Thread-safe rate limiter.
pub struct RateLimiter {
    limits: Vec<(String, LimitConfig)>,
    counters: RwLock<HashMap<String, TokenBucket>>,
    max_tracked_keys: usize,
    trust_forwarded_headers: bool,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            limits: Vec::new(),
            counters: RwLock::new(HashMap::new()),
            max_tracked_keys: DEFAULT_RATE_LIMIT_MAX_TRACKED_KEYS,
            trust_forwarded_headers: false,
        }
    }

    /// Per-IP plus global limit.
    pub fn with_limits(per_ip: LimitConfig, global: LimitConfig) -> Self {
        let mut limiter = Self::new();
        limiter.add_limit("per_ip", per_ip);
        limiter.add_limit("global", global);
        limiter
    }

    pub fn with_max_tracked_keys(mut self, max: usize) -> Self {
        self.max_tracked_keys = max.max(1);
        self
    }

    pub fn with_trusted_forwarding(mut self, trust: bool) -> Self {
        self.trust_forwarded_headers = trust;
        self
    }

    pub fn trusts_forwarded_headers(&self) -> bool {
        self.trust_forwarded_headers
    }

    pub fn add_limit(&mut self, name: &str, config: LimitConfig) {
        self.limits.retain(|(n, _)| n != name);
        self.limits.push((name.to_string(), config));
    }

    /// Check and consume atomically under one write lock.
    ///
    /// A new per-IP key is only admitted while the table has room. When it
    /// is full, idle buckets are pruned first; if none are idle the request
    /// is rejected. The global key is never subject to the cap.
    pub fn check_and_record_at(
        &self,
        key: &str,
        config: &LimitConfig,
        now_ms: u64,
    ) -> Result<(), RateLimitError> {
        let mut counters = self.counters.write();

        if config.by != RateLimitKey::Global
            && !counters.contains_key(key)
            && counters.len() >= self.max_tracked_keys
        {
            let pruned = prune_idle(&mut counters, now_ms);
            if counters.len() >= self.max_tracked_keys {
                warn!(
                    key = %key,
                    tracked = counters.len(),
                    "rate limit table saturated, rejecting new key"
                );
                return Err(RateLimitError::LimitExceeded {
                    key: key.to_string(),
                    retry_after_ms: SATURATED_RETRY_AFTER_MS,
                });
            }
            debug!(pruned, "idle rate limit buckets pruned");
        }

        let bucket = counters
            .entry(key.to_string())
            .or_insert_with(|| TokenBucket::new(config, now_ms));

        if bucket.try_consume(now_ms) {
            Ok(())
        } else {
            Err(RateLimitError::LimitExceeded {
                key: key.to_string(),
                retry_after_ms: bucket.retry_after_ms(),
            })
        }
    }

    /// Check every configured limit, in insertion order.
    pub fn check_all_at(&self, ip: Option<&str>, now_ms: u64) -> Result<(), RateLimitError> {
        for (name, config) in &self.limits {
            let key = config.by.extract(ip);
            self.check_and_record_at(&key, config, now_ms)?;
            debug!(limit_name = %name, key = %key, "rate limit check passed");
        }
        Ok(())
    }

    pub fn check_all(&self, ip: Option<&str>) -> Result<(), RateLimitError> {
        self.check_all_at(ip, current_timestamp_ms())
    }

    pub fn tracked_keys(&self) -> usize {
        self.counters.read().len()
    }

    /// Drop every bucket that has refilled completely. Returns the count.
    pub fn prune_idle_at(&self, now_ms: u64) -> usize {
        prune_idle(&mut self.counters.write(), now_ms)
    }
}

fn prune_idle(counters: &mut HashMap<String, TokenBucket>, now_ms: u64) -> usize {
    let before = counters.len();
    counters.retain(|_, bucket| !bucket.is_idle(now_ms));
    before - counters.len()
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("limits", &self.limits.iter().map(|(n, _)| n).collect::<Vec<_>>())
            .field("tracked_keys", &self.tracked_keys())
            .field("max_tracked_keys", &self.max_tracked_keys)
            .field("trust_forwarded_headers", &self.trust_forwarded_headers)
            .finish()
    }
}

// ════════════════════════════════════════════════════════════════════════════
// AXUM MIDDLEWARE
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct RateLimitState {
    limiter: Arc<RateLimiter>,
    metrics: Arc<SignerMetrics>,
}

impl RateLimitState {
    pub fn new(limiter: Arc<RateLimiter>, metrics: Arc<SignerMetrics>) -> Self {
        Self { limiter, metrics }
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }
}

/// Client IP for the per-IP limit.
///
/// Forwarding headers (`x-forwarded-for` first hop, then `x-real-ip`) are
/// read only when `trust_forwarded` is set. Otherwise, and as a fallback,
/// the TCP peer address from `ConnectInfo` is used.
fn extract_client_ip(req: &Request, trust_forwarded: bool) -> Option<String> {
    if trust_forwarded {
        if let Some(ip) = forwarded_ip(req) {
            return Some(ip);
        }
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
}

fn forwarded_ip(req: &Request) -> Option<String> {
    if let Some(xff) = req.headers().get("x-forwarded-for") {
        if let Ok(xff_str) = xff.to_str() {
            if let Some(ip) = xff_str.split(',').next() {
                let ip = ip.trim();
                if !ip.is_empty() {
                    return Some(ip.to_string());
                }
            }
        }
    }

    if let Some(xri) = req.headers().get("x-real-ip") {
        if let Ok(ip_str) = xri.to_str() {
            let ip = ip_str.trim();
            if !ip.is_empty() {
                return Some(ip.to_string());
            }
        }
    }

    None
}

/// Menolak request dengan HTTP 429 jika limit terlampaui.
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    req: Request,
    next: Next,
) -> Response {
    let ip = extract_client_ip(&req, state.limiter.trusts_forwarded_headers());

    match state.limiter.check_all(ip.as_deref()) {
        Ok(()) => next.run(req).await,
        Err(RateLimitError::LimitExceeded { key, retry_after_ms }) => {
            warn!(key = %key, retry_after_ms, "rate limit exceeded");
            state.metrics.record_rate_limited();
            let retry_after_secs = retry_after_ms.div_ceil(1000).max(1);
            ApiError::rate_limited(retry_after_secs).into_response()
        }
    }
}

fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

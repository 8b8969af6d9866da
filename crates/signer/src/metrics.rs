//! # Metrics & Observability Module
//!
//! Metrics untuk signer service, diekspor dalam format Prometheus.
//!
//! ## Metrics
//!
//! - `hbird_signer_requests_total`: Total request ke endpoint sign
//! - `hbird_signer_responses_by_status`: Response per HTTP status code
//! - `hbird_signer_errors_by_code`: Error per `VoucherError` code
//! - `hbird_signer_vouchers_issued_total`: Voucher yang lolos self-check
//! - `hbird_signer_rate_limited_total`: Request ditolak rate limiter
//! - `hbird_signer_signing_latency_ms`: Latency end-to-end request sign

use std::collections::HashMap;
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::RwLock;
use uuid::Uuid;

// ════════════════════════════════════════════════════════════════════════════
// COUNTER
// ════════════════════════════════════════════════════════════════════════════

/// Thread-safe counter menggunakan atomic operations.
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::SeqCst);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::SeqCst)
    }
}

// ════════════════════════════════════════════════════════════════════════════
// HISTOGRAM
// ════════════════════════════════════════════════════════════════════════════

/// Latency histogram. Buckets: 1ms .. 1000ms, +Inf.
pub struct Histogram {
    buckets: [AtomicU64; 10],
    sum: AtomicU64,
    count: AtomicU64,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    /// Bucket boundaries in milliseconds.
    pub const BUCKET_BOUNDS: [u64; 9] = [1, 5, 10, 25, 50, 100, 250, 500, 1000];

    pub fn new() -> Self {
        Self {
            buckets: Default::default(),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    pub fn observe(&self, value_ms: u64) {
        self.sum.fetch_add(value_ms, Ordering::SeqCst);
        self.count.fetch_add(1, Ordering::SeqCst);
        let idx = Self::BUCKET_BOUNDS
            .iter()
            .position(|&bound| value_ms <= bound)
            .unwrap_or(Self::BUCKET_BOUNDS.len());
        self.buckets[idx].fetch_add(1, Ordering::SeqCst);
    }

    /// Cumulative count up to and including bucket `idx`.
    pub fn get_cumulative(&self, idx: usize) -> u64 {
        self.buckets
            .iter()
            .take(idx.min(9) + 1)
            .map(|b| b.load(Ordering::SeqCst))
            .sum()
    }

    pub fn get_sum(&self) -> u64 {
        self.sum.load(Ordering::SeqCst)
    }

    pub fn get_count(&self) -> u64 {
        self.count.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for Histogram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Histogram")
            .field("count", &self.get_count())
            .field("sum", &self.get_sum())
            .finish()
    }
}

// ════════════════════════════════════════════════════════════════════════════
// LABELED COUNTERS
// ════════════════════════════════════════════════════════════════════════════

/// Counters keyed by a label value (status code, error code).
pub struct LabeledCounters<K> {
    counters: RwLock<HashMap<K, Counter>>,
}

impl<K> Default for LabeledCounters<K> {
    fn default() -> Self {
        Self {
            counters: RwLock::new(HashMap::new()),
        }
    }
}

impl<K> LabeledCounters<K>
where
    K: std::hash::Hash + Eq + Copy + Ord,
{
    pub fn inc(&self, key: K) {
        // read lock fast path
        {
            let counters = self.counters.read();
            if let Some(counter) = counters.get(&key) {
                counter.inc();
                return;
            }
        }

        self.counters
            .write()
            .entry(key)
            .or_insert_with(Counter::new)
            .inc();
    }

    pub fn get(&self, key: K) -> u64 {
        self.counters.read().get(&key).map(|c| c.get()).unwrap_or(0)
    }

    /// Sorted snapshot.
    pub fn get_all(&self) -> Vec<(K, u64)> {
        let mut all: Vec<_> = self
            .counters
            .read()
            .iter()
            .map(|(&k, v)| (k, v.get()))
            .collect();
        all.sort_by_key(|(k, _)| *k);
        all
    }
}

// ════════════════════════════════════════════════════════════════════════════
// TRACE ID
// ════════════════════════════════════════════════════════════════════════════

/// Per-request trace id, returned in `x-trace-id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TraceId(String);

impl TraceId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TraceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ════════════════════════════════════════════════════════════════════════════
// SIGNER METRICS
// ════════════════════════════════════════════════════════════════════════════

#[derive(Default)]
pub struct SignerMetrics {
    pub requests_total: Counter,
    pub responses_by_status: LabeledCounters<u16>,
    pub errors_by_code: LabeledCounters<&'static str>,
    pub vouchers_issued: Counter,
    pub rate_limited: Counter,
    pub signing_latency: Histogram,
}

impl SignerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.requests_total.inc();
    }

    pub fn record_status(&self, status: u16) {
        self.responses_by_status.inc(status);
    }

    pub fn record_error(&self, code: &'static str) {
        self.errors_by_code.inc(code);
    }

    pub fn record_issued(&self, latency_ms: u64) {
        self.vouchers_issued.inc();
        self.signing_latency.observe(latency_ms);
    }

    pub fn record_rate_limited(&self) {
        self.rate_limited.inc();
        self.record_status(429);
    }

    /// Export metrics in Prometheus exposition format.
    pub fn to_prometheus(&self) -> String {
        let mut output = String::with_capacity(4096);

        let _ = writeln!(output, "# HELP hbird_signer_requests_total Total sign requests received");
        let _ = writeln!(output, "# TYPE hbird_signer_requests_total counter");
        let _ = writeln!(output, "hbird_signer_requests_total {}", self.requests_total.get());
        let _ = writeln!(output);

        let _ = writeln!(output, "# HELP hbird_signer_responses_by_status Responses by HTTP status code");
        let _ = writeln!(output, "# TYPE hbird_signer_responses_by_status counter");
        for (status, count) in self.responses_by_status.get_all() {
            let _ = writeln!(output, "hbird_signer_responses_by_status{{status=\"{}\"}} {}", status, count);
        }
        let _ = writeln!(output);

        let _ = writeln!(output, "# HELP hbird_signer_errors_by_code Sign failures by error code");
        let _ = writeln!(output, "# TYPE hbird_signer_errors_by_code counter");
        for (code, count) in self.errors_by_code.get_all() {
            let _ = writeln!(output, "hbird_signer_errors_by_code{{code=\"{}\"}} {}", code, count);
        }
        let _ = writeln!(output);

        let _ = writeln!(output, "# HELP hbird_signer_vouchers_issued_total Vouchers issued after a passing self-check");
        let _ = writeln!(output, "# TYPE hbird_signer_vouchers_issued_total counter");
        let _ = writeln!(output, "hbird_signer_vouchers_issued_total {}", self.vouchers_issued.get());
        let _ = writeln!(output);

        let _ = writeln!(output, "# HELP hbird_signer_rate_limited_total Requests rejected by the rate limiter");
        let _ = writeln!(output, "# TYPE hbird_signer_rate_limited_total counter");
        let _ = writeln!(output, "hbird_signer_rate_limited_total {}", self.rate_limited.get());
        let _ = writeln!(output);

        let _ = writeln!(output, "# HELP hbird_signer_signing_latency_ms Sign request latency in milliseconds");
        let _ = writeln!(output, "# TYPE hbird_signer_signing_latency_ms histogram");
        for (i, &bound) in Histogram::BUCKET_BOUNDS.iter().enumerate() {
            let _ = writeln!(
                output,
                "hbird_signer_signing_latency_ms_bucket{{le=\"{}\"}} {}",
                bound,
                self.signing_latency.get_cumulative(i)
            );
        }
        let _ = writeln!(
            output,
            "hbird_signer_signing_latency_ms_bucket{{le=\"+Inf\"}} {}",
            self.signing_latency.get_cumulative(9)
        );
        let _ = writeln!(output, "hbird_signer_signing_latency_ms_sum {}", self.signing_latency.get_sum());
        let _ = writeln!(output, "hbird_signer_signing_latency_ms_count {}", self.signing_latency.get_count());

        output
    }
}

impl std::fmt::Debug for SignerMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignerMetrics")
            .field("requests_total", &self.requests_total.get())
            .field("vouchers_issued", &self.vouchers_issued.get())
            .field("rate_limited", &self.rate_limited.get())
            .finish()
    }
}

// ════════════════════════════════════════════════════════════════════════════
// REQUEST CONTEXT
// ════════════════════════════════════════════════════════════════════════════

/// Timing context for a single request.
pub struct RequestContext {
    pub trace_id: TraceId,
    pub start_time: Instant,
}

impl RequestContext {
    pub fn new(trace_id: TraceId) -> Self {
        Self {
            trace_id,
            start_time: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }
}

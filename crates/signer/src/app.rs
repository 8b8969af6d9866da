//! Application state and router assembly.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::{
    extract::Request,
    http::{header, HeaderValue, Method},
    middleware::{self, Next},
    response::Response,
    routing::get,
    Router,
};
use hbird_voucher::{Address, ClaimStateReader, OperatorSigner, VoucherSigner};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::chain_client::JsonRpcClaimReader;
use crate::config::SignerConfig;
use crate::handlers;
use crate::metrics::{SignerMetrics, TraceId};
use crate::rate_limit::{rate_limit_middleware, LimitConfig, RateLimitState, RateLimiter};

/// Unix-seconds clock. Injected so tests can pin `now`.
pub type Clock = Arc<dyn Fn() -> u64 + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(|| {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    })
}

// ════════════════════════════════════════════════════════════════════════════
// APP STATE
// ════════════════════════════════════════════════════════════════════════════

/// Application state untuk Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// `None` jika operator key tidak dikonfigurasi.
    pub signer: Option<Arc<VoucherSigner>>,
    /// Claim-state source opsional (JSON-RPC atau verifier in-process).
    pub claim_state: Option<Arc<dyn ClaimStateReader>>,
    /// Label for `/health`.
    pub claim_state_kind: &'static str,
    pub default_contract: Option<Address>,
    /// Overall deadline per sign request.
    pub request_timeout: Duration,
    pub metrics: Arc<SignerMetrics>,
    pub clock: Clock,
}

impl AppState {
    /// Membuat AppState dari config yang sudah divalidasi.
    ///
    /// Key malformed gagal di sini; key yang tidak ada menghasilkan state
    /// tanpa signer.
    pub fn from_config(config: &SignerConfig) -> Result<Self, String> {
        let rate = config.conversion_rate()?;
        let policy = config.claim_policy();

        let signer = match config
            .operator_key()
            .map_err(|e| format!("OPERATOR_PRIVATE_KEY: {}", e))?
        {
            Some(key) => {
                info!(operator = %key.address(), "operator key loaded");
                let operator: Arc<dyn OperatorSigner> = Arc::new(key);
                Some(Arc::new(VoucherSigner::new(operator, rate, policy)))
            }
            None => {
                warn!("OPERATOR_PRIVATE_KEY not set, signing disabled");
                None
            }
        };

        let (claim_state, claim_state_kind) = match &config.chain_rpc_url {
            Some(url) => {
                let reader = JsonRpcClaimReader::new(url.clone(), config.chain_rpc_timeout)
                    .map_err(|e| format!("failed to build RPC client: {}", e))?;
                let reader: Arc<dyn ClaimStateReader> = Arc::new(reader);
                (Some(reader), "json-rpc")
            }
            None => (None, "none"),
        };

        Ok(Self {
            signer,
            claim_state,
            claim_state_kind,
            default_contract: config.default_contract,
            request_timeout: config.request_timeout,
            metrics: Arc::new(SignerMetrics::new()),
            clock: system_clock(),
        })
    }

    /// State with an explicit signer and no claim-state source.
    pub fn new(signer: Option<Arc<VoucherSigner>>, default_contract: Option<Address>) -> Self {
        Self {
            signer,
            claim_state: None,
            claim_state_kind: "none",
            default_contract,
            request_timeout: Duration::from_millis(crate::config::DEFAULT_REQUEST_TIMEOUT_MS),
            metrics: Arc::new(SignerMetrics::new()),
            clock: system_clock(),
        }
    }

    pub fn with_claim_state(mut self, reader: Arc<dyn ClaimStateReader>, kind: &'static str) -> Self {
        self.claim_state = Some(reader);
        self.claim_state_kind = kind;
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn now(&self) -> u64 {
        (self.clock)()
    }

    pub fn is_ready(&self) -> bool {
        self.signer.is_some()
    }
}

// ════════════════════════════════════════════════════════════════════════════
// ROUTER
// ════════════════════════════════════════════════════════════════════════════

/// Attach a fresh trace id to the request and echo it in `x-trace-id`.
pub async fn trace_id_middleware(mut req: Request, next: Next) -> Response {
    let trace_id = TraceId::generate();
    req.extensions_mut().insert(trace_id.clone());
    let mut resp = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(trace_id.as_str()) {
        resp.headers_mut().insert("x-trace-id", value);
    }
    resp
}

pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

/// Layer order (outermost first): trace id, CORS, rate limit.
pub fn build_router(state: AppState, limiter: Arc<RateLimiter>) -> Router {
    let rate_limit_state = RateLimitState::new(limiter, state.metrics.clone());

    Router::new()
        .route("/sign", get(handlers::sign))
        .route("/api/sign", get(handlers::sign))
        .route("/health", get(handlers::health))
        .route("/ready", get(handlers::ready))
        .route("/metrics", get(handlers::metrics_endpoint))
        .fallback(handlers::not_found)
        .layer(middleware::from_fn_with_state(
            rate_limit_state,
            rate_limit_middleware,
        ))
        .layer(cors_layer())
        .layer(middleware::from_fn(trace_id_middleware))
        .with_state(state)
}

pub fn limiter_from_config(config: &SignerConfig) -> RateLimiter {
    RateLimiter::with_limits(
        LimitConfig::per_ip(config.per_ip_rps, config.per_ip_burst),
        LimitConfig::global(config.global_rps, config.global_burst),
    )
    .with_max_tracked_keys(config.rate_limit_max_keys)
    .with_trusted_forwarding(config.trust_forwarded_headers)
}

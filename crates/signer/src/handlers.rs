//! HTTP handlers.
//!
//! ## Endpoints
//! - GET /sign, GET /api/sign - Issue a signed voucher
//! - GET /health - Liveness + operator state
//! - GET /ready - Readiness (operator key loaded)
//! - GET /metrics - Prometheus metrics

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use hbird_voucher::{IssuedVoucher, SignQuery, VoucherError};
use serde::Serialize;
use serde_json::json;
use tokio::time::timeout;
use tracing::{error, info, instrument, warn, Span};

use crate::app::AppState;
use crate::error::ApiError;
use crate::metrics::{RequestContext, TraceId};

// ════════════════════════════════════════════════════════════════════════════
// RESPONSE TYPES
// ════════════════════════════════════════════════════════════════════════════

/// 200 body of the sign endpoint. Wide integers are decimal strings.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignResponse {
    pub player: String,
    pub points: String,
    pub amount_wei: String,
    pub amount_tokens: String,
    pub nonce: String,
    pub expiry: u64,
    pub contract_address: String,
    pub payload_hash: String,
    pub signature: String,
    pub signer_address: String,
    pub recovered_signer: String,
    pub success: bool,
}

impl SignResponse {
    pub fn from_issued(issued: &IssuedVoucher, amount_tokens: String) -> Self {
        let v = &issued.voucher;
        Self {
            player: v.player.to_string(),
            points: issued.points.to_string(),
            amount_wei: v.amount.to_string(),
            amount_tokens,
            nonce: v.nonce.to_string(),
            expiry: v.expiry,
            contract_address: v.contract.to_string(),
            payload_hash: issued.payload_hash_hex(),
            signature: v.signature.to_hex(),
            signer_address: issued.signer_address.to_string(),
            recovered_signer: issued.recovered_signer.to_string(),
            success: issued.self_check_passed(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub operator_configured: bool,
    pub operator_address: Option<String>,
    pub claim_state_source: &'static str,
    pub default_contract: Option<String>,
}

// ════════════════════════════════════════════════════════════════════════════
// SIGN
// ════════════════════════════════════════════════════════════════════════════

/// GET /sign, GET /api/sign
///
/// Validate query → issue voucher (dengan overall deadline) → JSON.
#[instrument(skip_all, fields(trace_id = %trace_id, player, outcome, latency_ms))]
pub async fn sign(
    State(state): State<AppState>,
    Extension(trace_id): Extension<TraceId>,
    query: Result<Query<SignQuery>, QueryRejection>,
) -> Response {
    let ctx = RequestContext::new(trace_id);
    state.metrics.record_request();

    let result = issue(&state, query).await;
    let latency_ms = ctx.elapsed_ms();
    Span::current().record("latency_ms", latency_ms);

    match result {
        Ok(issued) => {
            state.metrics.record_issued(latency_ms);
            state.metrics.record_status(200);
            Span::current().record("outcome", "issued");

            let amount_tokens = state
                .signer
                .as_ref()
                .map(|s| s.rate().format_tokens(issued.voucher.amount))
                .unwrap_or_default();

            info!(
                trace_id = %ctx.trace_id,
                player = %issued.voucher.player,
                nonce = %issued.voucher.nonce,
                latency_ms,
                outcome = "issued",
                "sign request completed"
            );
            (StatusCode::OK, Json(SignResponse::from_issued(&issued, amount_tokens))).into_response()
        }
        Err(err) => {
            let api = ApiError::from(&err);
            state.metrics.record_error(err.code());
            state.metrics.record_status(api.status.as_u16());
            Span::current().record("outcome", err.code());

            if err.is_internal() {
                error!(
                    trace_id = %ctx.trace_id,
                    code = err.code(),
                    error = %err,
                    "sign request failed"
                );
            } else if err.is_retryable() {
                warn!(
                    trace_id = %ctx.trace_id,
                    code = err.code(),
                    error = %err,
                    latency_ms,
                    "sign request failed upstream"
                );
            } else {
                info!(
                    trace_id = %ctx.trace_id,
                    code = err.code(),
                    error = %err,
                    "sign request rejected"
                );
            }
            api.into_response()
        }
    }
}

async fn issue(
    state: &AppState,
    query: Result<Query<SignQuery>, QueryRejection>,
) -> Result<IssuedVoucher, VoucherError> {
    // input errors are reported even when signing is unavailable
    let Query(query) = query.map_err(|e| VoucherError::InvalidRequest(e.body_text()))?;
    let request = query.validate(state.default_contract)?;
    Span::current().record("player", tracing::field::display(&request.player));

    let signer = state.signer.as_ref().ok_or(VoucherError::MissingOperatorKey)?;

    let now = state.now();
    let reader = state.claim_state.as_deref();

    match timeout(state.request_timeout, signer.issue(&request, reader, now)).await {
        Ok(result) => result,
        Err(_elapsed) => Err(VoucherError::UpstreamReadError(format!(
            "request deadline of {}ms exceeded",
            state.request_timeout.as_millis()
        ))),
    }
}

// ════════════════════════════════════════════════════════════════════════════
// HEALTH / READY / METRICS
// ════════════════════════════════════════════════════════════════════════════

/// GET /health
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let operator_address = state
        .signer
        .as_ref()
        .map(|s| s.operator_address().to_string());

    Json(HealthResponse {
        status: "ok",
        service: "hbird-signer",
        version: env!("CARGO_PKG_VERSION"),
        operator_configured: operator_address.is_some(),
        operator_address,
        claim_state_source: state.claim_state_kind,
        default_contract: state.default_contract.map(|a| a.to_string()),
    })
}

/// GET /ready - 200 only when an operator key is loaded.
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    if state.is_ready() {
        (StatusCode::OK, "ready")
    } else {
        warn!("ready check failed: operator key not configured");
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}

/// GET /metrics - Prometheus exposition format.
pub async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    let output = state.metrics.to_prometheus();
    let mut headers = HeaderMap::new();
    headers.insert(
        "content-type",
        HeaderValue::from_static("text/plain; version=0.0.4; charset=utf-8"),
    );
    (StatusCode::OK, headers, output)
}

pub async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Not Found" })))
}

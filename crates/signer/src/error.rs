//! HTTP mapping of voucher errors.
//!
//! | Code                                                           | Status |
//! |----------------------------------------------------------------|--------|
//! | InvalidAddress, OutOfRange, InvalidRequest, Expired            | 400    |
//! | NonceMismatch                                                  | 409    |
//! | CooldownActive, RateLimited                                    | 429    |
//! | UpstreamReadError                                              | 503    |
//! | MissingOperatorKey, InvalidOperatorKey, SigningIntegrityError  | 500    |
//!
//! Error 500 selalu opaque; detail hanya ada di log server.

use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use hbird_voucher::VoucherError;
use serde::Serialize;

/// Message returned for every internal failure.
pub const OPAQUE_INTERNAL_MESSAGE: &str = "voucher signing is unavailable";

/// Retry hint for upstream read failures (seconds).
pub const UPSTREAM_RETRY_AFTER_SECS: u64 = 2;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
    pub code: &'static str,
    pub retryable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub retryable: bool,
    pub retry_after_secs: Option<u64>,
}

impl ApiError {
    pub fn rate_limited(retry_after_secs: u64) -> Self {
        Self {
            status: StatusCode::TOO_MANY_REQUESTS,
            code: "RateLimited",
            message: format!("rate limit exceeded, retry after {} seconds", retry_after_secs),
            retryable: true,
            retry_after_secs: Some(retry_after_secs),
        }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            success: false,
            error: self.message.clone(),
            code: self.code,
            retryable: self.retryable,
        }
    }
}

impl From<&VoucherError> for ApiError {
    fn from(err: &VoucherError) -> Self {
        let (status, retry_after_secs) = match err {
            VoucherError::InvalidAddress { .. }
            | VoucherError::OutOfRange { .. }
            | VoucherError::InvalidRequest(_)
            | VoucherError::Expired { .. } => (StatusCode::BAD_REQUEST, None),
            VoucherError::NonceMismatch { .. } => (StatusCode::CONFLICT, None),
            VoucherError::CooldownActive { remaining_secs } => {
                (StatusCode::TOO_MANY_REQUESTS, Some((*remaining_secs).max(1)))
            }
            VoucherError::UpstreamReadError(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, Some(UPSTREAM_RETRY_AFTER_SECS))
            }
            VoucherError::MissingOperatorKey
            | VoucherError::InvalidOperatorKey
            | VoucherError::SigningIntegrityError(_) => (StatusCode::INTERNAL_SERVER_ERROR, None),
        };

        let message = if err.is_internal() {
            OPAQUE_INTERNAL_MESSAGE.to_string()
        } else {
            err.to_string()
        };

        Self {
            status,
            code: err.code(),
            message,
            retryable: err.is_retryable(),
            retry_after_secs,
        }
    }
}

impl From<VoucherError> for ApiError {
    fn from(err: VoucherError) -> Self {
        ApiError::from(&err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut resp = (self.status, Json(self.body())).into_response();
        if let Some(secs) = self.retry_after_secs {
            if let Ok(v) = HeaderValue::from_str(&secs.to_string()) {
                resp.headers_mut().insert("retry-after", v);
            }
        }
        resp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hbird_voucher::U256;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (VoucherError::InvalidRequest("x".into()), StatusCode::BAD_REQUEST),
            (VoucherError::Expired { expiry: 1, now: 2 }, StatusCode::BAD_REQUEST),
            (
                VoucherError::NonceMismatch {
                    expected: U256::one(),
                    supplied: U256::from(3u64),
                },
                StatusCode::CONFLICT,
            ),
            (
                VoucherError::CooldownActive { remaining_secs: 9 },
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (
                VoucherError::UpstreamReadError("down".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (VoucherError::MissingOperatorKey, StatusCode::INTERNAL_SERVER_ERROR),
            (
                VoucherError::SigningIntegrityError("mismatch".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(&err).status, status, "{}", err.code());
        }
    }

    #[test]
    fn test_internal_errors_are_opaque() {
        let api = ApiError::from(VoucherError::SigningIntegrityError(
            "recovered 0xdead instead of 0xbeef".into(),
        ));
        assert_eq!(api.message, OPAQUE_INTERNAL_MESSAGE);
        assert_eq!(api.code, "SigningIntegrityError");
        assert!(!api.retryable);
    }

    #[test]
    fn test_retry_after_hints() {
        let api = ApiError::from(VoucherError::CooldownActive { remaining_secs: 12 });
        assert_eq!(api.retry_after_secs, Some(12));
        let resp = api.into_response();
        assert_eq!(resp.headers().get("retry-after").expect("header"), "12");

        let api = ApiError::from(VoucherError::UpstreamReadError("x".into()));
        assert!(api.retryable);
        assert_eq!(api.retry_after_secs, Some(UPSTREAM_RETRY_AFTER_SECS));
    }
}

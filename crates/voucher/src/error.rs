//! Error taxonomy for voucher issuance.
//!
//! Setiap variant memiliki `code()` yang stabil (dipakai di response JSON
//! dan label metrics). Hanya `UpstreamReadError` yang retryable.

use primitive_types::U256;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VoucherError {
    /// Address malformed atau checksum EIP-55 salah.
    #[error("invalid address in `{field}`: {reason}")]
    InvalidAddress { field: &'static str, reason: String },

    /// Angka negatif, nol (untuk points), atau melebihi lebar field.
    #[error("`{field}` out of range: {reason}")]
    OutOfRange { field: &'static str, reason: String },

    /// Field wajib hilang atau bukan angka.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("voucher expiry {expiry} is not after current time {now}")]
    Expired { expiry: u64, now: u64 },

    #[error("nonce mismatch: expected {expected}, supplied {supplied}")]
    NonceMismatch { expected: U256, supplied: U256 },

    #[error("claim cooldown active, {remaining_secs}s remaining")]
    CooldownActive { remaining_secs: u64 },

    #[error("operator signing key is not configured")]
    MissingOperatorKey,

    #[error("operator signing key is malformed")]
    InvalidOperatorKey,

    /// Signature yang dihasilkan tidak recover ke operator address.
    #[error("signing integrity check failed: {0}")]
    SigningIntegrityError(String),

    #[error("claim state read failed: {0}")]
    UpstreamReadError(String),
}

impl VoucherError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            VoucherError::InvalidAddress { .. } => "InvalidAddress",
            VoucherError::OutOfRange { .. } => "OutOfRange",
            VoucherError::InvalidRequest(_) => "InvalidRequest",
            VoucherError::Expired { .. } => "Expired",
            VoucherError::NonceMismatch { .. } => "NonceMismatch",
            VoucherError::CooldownActive { .. } => "CooldownActive",
            VoucherError::MissingOperatorKey => "MissingOperatorKey",
            VoucherError::InvalidOperatorKey => "InvalidOperatorKey",
            VoucherError::SigningIntegrityError(_) => "SigningIntegrityError",
            VoucherError::UpstreamReadError(_) => "UpstreamReadError",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, VoucherError::UpstreamReadError(_))
    }

    /// Configuration or integrity failure. Detail stays in server logs.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            VoucherError::MissingOperatorKey
                | VoucherError::InvalidOperatorKey
                | VoucherError::SigningIntegrityError(_)
        )
    }

    pub(crate) fn out_of_range(field: &'static str, reason: impl Into<String>) -> Self {
        VoucherError::OutOfRange {
            field,
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_address(field: &'static str, reason: impl ToString) -> Self {
        VoucherError::InvalidAddress {
            field,
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_upstream_is_retryable() {
        assert!(VoucherError::UpstreamReadError("timeout".into()).is_retryable());
        assert!(!VoucherError::MissingOperatorKey.is_retryable());
        assert!(!VoucherError::CooldownActive { remaining_secs: 3 }.is_retryable());
        assert!(!VoucherError::Expired { expiry: 1, now: 2 }.is_retryable());
    }

    #[test]
    fn internal_classification() {
        assert!(VoucherError::MissingOperatorKey.is_internal());
        assert!(VoucherError::InvalidOperatorKey.is_internal());
        assert!(VoucherError::SigningIntegrityError("x".into()).is_internal());
        assert!(!VoucherError::InvalidRequest("x".into()).is_internal());
        assert!(!VoucherError::UpstreamReadError("x".into()).is_internal());
    }

    #[test]
    fn codes_and_messages() {
        let err = VoucherError::NonceMismatch {
            expected: U256::from(4u64),
            supplied: U256::from(2u64),
        };
        assert_eq!(err.code(), "NonceMismatch");
        assert_eq!(err.to_string(), "nonce mismatch: expected 4, supplied 2");

        let err = VoucherError::out_of_range("points", "must be greater than zero");
        assert_eq!(err.code(), "OutOfRange");
        assert!(err.to_string().contains("points"));
    }
}

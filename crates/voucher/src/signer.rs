//! # Voucher Signer
//!
//! Mengubah [`VoucherRequest`] yang sudah tervalidasi menjadi voucher yang
//! di-sign operator.
//!
//! ## Flow
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                 issue(request, reader, now)                       │
//! │                                                                   │
//! │  STEP 1 ─ EXPIRY (pure, fail fast)                               │
//! │  │  explicit <= now        → Expired                              │
//! │  │  explicit > now + ttl   → OutOfRange                           │
//! │  │  none                   → now + ttl                            │
//! │  │                                                                │
//! │  STEP 2 ─ AMOUNT (pure)                                          │
//! │  │  points * units_per_point (overflow → OutOfRange)              │
//! │  │                                                                │
//! │  STEP 3 ─ CLAIM STATE (read-only, optional)                      │
//! │  │  (last_nonce, last_claim) read concurrently                    │
//! │  │  cooldown pre-check      → CooldownActive                      │
//! │  │  nonce omitted           → last_nonce + 1                      │
//! │  │  nonce supplied          → must equal last_nonce + 1           │
//! │  │  no reader, no nonce     → InvalidRequest                      │
//! │  │                                                                │
//! │  STEP 4 ─ SIGN                                                   │
//! │  │  payload → EIP-191 digest → recoverable ECDSA                  │
//! │  │                                                                │
//! │  STEP 5 ─ SELF-CHECK                                             │
//! │     recover(digest, sig) == operator  else SigningIntegrityError  │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Signer stateless: operator key dibagi read-only lewat `Arc`, sehingga
//! request paralel untuk player yang sama aman. Hanya satu dari voucher
//! dengan nonce sama yang bisa di-redeem di verifier.

use std::sync::Arc;

use primitive_types::U256;
use tracing::{debug, error, info};

use crate::address::Address;
use crate::conversion::ConversionRate;
use crate::crypto::{recover_signer, OperatorSigner, VoucherSignature};
use crate::error::VoucherError;
use crate::payload::VoucherPayload;
use crate::policy::ClaimPolicy;
use crate::request::VoucherRequest;
use crate::state::{read_snapshot, ClaimStateReader};
use crate::voucher::Voucher;

// ════════════════════════════════════════════════════════════════════════════════
// ISSUED VOUCHER
// ════════════════════════════════════════════════════════════════════════════════

/// Voucher plus the data the service returns alongside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedVoucher {
    pub voucher: Voucher,
    /// Points as requested (before conversion).
    pub points: U256,
    pub payload_hash: [u8; 32],
    pub signer_address: Address,
    pub recovered_signer: Address,
}

impl IssuedVoucher {
    /// True iff the signature recovers to the operator. Always true for
    /// vouchers produced by [`VoucherSigner::issue`].
    pub fn self_check_passed(&self) -> bool {
        self.signer_address == self.recovered_signer
    }

    pub fn payload_hash_hex(&self) -> String {
        format!("0x{}", hex::encode(self.payload_hash))
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// SIGNER
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct VoucherSigner {
    operator: Arc<dyn OperatorSigner>,
    rate: ConversionRate,
    policy: ClaimPolicy,
}

impl std::fmt::Debug for VoucherSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoucherSigner")
            .field("operator", &self.operator.address())
            .field("rate", &self.rate)
            .field("policy", &self.policy)
            .finish()
    }
}

impl VoucherSigner {
    pub fn new(operator: Arc<dyn OperatorSigner>, rate: ConversionRate, policy: ClaimPolicy) -> Self {
        Self {
            operator,
            rate,
            policy,
        }
    }

    pub fn operator_address(&self) -> Address {
        self.operator.address()
    }

    pub fn rate(&self) -> &ConversionRate {
        &self.rate
    }

    pub fn policy(&self) -> &ClaimPolicy {
        &self.policy
    }

    /// Issue a voucher for a validated request.
    ///
    /// `reader` adalah claim-state source opsional. Tanpa reader, request
    /// WAJIB membawa nonce.
    pub async fn issue(
        &self,
        request: &VoucherRequest,
        reader: Option<&dyn ClaimStateReader>,
        now: u64,
    ) -> Result<IssuedVoucher, VoucherError> {
        // STEP 1
        let expiry = self.policy.resolve_expiry(request.expiry, now)?;

        // STEP 2
        let amount = self.rate.points_to_base_units(request.points)?;

        // STEP 3
        let nonce = match reader {
            Some(reader) => {
                let snapshot = read_snapshot(reader, &request.contract, &request.player).await?;
                self.policy.check_cooldown(snapshot.last_claim, now)?;
                match request.nonce {
                    Some(supplied) => {
                        ClaimPolicy::check_nonce(snapshot.last_nonce, supplied)?;
                        supplied
                    }
                    None => ClaimPolicy::next_nonce(snapshot.last_nonce)?,
                }
            }
            None => request.nonce.ok_or_else(|| {
                VoucherError::InvalidRequest(
                    "`nonce` is required when no claim-state source is configured".to_string(),
                )
            })?,
        };

        // STEP 4 + 5
        let payload = VoucherPayload::new(request.player, amount, nonce, expiry, request.contract);
        let (signature, recovered) = self.sign_payload(&payload)?;

        let issued = IssuedVoucher {
            voucher: Voucher {
                player: payload.player,
                amount: payload.amount,
                nonce: payload.nonce,
                expiry: payload.expiry,
                contract: payload.contract,
                signature,
            },
            points: request.points,
            payload_hash: payload.payload_hash(),
            signer_address: self.operator.address(),
            recovered_signer: recovered,
        };

        info!(
            player = %issued.voucher.player,
            contract = %issued.voucher.contract,
            nonce = %issued.voucher.nonce,
            amount = %issued.voucher.amount,
            expiry = issued.voucher.expiry,
            "voucher issued"
        );

        Ok(issued)
    }

    /// Sign a payload and verify the signature recovers to the operator.
    pub fn sign_payload(
        &self,
        payload: &VoucherPayload,
    ) -> Result<(VoucherSignature, Address), VoucherError> {
        let digest = payload.signing_digest();
        let signature = self.operator.sign_digest(&digest)?;
        let expected = self.operator.address();

        let recovered = match recover_signer(&digest, &signature) {
            Ok(addr) => addr,
            Err(e) => {
                error!(
                    operator = %expected,
                    player = %payload.player,
                    nonce = %payload.nonce,
                    error = %e,
                    "operator produced an unrecoverable signature"
                );
                return Err(VoucherError::SigningIntegrityError(e.to_string()));
            }
        };

        if recovered != expected {
            error!(
                operator = %expected,
                recovered = %recovered,
                player = %payload.player,
                nonce = %payload.nonce,
                "signature does not recover to operator address"
            );
            return Err(VoucherError::SigningIntegrityError(format!(
                "recovered {} instead of {}",
                recovered, expected
            )));
        }

        debug!(operator = %expected, "signature self-check passed");
        Ok((signature, recovered))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::OperatorKey;
    use crate::request::SignQuery;
    use crate::state::ClaimStateReader;
    use async_trait::async_trait;

    const DEV_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const NOW: u64 = 1_700_000_000;

    fn signer() -> VoucherSigner {
        let key = OperatorKey::from_hex(DEV_KEY).expect("key");
        VoucherSigner::new(Arc::new(key), ConversionRate::default(), ClaimPolicy::default())
    }

    fn request(nonce: Option<u64>, expiry: Option<u64>) -> VoucherRequest {
        VoucherRequest {
            player: Address::from_bytes([0xaa; 20]),
            points: U256::from(100u64),
            nonce: nonce.map(U256::from),
            expiry,
            contract: Address::from_bytes([0xcc; 20]),
        }
    }

    struct StaticState {
        last_nonce: u64,
        last_claim: u64,
    }

    #[async_trait]
    impl ClaimStateReader for StaticState {
        async fn last_nonce(&self, _: &Address, _: &Address) -> Result<U256, VoucherError> {
            Ok(U256::from(self.last_nonce))
        }
        async fn last_claim(&self, _: &Address, _: &Address) -> Result<u64, VoucherError> {
            Ok(self.last_claim)
        }
    }

    #[tokio::test]
    async fn issue_with_explicit_nonce() {
        let s = signer();
        let issued = s.issue(&request(Some(1), None), None, NOW).await.expect("issue");

        assert!(issued.self_check_passed());
        assert_eq!(issued.signer_address, s.operator_address());
        assert_eq!(issued.voucher.expiry, NOW + 3600);
        assert_eq!(issued.voucher.amount, U256::from(50u64) * U256::exp10(18));
        assert_eq!(issued.payload_hash, issued.voucher.payload().payload_hash());
    }

    #[tokio::test]
    async fn issue_is_deterministic_for_fixed_inputs() {
        let s = signer();
        let a = s.issue(&request(Some(1), Some(NOW + 60)), None, NOW).await.expect("a");
        let b = s.issue(&request(Some(1), Some(NOW + 60)), None, NOW).await.expect("b");
        assert_eq!(a.payload_hash, b.payload_hash);
        assert_eq!(a.voucher.amount, b.voucher.amount);
        // RFC 6979 deterministic nonces
        assert_eq!(a.voucher.signature, b.voucher.signature);
    }

    #[tokio::test]
    async fn missing_nonce_without_reader_rejected() {
        let err = signer().issue(&request(None, None), None, NOW).await.unwrap_err();
        assert_eq!(err.code(), "InvalidRequest");
    }

    #[tokio::test]
    async fn past_expiry_rejected_before_state_read() {
        struct Panicky;
        #[async_trait]
        impl ClaimStateReader for Panicky {
            async fn last_nonce(&self, _: &Address, _: &Address) -> Result<U256, VoucherError> {
                panic!("state must not be read for an expired request")
            }
            async fn last_claim(&self, _: &Address, _: &Address) -> Result<u64, VoucherError> {
                panic!("state must not be read for an expired request")
            }
        }

        let err = signer()
            .issue(&request(Some(1), Some(NOW - 1)), Some(&Panicky), NOW)
            .await
            .unwrap_err();
        assert_eq!(err, VoucherError::Expired { expiry: NOW - 1, now: NOW });
    }

    #[tokio::test]
    async fn nonce_filled_from_reader() {
        let state = StaticState {
            last_nonce: 4,
            last_claim: 0,
        };
        let issued = signer()
            .issue(&request(None, None), Some(&state), NOW)
            .await
            .expect("issue");
        assert_eq!(issued.voucher.nonce, U256::from(5u64));
    }

    #[tokio::test]
    async fn supplied_nonce_checked_against_reader() {
        let state = StaticState {
            last_nonce: 4,
            last_claim: 0,
        };
        let err = signer()
            .issue(&request(Some(4), None), Some(&state), NOW)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            VoucherError::NonceMismatch {
                expected: U256::from(5u64),
                supplied: U256::from(4u64)
            }
        );
    }

    #[tokio::test]
    async fn cooldown_pre_check() {
        let state = StaticState {
            last_nonce: 1,
            last_claim: NOW - 12,
        };
        let err = signer()
            .issue(&request(None, None), Some(&state), NOW)
            .await
            .unwrap_err();
        assert_eq!(err, VoucherError::CooldownActive { remaining_secs: 18 });
    }

    #[tokio::test]
    async fn validated_query_flows_into_issue() {
        let query = SignQuery {
            player: Some("0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed".into()),
            amount: Some("3".into()),
            nonce: Some("1".into()),
            contract_address: Some("0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359".into()),
            ..Default::default()
        };
        let req = query.validate(None).expect("valid");
        let issued = signer().issue(&req, None, NOW).await.expect("issue");
        assert_eq!(issued.points, U256::from(3u64));
        assert_eq!(issued.voucher.amount, U256::from(1_500_000_000_000_000_000u64));
    }
}

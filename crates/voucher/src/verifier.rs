//! # Reference Claim Verifier
//!
//! Mirror in-process dari `claimReward(amount, nonce, expiry, signature)`
//! milik kontrak voucher. Dipakai untuk dry-run off-chain dan test suite.
//!
//! ## Flow
//!
//! ```text
//! claim_reward(sender, amount, nonce, expiry, signature, now)
//!
//!  STEP 1 ─ STATELESS CHECKS (no lock)
//!  │  amount == 0               → ZeroAmount
//!  │  signature not 65 bytes    → MalformedSignature
//!  │  now > expiry              → ExpiredVoucher
//!  │  recover(digest, sig)      → signer candidate
//!  │
//!  ════════════════════ MUTATION BOUNDARY (write lock) ═══════════════
//!  │
//!  STEP 2 ─ STATEFUL CHECKS
//!  │  nonce != last_nonce + 1   → NonceMismatch
//!  │  cooldown active           → CooldownActive
//!  │  signer != operator        → InvalidSigner
//!  │
//!  STEP 3 ─ COMMIT
//!     last_nonce = nonce, last_claim = now
//! ```
//!
//! Step 2 dan 3 terjadi di dalam satu critical section, sehingga dua
//! voucher dengan nonce sama tidak mungkin sama-sama diterima.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use primitive_types::U256;
use thiserror::Error;
use tracing::{debug, warn};

use crate::address::Address;
use crate::crypto::{recover_signer, VoucherSignature};
use crate::error::VoucherError;
use crate::payload::VoucherPayload;
use crate::policy::ClaimPolicy;
use crate::state::ClaimStateReader;
use crate::voucher::Voucher;

// ════════════════════════════════════════════════════════════════════════════════
// REJECTION
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClaimRejection {
    #[error("claim amount must be greater than zero")]
    ZeroAmount,

    #[error("malformed signature: {0}")]
    MalformedSignature(String),

    #[error("voucher expired at {expiry}, now {now}")]
    ExpiredVoucher { expiry: u64, now: u64 },

    #[error("nonce mismatch: expected {expected}, got {got}")]
    NonceMismatch { expected: U256, got: U256 },

    #[error("player nonce counter exhausted")]
    NonceExhausted,

    #[error("cooldown active, {remaining_secs}s remaining")]
    CooldownActive { remaining_secs: u64 },

    #[error("voucher not signed by the trusted operator")]
    InvalidSigner,
}

/// Result of an accepted claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimReceipt {
    pub player: Address,
    pub amount: U256,
    pub nonce: U256,
    pub claimed_at: u64,
}

/// Per-player counter milik verifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlayerClaimState {
    pub last_nonce: U256,
    pub last_claim: u64,
}

// ════════════════════════════════════════════════════════════════════════════════
// VERIFIER
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug)]
pub struct ClaimVerifier {
    operator: Address,
    contract: Address,
    policy: ClaimPolicy,
    players: RwLock<HashMap<Address, PlayerClaimState>>,
    claims_processed: AtomicU64,
}

impl ClaimVerifier {
    /// Membuat verifier baru untuk deployment `contract` yang mempercayai
    /// `operator`.
    pub fn new(operator: Address, contract: Address, policy: ClaimPolicy) -> Self {
        Self {
            operator,
            contract,
            policy,
            players: RwLock::new(HashMap::new()),
            claims_processed: AtomicU64::new(0),
        }
    }

    pub fn contract(&self) -> Address {
        self.contract
    }

    pub fn operator(&self) -> Address {
        self.operator
    }

    pub fn player_state(&self, player: &Address) -> PlayerClaimState {
        self.players.read().get(player).copied().unwrap_or_default()
    }

    pub fn claims_processed(&self) -> u64 {
        self.claims_processed.load(Ordering::Relaxed)
    }

    /// Load a player's counters, e.g. mirrored from the deployed contract
    /// before a dry run.
    pub fn seed_player(&self, player: Address, state: PlayerClaimState) {
        self.players.write().insert(player, state);
    }

    /// `claimReward` as called by `sender`.
    pub fn claim_reward(
        &self,
        sender: Address,
        amount: U256,
        nonce: U256,
        expiry: u64,
        signature: &[u8],
        now: u64,
    ) -> Result<ClaimReceipt, ClaimRejection> {
        // STEP 1
        if amount.is_zero() {
            return Err(ClaimRejection::ZeroAmount);
        }
        let signature = VoucherSignature::from_slice(signature)
            .map_err(|e| ClaimRejection::MalformedSignature(e.to_string()))?;
        if ClaimPolicy::is_expired(expiry, now) {
            return Err(ClaimRejection::ExpiredVoucher { expiry, now });
        }

        let payload = VoucherPayload::new(sender, amount, nonce, expiry, self.contract);
        let signer = match recover_signer(&payload.signing_digest(), &signature) {
            Ok(addr) => Some(addr),
            Err(e) => {
                debug!(player = %sender, error = %e, "signature recovery failed");
                None
            }
        };

        // STEP 2
        let mut players = self.players.write();
        let state = players.get(&sender).copied().unwrap_or_default();

        let expected = match ClaimPolicy::next_nonce(state.last_nonce) {
            Ok(expected) => expected,
            Err(_) => {
                warn!(player = %sender, "claim rejected: nonce counter exhausted");
                return Err(ClaimRejection::NonceExhausted);
            }
        };
        if nonce != expected {
            warn!(player = %sender, %expected, got = %nonce, "claim rejected: nonce mismatch");
            return Err(ClaimRejection::NonceMismatch {
                expected,
                got: nonce,
            });
        }

        let remaining_secs = self.policy.cooldown_remaining(state.last_claim, now);
        if remaining_secs > 0 {
            return Err(ClaimRejection::CooldownActive { remaining_secs });
        }

        if signer != Some(self.operator) {
            warn!(player = %sender, "claim rejected: invalid signer");
            return Err(ClaimRejection::InvalidSigner);
        }

        // STEP 3
        players.insert(
            sender,
            PlayerClaimState {
                last_nonce: nonce,
                last_claim: now,
            },
        );
        drop(players);
        self.claims_processed.fetch_add(1, Ordering::Relaxed);

        debug!(player = %sender, %nonce, %amount, "claim accepted");
        Ok(ClaimReceipt {
            player: sender,
            amount,
            nonce,
            claimed_at: now,
        })
    }

    /// Redeem a voucher as its own player would submit it.
    ///
    /// Voucher untuk deployment lain akan gagal sebagai `InvalidSigner`
    /// karena payload di-recompute dengan contract milik verifier ini.
    pub fn redeem(&self, voucher: &Voucher, now: u64) -> Result<ClaimReceipt, ClaimRejection> {
        self.claim_reward(
            voucher.player,
            voucher.amount,
            voucher.nonce,
            voucher.expiry,
            voucher.signature.as_bytes(),
            now,
        )
    }

    fn check_contract(&self, contract: &Address) -> Result<(), VoucherError> {
        if *contract != self.contract {
            return Err(VoucherError::UpstreamReadError(format!(
                "no verifier deployed at {}",
                contract
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ClaimStateReader for ClaimVerifier {
    async fn last_nonce(&self, contract: &Address, player: &Address) -> Result<U256, VoucherError> {
        self.check_contract(contract)?;
        Ok(self.player_state(player).last_nonce)
    }

    async fn last_claim(&self, contract: &Address, player: &Address) -> Result<u64, VoucherError> {
        self.check_contract(contract)?;
        Ok(self.player_state(player).last_claim)
    }
}

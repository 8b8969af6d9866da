//! # Replay Policy
//!
//! Aturan nonce, expiry, dan cooldown yang dipakai bersama oleh signer
//! (sebagai pre-check) dan verifier (sebagai security boundary).
//!
//! | Rule     | Valid jika                        |
//! |----------|-----------------------------------|
//! | Nonce    | `nonce == last_nonce + 1`         |
//! | Expiry   | `now <= expiry`                   |
//! | Cooldown | `last_claim + cooldown <= now`    |

use primitive_types::U256;

use crate::error::VoucherError;

/// Default voucher lifetime (seconds).
pub const DEFAULT_TTL_SECS: u64 = 3600;

/// Default minimum gap between successful claims (seconds).
pub const DEFAULT_COOLDOWN_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimPolicy {
    pub ttl_secs: u64,
    pub cooldown_secs: u64,
}

impl Default for ClaimPolicy {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_TTL_SECS,
            cooldown_secs: DEFAULT_COOLDOWN_SECS,
        }
    }
}

impl ClaimPolicy {
    pub fn new(ttl_secs: u64, cooldown_secs: u64) -> Self {
        Self {
            ttl_secs,
            cooldown_secs,
        }
    }

    /// Nonce yang akan diterima verifier berikutnya.
    pub fn next_nonce(last_nonce: U256) -> Result<U256, VoucherError> {
        last_nonce
            .checked_add(U256::one())
            .ok_or_else(|| VoucherError::out_of_range("nonce", "player nonce counter exhausted"))
    }

    pub fn check_nonce(last_nonce: U256, supplied: U256) -> Result<(), VoucherError> {
        let expected = Self::next_nonce(last_nonce)?;
        if supplied != expected {
            return Err(VoucherError::NonceMismatch { expected, supplied });
        }
        Ok(())
    }

    /// Resolve the expiry to sign.
    ///
    /// - `None` → `now + ttl`
    /// - `Some(e)` with `e <= now` → `Expired`
    /// - `Some(e)` with `e > now + ttl` → `OutOfRange`
    pub fn resolve_expiry(&self, requested: Option<u64>, now: u64) -> Result<u64, VoucherError> {
        let max = now
            .checked_add(self.ttl_secs)
            .ok_or_else(|| VoucherError::out_of_range("expiry", "ttl overflows u64"))?;

        match requested {
            None => Ok(max),
            Some(expiry) if expiry <= now => Err(VoucherError::Expired { expiry, now }),
            Some(expiry) if expiry > max => Err(VoucherError::out_of_range(
                "expiry",
                format!("must not exceed now + {}s", self.ttl_secs),
            )),
            Some(expiry) => Ok(expiry),
        }
    }

    /// Seconds until the next claim is allowed. 0 = allowed now.
    pub fn cooldown_remaining(&self, last_claim: u64, now: u64) -> u64 {
        let ready_at = last_claim.saturating_add(self.cooldown_secs);
        ready_at.saturating_sub(now)
    }

    pub fn check_cooldown(&self, last_claim: u64, now: u64) -> Result<(), VoucherError> {
        match self.cooldown_remaining(last_claim, now) {
            0 => Ok(()),
            remaining_secs => Err(VoucherError::CooldownActive { remaining_secs }),
        }
    }

    pub fn is_expired(expiry: u64, now: u64) -> bool {
        now > expiry
    }
}

//! Read-only view of the verifier's per-player claim state.

use async_trait::async_trait;
use primitive_types::U256;

use crate::address::Address;
use crate::error::VoucherError;

/// Query interface terhadap counter milik verifier.
///
/// Implementasi WAJIB mengembalikan `UpstreamReadError` ketika state tidak
/// bisa dibaca. Tidak boleh fallback ke nilai default.
#[async_trait]
pub trait ClaimStateReader: Send + Sync {
    /// Last consumed nonce for `player` (0 if never claimed).
    async fn last_nonce(&self, contract: &Address, player: &Address) -> Result<U256, VoucherError>;

    /// Unix seconds of the last successful claim (0 if never claimed).
    async fn last_claim(&self, contract: &Address, player: &Address) -> Result<u64, VoucherError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimSnapshot {
    pub last_nonce: U256,
    pub last_claim: u64,
}

/// Read nonce and last-claim concurrently.
pub async fn read_snapshot(
    reader: &dyn ClaimStateReader,
    contract: &Address,
    player: &Address,
) -> Result<ClaimSnapshot, VoucherError> {
    let (last_nonce, last_claim) = futures::try_join!(
        reader.last_nonce(contract, player),
        reader.last_claim(contract, player)
    )?;
    Ok(ClaimSnapshot {
        last_nonce,
        last_claim,
    })
}

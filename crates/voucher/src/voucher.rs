//! Signed voucher, the artifact handed to the player.

use primitive_types::U256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::address::Address;
use crate::crypto::VoucherSignature;
use crate::payload::VoucherPayload;

/// Immutable once issued. Consumed at most once by the verifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Voucher {
    pub player: Address,
    /// Token base units.
    #[serde(with = "u256_dec")]
    pub amount: U256,
    #[serde(with = "u256_dec")]
    pub nonce: U256,
    pub expiry: u64,
    pub contract: Address,
    pub signature: VoucherSignature,
}

impl Voucher {
    pub fn payload(&self) -> VoucherPayload {
        VoucherPayload::new(self.player, self.amount, self.nonce, self.expiry, self.contract)
    }
}

/// Serde helper: U256 sebagai string desimal (JSON number tidak aman > 2^53).
pub mod u256_dec {
    use super::*;

    pub fn serialize<S>(value: &U256, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<U256, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        U256::from_dec_str(&s).map_err(|e| serde::de::Error::custom(format!("{:?}", e)))
    }
}

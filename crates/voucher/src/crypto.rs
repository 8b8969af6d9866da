//! crypto helpers for the voucher protocol: keccak hashing, EIP-191 wrapping,
//! recoverable secp256k1 signatures and the operator key.

use std::fmt;

use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Keccak256};
use thiserror::Error;

use crate::address::Address;
use crate::error::VoucherError;

/// Prefix `personal_sign` / `eth_sign` untuk pesan 32 byte.
pub const EIP191_PREFIX: &[u8] = b"\x19Ethereum Signed Message:\n32";

/// Panjang signature `r || s || v`.
pub const SIGNATURE_LEN: usize = 65;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SignatureError {
    #[error("invalid signature length: expected {SIGNATURE_LEN}, found {0}")]
    InvalidLength(usize),

    #[error("invalid recovery byte: {0}")]
    InvalidRecoveryByte(u8),

    #[error("signature s value is not in the lower half order")]
    HighS,

    #[error("malformed signature scalars")]
    Malformed,

    #[error("public key recovery failed")]
    RecoveryFailed,

    #[error("hex decode error: {0}")]
    Hex(#[from] hex::FromHexError),
}

/// compute keccak-256 raw bytes (32 bytes)
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// keccak256("\x19Ethereum Signed Message:\n32" || hash)
pub fn eth_signed_message_hash(hash: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(EIP191_PREFIX);
    hasher.update(hash);
    hasher.finalize().into()
}

/// Derive Address from a secp256k1 public key: keccak256(uncompressed[1..])[12..]
pub fn address_from_verifying_key(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    let mut arr = [0u8; 20];
    arr.copy_from_slice(&hash[12..]);
    Address::from_bytes(arr)
}

// ════════════════════════════════════════════════════════════════════════════
// VOUCHER SIGNATURE
// ════════════════════════════════════════════════════════════════════════════

/// 65-byte recoverable ECDSA signature, `v` in {27, 28}.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoucherSignature(pub [u8; SIGNATURE_LEN]);

impl VoucherSignature {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, SignatureError> {
        if bytes.len() != SIGNATURE_LEN {
            return Err(SignatureError::InvalidLength(bytes.len()));
        }
        let mut arr = [0u8; SIGNATURE_LEN];
        arr.copy_from_slice(bytes);
        Ok(VoucherSignature(arr))
    }

    pub fn from_hex(s: &str) -> Result<Self, SignatureError> {
        let s = s.trim();
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s)?;
        Self::from_slice(&bytes)
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LEN] {
        &self.0
    }

    pub fn v(&self) -> u8 {
        self.0[64]
    }

    fn recovery_id(&self) -> Result<RecoveryId, SignatureError> {
        let v = self.v();
        let byte = match v {
            27 | 28 => v - 27,
            0 | 1 => v,
            other => return Err(SignatureError::InvalidRecoveryByte(other)),
        };
        RecoveryId::from_byte(byte).ok_or(SignatureError::InvalidRecoveryByte(v))
    }
}

impl fmt::Display for VoucherSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for VoucherSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("VoucherSignature").field(&self.to_hex()).finish()
    }
}

impl Serialize for VoucherSignature {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for VoucherSignature {
    fn deserialize<D>(deserializer: D) -> Result<VoucherSignature, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        VoucherSignature::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Recover the signing address from a 32-byte digest.
///
/// High-s signatures are rejected the same way the on-chain ECDSA
/// library rejects them, so a malleated copy of a voucher never recovers.
pub fn recover_signer(
    digest: &[u8; 32],
    signature: &VoucherSignature,
) -> Result<Address, SignatureError> {
    let recovery_id = signature.recovery_id()?;
    let sig = Signature::from_slice(&signature.0[..64]).map_err(|_| SignatureError::Malformed)?;
    if sig.normalize_s().is_some() {
        return Err(SignatureError::HighS);
    }
    let key = VerifyingKey::recover_from_prehash(digest, &sig, recovery_id)
        .map_err(|_| SignatureError::RecoveryFailed)?;
    Ok(address_from_verifying_key(&key))
}

// ════════════════════════════════════════════════════════════════════════════
// OPERATOR SIGNER
// ════════════════════════════════════════════════════════════════════════════

/// Anything that can produce voucher signatures on behalf of the operator.
///
/// `address()` is the identity the on-chain verifier trusts; the voucher
/// signer checks every produced signature against it.
pub trait OperatorSigner: Send + Sync {
    fn address(&self) -> Address;

    /// Sign an already EIP-191 wrapped digest. Must return `r || s || v`.
    fn sign_digest(&self, digest: &[u8; 32]) -> Result<VoucherSignature, VoucherError>;
}

/// In-memory secp256k1 operator key.
pub struct OperatorKey {
    key: SigningKey,
    address: Address,
}

impl OperatorKey {
    pub fn from_bytes(secret: &[u8]) -> Result<Self, VoucherError> {
        let key = SigningKey::from_slice(secret).map_err(|_| VoucherError::InvalidOperatorKey)?;
        let address = address_from_verifying_key(key.verifying_key());
        Ok(Self { key, address })
    }

    /// Parse hex private key (with or without `0x`).
    pub fn from_hex(s: &str) -> Result<Self, VoucherError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(VoucherError::MissingOperatorKey);
        }
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s).map_err(|_| VoucherError::InvalidOperatorKey)?;
        if bytes.len() != 32 {
            return Err(VoucherError::InvalidOperatorKey);
        }
        Self::from_bytes(&bytes)
    }
}

impl OperatorSigner for OperatorKey {
    fn address(&self) -> Address {
        self.address
    }

    fn sign_digest(&self, digest: &[u8; 32]) -> Result<VoucherSignature, VoucherError> {
        let (sig, recovery_id) = self
            .key
            .sign_prehash_recoverable(digest)
            .map_err(|e| VoucherError::SigningIntegrityError(format!("ecdsa signing failed: {}", e)))?;

        let mut out = [0u8; SIGNATURE_LEN];
        out[..64].copy_from_slice(&sig.to_bytes());
        out[64] = recovery_id.to_byte() + 27;
        Ok(VoucherSignature(out))
    }
}

impl fmt::Debug for OperatorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperatorKey")
            .field("address", &self.address)
            .field("key", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Well-known development key (hardhat/anvil account #0).
    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const DEV_ADDR: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

    #[test]
    fn keccak_empty_vector() {
        assert_eq!(
            hex::encode(keccak256(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn eth_signed_message_hash_matches_manual_prefix() {
        let hash = keccak256(b"voucher");
        let mut buf = Vec::new();
        buf.extend_from_slice(b"\x19Ethereum Signed Message:\n32");
        buf.extend_from_slice(&hash);
        assert_eq!(eth_signed_message_hash(&hash), keccak256(&buf));
    }

    #[test]
    fn operator_address_derivation() {
        let key = OperatorKey::from_hex(DEV_KEY).expect("key");
        assert_eq!(key.address().to_string(), DEV_ADDR);
    }

    #[test]
    fn sign_and_recover_roundtrip() {
        let key = OperatorKey::from_hex(DEV_KEY).expect("key");
        let digest = eth_signed_message_hash(&keccak256(b"payload"));
        let sig = key.sign_digest(&digest).expect("sign");
        assert!(sig.v() == 27 || sig.v() == 28);
        assert_eq!(recover_signer(&digest, &sig).expect("recover"), key.address());

        // different digest recovers someone else
        let other = eth_signed_message_hash(&keccak256(b"tampered"));
        assert_ne!(recover_signer(&other, &sig).ok(), Some(key.address()));
    }

    #[test]
    fn recovery_byte_zero_one_accepted() {
        let key = OperatorKey::from_hex(DEV_KEY).expect("key");
        let digest = keccak256(b"raw");
        let mut sig = key.sign_digest(&digest).expect("sign");
        sig.0[64] -= 27;
        assert_eq!(recover_signer(&digest, &sig).expect("recover"), key.address());
    }

    #[test]
    fn invalid_recovery_byte_rejected() {
        let key = OperatorKey::from_hex(DEV_KEY).expect("key");
        let digest = keccak256(b"raw");
        let mut sig = key.sign_digest(&digest).expect("sign");
        sig.0[64] = 35;
        assert_eq!(
            recover_signer(&digest, &sig),
            Err(SignatureError::InvalidRecoveryByte(35))
        );
    }

    #[test]
    fn signature_hex_roundtrip_and_length_check() {
        let key = OperatorKey::from_hex(DEV_KEY).expect("key");
        let sig = key.sign_digest(&keccak256(b"x")).expect("sign");
        let parsed = VoucherSignature::from_hex(&sig.to_hex()).expect("parse");
        assert_eq!(parsed, sig);
        assert_eq!(
            VoucherSignature::from_slice(&[0u8; 64]),
            Err(SignatureError::InvalidLength(64))
        );
    }

    #[test]
    fn operator_key_parse_errors() {
        assert_eq!(OperatorKey::from_hex("").err(), Some(VoucherError::MissingOperatorKey));
        assert_eq!(OperatorKey::from_hex("0x1234").err(), Some(VoucherError::InvalidOperatorKey));
        assert_eq!(
            OperatorKey::from_hex(&"00".repeat(32)).err(),
            Some(VoucherError::InvalidOperatorKey)
        );
        assert_eq!(
            OperatorKey::from_hex("not-hex-at-all").err(),
            Some(VoucherError::InvalidOperatorKey)
        );
    }

    #[test]
    fn debug_redacts_key() {
        let key = OperatorKey::from_hex(DEV_KEY).expect("key");
        let dbg = format!("{:?}", key);
        assert!(dbg.contains("<redacted>"));
        assert!(!dbg.contains("ac0974bec39a17e3"));
    }
}

//! # HBIRD Voucher Protocol
//!
//! Protocol core untuk menukar poin game off-chain menjadi token on-chain.
//!
//! ## Alur
//!
//! ```text
//! client ──points──▶ VoucherSigner ──voucher──▶ client ──claimReward──▶ verifier
//!                         │                                               │
//!                         └────── ClaimStateReader (read-only) ◀──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module         | Isi                                                  |
//! |----------------|------------------------------------------------------|
//! | `address`      | 20-byte address, EIP-55                              |
//! | `crypto`       | keccak, EIP-191, recoverable secp256k1, operator key |
//! | `payload`      | Canonical ABI payload (satu-satunya builder)         |
//! | `conversion`   | Points → base units, integer exact                   |
//! | `policy`       | Nonce / expiry / cooldown rules                      |
//! | `request`      | Raw query → `VoucherRequest`                         |
//! | `state`        | `ClaimStateReader` trait                             |
//! | `signer`       | `VoucherSigner::issue` + self-check                  |
//! | `verifier`     | Reference `claimReward`                              |
//! | `error`        | `VoucherError` taxonomy                              |

pub mod address;
pub mod conversion;
pub mod crypto;
pub mod error;
pub mod payload;
pub mod policy;
pub mod request;
pub mod signer;
pub mod state;
pub mod verifier;
pub mod voucher;

pub use address::{Address, AddressError};
pub use conversion::{ConversionError, ConversionRate};
pub use crypto::{recover_signer, OperatorKey, OperatorSigner, SignatureError, VoucherSignature};
pub use error::VoucherError;
pub use payload::VoucherPayload;
pub use policy::ClaimPolicy;
pub use request::{SignQuery, VoucherRequest};
pub use signer::{IssuedVoucher, VoucherSigner};
pub use state::{ClaimSnapshot, ClaimStateReader};
pub use verifier::{ClaimReceipt, ClaimRejection, ClaimVerifier, PlayerClaimState};
pub use voucher::Voucher;

/// Re-export so downstream crates share the same U256.
pub use primitive_types::U256;

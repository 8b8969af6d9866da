//! # HBIRD Signer Service
//!
//! HTTP gateway yang menerbitkan voucher reward untuk player.
//!
//! ## Architecture
//! ```text
//! Game client → Signer (axum) → VoucherSigner → operator key
//!                    │
//!                    └──→ JSON-RPC eth_call (lastNonce / lastClaim)
//! ```
//!
//! ## Modules
//! - app: AppState, router, trace-id middleware, CORS
//! - handlers: sign / health / ready / metrics
//! - chain_client: JSON-RPC claim-state reader
//! - config: environment configuration
//! - error: VoucherError → HTTP
//! - rate_limit: token bucket middleware
//! - metrics: Prometheus counters

pub mod app;
pub mod chain_client;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod rate_limit;

pub use app::{build_router, limiter_from_config, AppState};
pub use config::SignerConfig;

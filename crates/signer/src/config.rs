//! # Signer Configuration
//!
//! Semua konfigurasi diambil dari environment variable (opsional dimuat dari
//! file dotenv lewat [`load_env_file`]).
//!
//! | Variable                    | Default          |
//! |-----------------------------|------------------|
//! | `OPERATOR_PRIVATE_KEY`      | (none)           |
//! | `SIGNER_LISTEN_ADDR`        | `127.0.0.1:3000` |
//! | `VOUCHER_DEFAULT_CONTRACT`  | (none)           |
//! | `CHAIN_RPC_URL`             | (none)           |
//! | `CHAIN_RPC_TIMEOUT_MS`      | `3000`           |
//! | `REQUEST_TIMEOUT_MS`        | `5000`           |
//! | `VOUCHER_TTL_SECS`          | `3600`           |
//! | `CLAIM_COOLDOWN_SECS`       | `30`             |
//! | `TOKENS_PER_POINT`          | `0.5`            |
//! | `TOKEN_DECIMALS`            | `18`             |
//! | `RATE_LIMIT_PER_IP_RPS`     | `10`             |
//! | `RATE_LIMIT_PER_IP_BURST`   | `20`             |
//! | `RATE_LIMIT_GLOBAL_RPS`     | `200`            |
//! | `RATE_LIMIT_GLOBAL_BURST`   | `400`            |
//! | `RATE_LIMIT_MAX_TRACKED_KEYS` | `10000`        |
//! | `TRUST_FORWARDED_HEADERS`   | `false`          |
//! | `LOG_LEVEL`                 | `info`           |
//!
//! Operator key yang kosong/tidak ada TIDAK menggagalkan startup: service
//! tetap jalan, `/ready` 503 dan `/sign` 500. Key yang malformed
//! menggagalkan startup.
//!
//! `TRUST_FORWARDED_HEADERS` hanya boleh `true` di belakang reverse proxy
//! yang menimpa `x-forwarded-for`; selain itu limiter per-IP memakai
//! alamat peer TCP.

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use hbird_voucher::conversion::{DEFAULT_TOKENS_PER_POINT, DEFAULT_TOKEN_DECIMALS};
use hbird_voucher::policy::{DEFAULT_COOLDOWN_SECS, DEFAULT_TTL_SECS};
use hbird_voucher::{Address, ClaimPolicy, ConversionRate, OperatorKey, VoucherError};

pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:3000";
pub const DEFAULT_CHAIN_RPC_TIMEOUT_MS: u64 = 3000;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_RATE_LIMIT_MAX_TRACKED_KEYS: usize = 10_000;

#[derive(Clone)]
pub struct SignerConfig {
    /// Hex private key. Tidak pernah di-log.
    pub operator_private_key: Option<String>,
    pub listen_addr: SocketAddr,
    pub default_contract: Option<Address>,
    pub chain_rpc_url: Option<String>,
    pub chain_rpc_timeout: Duration,
    pub request_timeout: Duration,
    pub ttl_secs: u64,
    pub cooldown_secs: u64,
    pub tokens_per_point: String,
    pub token_decimals: u8,
    pub per_ip_rps: u32,
    pub per_ip_burst: u32,
    pub global_rps: u32,
    pub global_burst: u32,
    /// Upper bound on rate-limit buckets held in memory.
    pub rate_limit_max_keys: usize,
    /// Key the per-IP limit on `x-forwarded-for` / `x-real-ip`.
    pub trust_forwarded_headers: bool,
    pub log_level: String,
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            operator_private_key: None,
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            default_contract: None,
            chain_rpc_url: None,
            chain_rpc_timeout: Duration::from_millis(DEFAULT_CHAIN_RPC_TIMEOUT_MS),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            ttl_secs: DEFAULT_TTL_SECS,
            cooldown_secs: DEFAULT_COOLDOWN_SECS,
            tokens_per_point: DEFAULT_TOKENS_PER_POINT.to_string(),
            token_decimals: DEFAULT_TOKEN_DECIMALS,
            per_ip_rps: 10,
            per_ip_burst: 20,
            global_rps: 200,
            global_burst: 400,
            rate_limit_max_keys: DEFAULT_RATE_LIMIT_MAX_TRACKED_KEYS,
            trust_forwarded_headers: false,
            log_level: "info".to_string(),
        }
    }
}

impl SignerConfig {
    /// Load configuration from process environment.
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        let listen_addr = match get("SIGNER_LISTEN_ADDR") {
            Some(raw) => raw
                .parse::<SocketAddr>()
                .map_err(|e| format!("SIGNER_LISTEN_ADDR `{}` invalid: {}", raw, e))?,
            None => defaults.listen_addr,
        };

        let default_contract = match get("VOUCHER_DEFAULT_CONTRACT") {
            Some(raw) => Some(
                Address::parse(&raw)
                    .map_err(|e| format!("VOUCHER_DEFAULT_CONTRACT invalid: {}", e))?,
            ),
            None => None,
        };

        Ok(Self {
            operator_private_key: get("OPERATOR_PRIVATE_KEY"),
            listen_addr,
            default_contract,
            chain_rpc_url: get("CHAIN_RPC_URL"),
            chain_rpc_timeout: Duration::from_millis(parse_or(
                get("CHAIN_RPC_TIMEOUT_MS"),
                "CHAIN_RPC_TIMEOUT_MS",
                DEFAULT_CHAIN_RPC_TIMEOUT_MS,
            )?),
            request_timeout: Duration::from_millis(parse_or(
                get("REQUEST_TIMEOUT_MS"),
                "REQUEST_TIMEOUT_MS",
                DEFAULT_REQUEST_TIMEOUT_MS,
            )?),
            ttl_secs: parse_or(get("VOUCHER_TTL_SECS"), "VOUCHER_TTL_SECS", defaults.ttl_secs)?,
            cooldown_secs: parse_or(
                get("CLAIM_COOLDOWN_SECS"),
                "CLAIM_COOLDOWN_SECS",
                defaults.cooldown_secs,
            )?,
            tokens_per_point: get("TOKENS_PER_POINT").unwrap_or(defaults.tokens_per_point),
            token_decimals: parse_or(get("TOKEN_DECIMALS"), "TOKEN_DECIMALS", defaults.token_decimals)?,
            per_ip_rps: parse_or(get("RATE_LIMIT_PER_IP_RPS"), "RATE_LIMIT_PER_IP_RPS", defaults.per_ip_rps)?,
            per_ip_burst: parse_or(
                get("RATE_LIMIT_PER_IP_BURST"),
                "RATE_LIMIT_PER_IP_BURST",
                defaults.per_ip_burst,
            )?,
            global_rps: parse_or(get("RATE_LIMIT_GLOBAL_RPS"), "RATE_LIMIT_GLOBAL_RPS", defaults.global_rps)?,
            global_burst: parse_or(
                get("RATE_LIMIT_GLOBAL_BURST"),
                "RATE_LIMIT_GLOBAL_BURST",
                defaults.global_burst,
            )?,
            rate_limit_max_keys: parse_or(
                get("RATE_LIMIT_MAX_TRACKED_KEYS"),
                "RATE_LIMIT_MAX_TRACKED_KEYS",
                defaults.rate_limit_max_keys,
            )?,
            trust_forwarded_headers: parse_or(
                get("TRUST_FORWARDED_HEADERS").map(|v| v.to_lowercase()),
                "TRUST_FORWARDED_HEADERS",
                defaults.trust_forwarded_headers,
            )?,
            log_level: get("LOG_LEVEL")
                .map(|l| l.to_lowercase())
                .unwrap_or(defaults.log_level),
        })
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.request_timeout.is_zero() {
            return Err("REQUEST_TIMEOUT_MS cannot be 0".to_string());
        }
        if self.chain_rpc_timeout.is_zero() {
            return Err("CHAIN_RPC_TIMEOUT_MS cannot be 0".to_string());
        }
        if self.ttl_secs == 0 {
            return Err("VOUCHER_TTL_SECS cannot be 0".to_string());
        }
        if self.per_ip_rps == 0 || self.per_ip_burst == 0 {
            return Err("per-IP rate limit values must be greater than 0".to_string());
        }
        if self.global_rps == 0 || self.global_burst == 0 {
            return Err("global rate limit values must be greater than 0".to_string());
        }
        if self.rate_limit_max_keys == 0 {
            return Err("RATE_LIMIT_MAX_TRACKED_KEYS cannot be 0".to_string());
        }

        self.conversion_rate()?;
        self.tracing_level()?;

        if let Some(url) = &self.chain_rpc_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(format!("CHAIN_RPC_URL must be an http(s) URL, got `{}`", url));
            }
        }

        if let Some(contract) = &self.default_contract {
            if contract.is_zero() {
                return Err("VOUCHER_DEFAULT_CONTRACT cannot be the zero address".to_string());
            }
        }

        // fail closed on a malformed key; a missing key is allowed
        self.operator_key()
            .map_err(|e| format!("OPERATOR_PRIVATE_KEY: {}", e))?;

        Ok(())
    }

    pub fn conversion_rate(&self) -> Result<ConversionRate, String> {
        ConversionRate::parse(&self.tokens_per_point, self.token_decimals)
            .map_err(|e| format!("TOKENS_PER_POINT: {}", e))
    }

    pub fn claim_policy(&self) -> ClaimPolicy {
        ClaimPolicy::new(self.ttl_secs, self.cooldown_secs)
    }

    /// `Ok(None)` when no key is configured.
    pub fn operator_key(&self) -> Result<Option<OperatorKey>, VoucherError> {
        match &self.operator_private_key {
            Some(raw) => OperatorKey::from_hex(raw).map(Some),
            None => Ok(None),
        }
    }

    pub fn tracing_level(&self) -> Result<tracing::Level, String> {
        self.log_level
            .parse::<tracing::Level>()
            .map_err(|_| format!("LOG_LEVEL `{}` is not a valid level", self.log_level))
    }
}

impl std::fmt::Debug for SignerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignerConfig")
            .field(
                "operator_private_key",
                &self.operator_private_key.as_ref().map(|_| "<redacted>"),
            )
            .field("listen_addr", &self.listen_addr)
            .field("default_contract", &self.default_contract)
            .field("chain_rpc_url", &self.chain_rpc_url)
            .field("chain_rpc_timeout", &self.chain_rpc_timeout)
            .field("request_timeout", &self.request_timeout)
            .field("ttl_secs", &self.ttl_secs)
            .field("cooldown_secs", &self.cooldown_secs)
            .field("tokens_per_point", &self.tokens_per_point)
            .field("token_decimals", &self.token_decimals)
            .field("per_ip_rps", &self.per_ip_rps)
            .field("per_ip_burst", &self.per_ip_burst)
            .field("global_rps", &self.global_rps)
            .field("global_burst", &self.global_burst)
            .field("rate_limit_max_keys", &self.rate_limit_max_keys)
            .field("trust_forwarded_headers", &self.trust_forwarded_headers)
            .field("log_level", &self.log_level)
            .finish()
    }
}

fn parse_or<T>(raw: Option<String>, key: &str, default: T) -> Result<T, String>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(v) => v
            .parse::<T>()
            .map_err(|e| format!("{} `{}` invalid: {}", key, v, e)),
        None => Ok(default),
    }
}

/// Load env file: `SIGNER_ENV_FILE`, else `.env` if present.
///
/// Dipanggil sebelum tracing diinisialisasi, jadi hasilnya dikembalikan
/// ke caller untuk di-log.
pub fn load_env_file() -> Option<String> {
    let env_file = env::var("SIGNER_ENV_FILE").unwrap_or_else(|_| ".env".to_string());

    match dotenvy::from_filename(&env_file) {
        Ok(path) => Some(path.display().to_string()),
        Err(e) => {
            // missing file is fine
            if !matches!(e, dotenvy::Error::Io(_)) {
                eprintln!("Warning: failed to load {}: {}", env_file, e);
            }
            None
        }
    }
}

//! JSON-RPC client yang membaca claim state langsung dari kontrak voucher.
//!
//! `eth_call` ke `lastNonce(address)` dan `lastClaim(address)`. Semua
//! kegagalan (timeout, transport, JSON-RPC error, hasil malformed) menjadi
//! `UpstreamReadError`. Tidak pernah fallback ke 0.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use hbird_voucher::crypto::keccak256;
use hbird_voucher::payload::address_word;
use hbird_voucher::{Address, ClaimStateReader, VoucherError, U256};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

pub const LAST_NONCE_SIGNATURE: &str = "lastNonce(address)";
pub const LAST_CLAIM_SIGNATURE: &str = "lastClaim(address)";

/// First 4 bytes of keccak256 of the function signature.
pub fn function_selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// `selector || abi.encode(address)` as 0x-hex.
pub fn encode_address_call(signature: &str, arg: &Address) -> String {
    let mut data = Vec::with_capacity(36);
    data.extend_from_slice(&function_selector(signature));
    data.extend_from_slice(&address_word(arg));
    format!("0x{}", hex::encode(data))
}

/// Decode the first 32-byte word of an `eth_call` result.
pub fn decode_uint_result(result: &str) -> Result<U256, VoucherError> {
    let body = result.strip_prefix("0x").unwrap_or(result);
    let bytes = hex::decode(body)
        .map_err(|e| VoucherError::UpstreamReadError(format!("eth_call result is not hex: {}", e)))?;
    if bytes.len() < 32 {
        return Err(VoucherError::UpstreamReadError(format!(
            "eth_call returned {} bytes, expected a 32-byte word",
            bytes.len()
        )));
    }
    Ok(U256::from_big_endian(&bytes[..32]))
}

#[derive(Debug, Serialize)]
struct RpcRequest {
    jsonrpc: &'static str,
    id: u64,
    method: &'static str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

pub struct JsonRpcClaimReader {
    url: String,
    client: Client,
    next_id: AtomicU64,
}

impl JsonRpcClaimReader {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url: url.into(),
            client,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call_uint(
        &self,
        contract: &Address,
        signature: &str,
        player: &Address,
    ) -> Result<U256, VoucherError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest {
            jsonrpc: "2.0",
            id,
            method: "eth_call",
            params: json!([
                { "to": contract.to_hex(), "data": encode_address_call(signature, player) },
                "latest"
            ]),
        };

        let upstream = |what: String| {
            warn!(
                rpc_url = %self.url,
                call = signature,
                player = %player,
                error = %what,
                "claim state read failed"
            );
            VoucherError::UpstreamReadError(what)
        };

        let resp = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| upstream(format!("rpc transport error: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(upstream(format!("rpc http status {}: {}", status, body)));
        }

        let parsed: RpcResponse = resp
            .json()
            .await
            .map_err(|e| upstream(format!("rpc response not json: {}", e)))?;

        if let Some(err) = parsed.error {
            return Err(upstream(format!("rpc error {}: {}", err.code, err.message)));
        }
        let result = parsed
            .result
            .ok_or_else(|| upstream("rpc response has no result".to_string()))?;
        let value = decode_uint_result(&result).map_err(|e| upstream(e.to_string()))?;

        debug!(call = signature, player = %player, value = %value, "claim state read");
        Ok(value)
    }
}

impl std::fmt::Debug for JsonRpcClaimReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonRpcClaimReader")
            .field("url", &self.url)
            .finish()
    }
}

#[async_trait]
impl ClaimStateReader for JsonRpcClaimReader {
    async fn last_nonce(&self, contract: &Address, player: &Address) -> Result<U256, VoucherError> {
        self.call_uint(contract, LAST_NONCE_SIGNATURE, player).await
    }

    async fn last_claim(&self, contract: &Address, player: &Address) -> Result<u64, VoucherError> {
        let value = self.call_uint(contract, LAST_CLAIM_SIGNATURE, player).await?;
        if value > U256::from(u64::MAX) {
            return Err(VoucherError::UpstreamReadError(format!(
                "lastClaim {} does not fit unix seconds",
                value
            )));
        }
        Ok(value.low_u64())
    }
}

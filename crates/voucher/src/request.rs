//! Validation of raw sign requests.
//!
//! Query string dari client berupa string mentah. Modul ini mengubahnya
//! menjadi [`VoucherRequest`] yang typed, atau error yang spesifik:
//!
//! - field wajib hilang / bukan angka → `InvalidRequest`
//! - angka negatif / nol / melebihi lebar field → `OutOfRange`
//! - address malformed / checksum salah / zero address → `InvalidAddress`

use primitive_types::U256;
use serde::Deserialize;

use crate::address::Address;
use crate::error::VoucherError;

/// Raw query parameters. `amount` is the name the game client sends and is
/// treated as an alias for `points`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignQuery {
    pub player: Option<String>,
    pub points: Option<String>,
    pub amount: Option<String>,
    pub nonce: Option<String>,
    pub expiry: Option<String>,
    pub contract_address: Option<String>,
}

/// Validated sign request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoucherRequest {
    pub player: Address,
    pub points: U256,
    /// `None` = ambil dari claim-state source.
    pub nonce: Option<U256>,
    /// `None` = `now + ttl`.
    pub expiry: Option<u64>,
    pub contract: Address,
}

impl SignQuery {
    pub fn validate(&self, default_contract: Option<Address>) -> Result<VoucherRequest, VoucherError> {
        let player_raw = present(&self.player)
            .ok_or_else(|| VoucherError::InvalidRequest("missing `player`".to_string()))?;
        let player = parse_address("player", player_raw)?;

        // `amount` is the client's name for points; compare as numbers
        let points = match (present(&self.points), present(&self.amount)) {
            (Some(p), Some(a)) => {
                let points = parse_uint("points", p)?;
                if parse_uint("amount", a)? != points {
                    return Err(VoucherError::InvalidRequest(
                        "`points` and `amount` disagree".to_string(),
                    ));
                }
                points
            }
            (Some(p), None) => parse_uint("points", p)?,
            (None, Some(a)) => parse_uint("amount", a)?,
            (None, None) => {
                return Err(VoucherError::InvalidRequest(
                    "missing `points`".to_string(),
                ))
            }
        };
        if points.is_zero() {
            return Err(VoucherError::out_of_range("points", "must be greater than zero"));
        }

        let nonce = match present(&self.nonce) {
            Some(raw) => {
                let nonce = parse_uint("nonce", raw)?;
                if nonce.is_zero() {
                    return Err(VoucherError::out_of_range("nonce", "nonce 0 is never redeemable"));
                }
                Some(nonce)
            }
            None => None,
        };

        let expiry = present(&self.expiry)
            .map(|raw| parse_u64("expiry", raw))
            .transpose()?;

        let contract = match present(&self.contract_address) {
            Some(raw) => parse_address("contractAddress", raw)?,
            None => default_contract.ok_or_else(|| {
                VoucherError::InvalidRequest(
                    "missing `contractAddress` and no default deployment configured".to_string(),
                )
            })?,
        };
        if contract.is_zero() {
            return Err(VoucherError::invalid_address("contractAddress", "zero address"));
        }

        Ok(VoucherRequest {
            player,
            points,
            nonce,
            expiry,
            contract,
        })
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Parse a non-zero, checksummed-or-uniform-case address.
pub fn parse_address(field: &'static str, raw: &str) -> Result<Address, VoucherError> {
    let addr = Address::parse(raw).map_err(|e| VoucherError::invalid_address(field, e))?;
    if addr.is_zero() {
        return Err(VoucherError::invalid_address(field, "zero address"));
    }
    Ok(addr)
}

/// Parse a decimal uint256.
pub fn parse_uint(field: &'static str, raw: &str) -> Result<U256, VoucherError> {
    check_digits(field, raw)?;
    U256::from_dec_str(raw).map_err(|_| VoucherError::out_of_range(field, "exceeds uint256"))
}

pub fn parse_u64(field: &'static str, raw: &str) -> Result<u64, VoucherError> {
    check_digits(field, raw)?;
    raw.parse::<u64>()
        .map_err(|_| VoucherError::out_of_range(field, "exceeds 64-bit unix seconds"))
}

fn check_digits(field: &'static str, raw: &str) -> Result<(), VoucherError> {
    if let Some(rest) = raw.strip_prefix('-') {
        if !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()) {
            return Err(VoucherError::out_of_range(field, "must not be negative"));
        }
    }
    if raw.is_empty() || !raw.chars().all(|c| c.is_ascii_digit()) {
        return Err(VoucherError::InvalidRequest(format!(
            "`{}` must be a non-negative integer",
            field
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAYER: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";
    const CONTRACT: &str = "0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359";

    fn query() -> SignQuery {
        SignQuery {
            player: Some(PLAYER.to_string()),
            points: Some("100".to_string()),
            nonce: Some("1".to_string()),
            contract_address: Some(CONTRACT.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_request() {
        let req = query().validate(None).expect("valid");
        assert_eq!(req.player.to_string(), PLAYER);
        assert_eq!(req.points, U256::from(100u64));
        assert_eq!(req.nonce, Some(U256::one()));
        assert_eq!(req.expiry, None);
        assert_eq!(req.contract.to_string(), CONTRACT);
    }

    #[test]
    fn test_amount_alias() {
        let mut q = query();
        q.points = None;
        q.amount = Some("42".to_string());
        assert_eq!(q.validate(None).expect("alias").points, U256::from(42u64));

        q.points = Some("42".to_string());
        assert!(q.validate(None).is_ok());

        q.points = Some("43".to_string());
        assert_eq!(q.validate(None).unwrap_err().code(), "InvalidRequest");
    }

    #[test]
    fn test_amount_alias_compared_numerically() {
        let mut q = query();
        q.points = Some("07".to_string());
        q.amount = Some("7".to_string());
        assert_eq!(q.validate(None).expect("same number").points, U256::from(7u64));

        q.points = Some("0x7".to_string());
        assert_eq!(q.validate(None).unwrap_err().code(), "InvalidRequest");

        q.points = Some("7".to_string());
        q.amount = Some("-7".to_string());
        assert_eq!(q.validate(None).unwrap_err().code(), "OutOfRange");
    }

    #[test]
    fn test_missing_fields() {
        let mut q = query();
        q.player = None;
        assert_eq!(q.validate(None).unwrap_err().code(), "InvalidRequest");

        let mut q = query();
        q.points = Some("  ".to_string());
        assert_eq!(q.validate(None).unwrap_err().code(), "InvalidRequest");

        let mut q = query();
        q.contract_address = None;
        assert_eq!(q.validate(None).unwrap_err().code(), "InvalidRequest");
    }

    #[test]
    fn test_default_contract_fallback() {
        let mut q = query();
        q.contract_address = None;
        let default = Address::parse(CONTRACT).expect("addr");
        assert_eq!(q.validate(Some(default)).expect("fallback").contract, default);
    }

    #[test]
    fn test_numeric_errors() {
        for (raw, code) in [
            ("-5", "OutOfRange"),
            ("0", "OutOfRange"),
            ("abc", "InvalidRequest"),
            ("1.5", "InvalidRequest"),
            ("-", "InvalidRequest"),
            (
                "1157920892373161954235709850086879078532699846656405640394575840079131296399360",
                "OutOfRange",
            ),
        ] {
            let mut q = query();
            q.points = Some(raw.to_string());
            assert_eq!(q.validate(None).unwrap_err().code(), code, "points={}", raw);
        }
    }

    #[test]
    fn test_nonce_and_expiry_rules() {
        let mut q = query();
        q.nonce = Some("0".to_string());
        assert_eq!(q.validate(None).unwrap_err().code(), "OutOfRange");

        let mut q = query();
        q.nonce = None;
        assert_eq!(q.validate(None).expect("no nonce").nonce, None);

        let mut q = query();
        q.expiry = Some("18446744073709551616".to_string());
        assert_eq!(q.validate(None).unwrap_err().code(), "OutOfRange");

        let mut q = query();
        q.expiry = Some("1700003600".to_string());
        assert_eq!(q.validate(None).expect("expiry").expiry, Some(1_700_003_600));
    }

    #[test]
    fn test_address_errors() {
        let mut q = query();
        q.player = Some("0x1234".to_string());
        assert_eq!(q.validate(None).unwrap_err().code(), "InvalidAddress");

        let mut q = query();
        q.player = Some(PLAYER.replacen("aAeb", "aaeb", 1));
        assert_eq!(q.validate(None).unwrap_err().code(), "InvalidAddress");

        let mut q = query();
        q.contract_address = Some(format!("0x{}", "0".repeat(40)));
        assert_eq!(q.validate(None).unwrap_err().code(), "InvalidAddress");
    }

    #[test]
    fn test_deserialize_camel_case() {
        let q: SignQuery = serde_json::from_str(
            r#"{"player":"0xabc","amount":"5","contractAddress":"0xdef"}"#,
        )
        .expect("json");
        assert_eq!(q.amount.as_deref(), Some("5"));
        assert_eq!(q.contract_address.as_deref(), Some("0xdef"));
    }
}

//! Points → token base units.
//!
//! Rate dikonfigurasi sebagai string desimal (mis. `"0.5"`) dan dikonversi
//! SEKALI ke integer `units_per_point = rate * 10^decimals`. Semua
//! perhitungan setelahnya murni integer U256, tanpa floating point.

use std::fmt;

use primitive_types::U256;
use thiserror::Error;

use crate::error::VoucherError;

pub const DEFAULT_TOKENS_PER_POINT: &str = "0.5";
pub const DEFAULT_TOKEN_DECIMALS: u8 = 18;

/// 10^77 masih muat di 256 bit, 10^78 tidak.
pub const MAX_DECIMALS: u8 = 77;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionError {
    #[error("conversion rate is empty")]
    Empty,

    #[error("conversion rate `{0}` is not a plain decimal number")]
    Malformed(String),

    #[error("conversion rate `{rate}` has more fractional digits than {decimals} decimals")]
    NotRepresentable { rate: String, decimals: u8 },

    #[error("conversion rate must be greater than zero")]
    ZeroRate,

    #[error("token decimals {0} exceed the 256-bit range")]
    DecimalsTooLarge(u8),

    #[error("conversion rate overflows 256 bits")]
    Overflow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversionRate {
    units_per_point: U256,
    decimals: u8,
}

impl ConversionRate {
    /// Parse rate desimal. Pecahan yang tidak habis dibagi ke base unit
    /// adalah error konfigurasi, bukan dibulatkan.
    pub fn parse(rate: &str, decimals: u8) -> Result<Self, ConversionError> {
        if decimals > MAX_DECIMALS {
            return Err(ConversionError::DecimalsTooLarge(decimals));
        }

        let rate = rate.trim();
        if rate.is_empty() {
            return Err(ConversionError::Empty);
        }

        let (int_part, frac_part) = match rate.split_once('.') {
            Some((i, f)) => (i, f),
            None => (rate, ""),
        };

        if int_part.is_empty() && frac_part.is_empty() {
            return Err(ConversionError::Malformed(rate.to_string()));
        }
        let all_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
        if !all_digits(int_part) || !all_digits(frac_part) {
            return Err(ConversionError::Malformed(rate.to_string()));
        }

        // trailing zeros in the fraction carry no value
        let frac_part = frac_part.trim_end_matches('0');
        if frac_part.len() > decimals as usize {
            return Err(ConversionError::NotRepresentable {
                rate: rate.to_string(),
                decimals,
            });
        }

        let scale = U256::exp10(decimals as usize);
        let int_value = parse_digits(int_part)?;
        let mut units = int_value
            .checked_mul(scale)
            .ok_or(ConversionError::Overflow)?;

        if !frac_part.is_empty() {
            let frac_value = parse_digits(frac_part)?;
            let frac_scale = U256::exp10(decimals as usize - frac_part.len());
            let frac_units = frac_value
                .checked_mul(frac_scale)
                .ok_or(ConversionError::Overflow)?;
            units = units
                .checked_add(frac_units)
                .ok_or(ConversionError::Overflow)?;
        }

        if units.is_zero() {
            return Err(ConversionError::ZeroRate);
        }

        Ok(Self {
            units_per_point: units,
            decimals,
        })
    }

    pub fn units_per_point(&self) -> U256 {
        self.units_per_point
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    /// `points * units_per_point`. Zero points and overflow are rejected.
    pub fn points_to_base_units(&self, points: U256) -> Result<U256, VoucherError> {
        if points.is_zero() {
            return Err(VoucherError::out_of_range(
                "points",
                "must be greater than zero",
            ));
        }
        points
            .checked_mul(self.units_per_point)
            .ok_or_else(|| VoucherError::out_of_range("points", "token amount overflows uint256"))
    }

    /// Human-readable token amount for this rate's decimals.
    pub fn format_tokens(&self, amount: U256) -> String {
        format_units(amount, self.decimals)
    }
}

impl Default for ConversionRate {
    fn default() -> Self {
        // 0.5 * 10^18
        Self {
            units_per_point: U256::exp10(DEFAULT_TOKEN_DECIMALS as usize) / 2,
            decimals: DEFAULT_TOKEN_DECIMALS,
        }
    }
}

impl fmt::Display for ConversionRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} tokens/point",
            format_units(self.units_per_point, self.decimals)
        )
    }
}

fn parse_digits(s: &str) -> Result<U256, ConversionError> {
    if s.is_empty() {
        return Ok(U256::zero());
    }
    U256::from_dec_str(s).map_err(|_| ConversionError::Overflow)
}

/// Format base units as a decimal token string: `50000000000000000000`
/// with 18 decimals becomes `50.0`, `1500000000000000000` becomes `1.5`.
pub fn format_units(amount: U256, decimals: u8) -> String {
    if decimals == 0 {
        return format!("{}.0", amount);
    }
    let scale = U256::exp10(decimals as usize);
    let whole = amount / scale;
    let frac = amount % scale;

    let frac_str = format!("{:0>width$}", frac.to_string(), width = decimals as usize);
    let frac_str = frac_str.trim_end_matches('0');
    if frac_str.is_empty() {
        format!("{}.0", whole)
    } else {
        format!("{}.{}", whole, frac_str)
    }
}

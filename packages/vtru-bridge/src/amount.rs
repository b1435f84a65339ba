//! Token Amount Helpers
//!
//! Exact conversion between human-readable decimal strings and on-chain base
//! units. All arithmetic is done on `U256`; no floating point is involved, so
//! an amount submitted on chain is exactly the amount the user typed.

use alloy::primitives::U256;
use serde::Serialize;
use std::fmt;

/// Asset metadata needed for unit conversion and display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Asset {
    pub symbol: &'static str,
    pub decimals: u8,
}

/// Native VTRU on Vitruveo
pub const VTRU: Asset = Asset {
    symbol: "VTRU",
    decimals: 18,
};

/// Wrapped VTRU (ERC20) on Vitruveo
pub const WVTRU: Asset = Asset {
    symbol: "wVTRU",
    decimals: 18,
};

/// Circle USDC on Polygon
pub const USDC: Asset = Asset {
    symbol: "USDC",
    decimals: 6,
};

/// Bridged USDC on Vitruveo
pub const USDC_POL: Asset = Asset {
    symbol: "USDC.pol",
    decimals: 6,
};

/// Errors produced while parsing a decimal amount
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("amount is empty")]
    Empty,
    #[error("amount must not carry a sign: {0}")]
    Signed(String),
    #[error("amount contains invalid characters: {0}")]
    InvalidDigits(String),
    #[error("amount has {found} fractional digits, asset supports {max}")]
    TooPrecise { found: usize, max: u8 },
    #[error("amount does not fit in 256 bits")]
    Overflow,
}

/// 10^decimals as U256
pub fn scale(decimals: u8) -> U256 {
    U256::from(10u64).pow(U256::from(decimals))
}

/// Parse a decimal string (e.g. "12.5") into base units for the given precision
pub fn parse_units(input: &str, decimals: u8) -> Result<U256, AmountError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(AmountError::Empty);
    }
    if input.starts_with('-') || input.starts_with('+') {
        return Err(AmountError::Signed(input.to_string()));
    }

    let (whole, fraction) = match input.split_once('.') {
        Some((w, f)) => (w, f),
        None => (input, ""),
    };

    if whole.is_empty() && fraction.is_empty() {
        return Err(AmountError::InvalidDigits(input.to_string()));
    }
    let all_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if !all_digits(whole) || !all_digits(fraction) {
        return Err(AmountError::InvalidDigits(input.to_string()));
    }
    if fraction.len() > decimals as usize {
        return Err(AmountError::TooPrecise {
            found: fraction.len(),
            max: decimals,
        });
    }

    let whole_units = if whole.is_empty() {
        U256::ZERO
    } else {
        U256::from_str_radix(whole, 10).map_err(|_| AmountError::Overflow)?
    };

    // Right-pad the fraction so "5" with 6 decimals becomes 500000
    let padded = format!("{:0<width$}", fraction, width = decimals as usize);
    let fraction_units = if padded.is_empty() {
        U256::ZERO
    } else {
        U256::from_str_radix(&padded, 10).map_err(|_| AmountError::Overflow)?
    };

    whole_units
        .checked_mul(scale(decimals))
        .and_then(|v| v.checked_add(fraction_units))
        .ok_or(AmountError::Overflow)
}

/// Render base units as a decimal string, trimming trailing fractional zeros
pub fn format_units(raw: U256, decimals: u8) -> String {
    let divisor = scale(decimals);
    let whole = raw / divisor;
    let fraction = raw % divisor;

    if fraction.is_zero() {
        return whole.to_string();
    }

    let fraction = format!("{:0>width$}", fraction.to_string(), width = decimals as usize);
    format!("{}.{}", whole, fraction.trim_end_matches('0'))
}

/// Render base units rounded down to a fixed number of fractional digits
pub fn format_units_fixed(raw: U256, decimals: u8, places: u8) -> String {
    let places = places.min(decimals);
    let truncated = raw / scale(decimals - places);
    if places == 0 {
        return truncated.to_string();
    }
    let divisor = scale(places);
    format!(
        "{}.{:0>width$}",
        truncated / divisor,
        (truncated % divisor).to_string(),
        width = places as usize
    )
}

/// A token balance kept both as the on-chain integer and its display string
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenAmount {
    #[serde(serialize_with = "serialize_u256")]
    pub raw: U256,
    pub decimals: u8,
    pub display: String,
}

impl TokenAmount {
    pub fn new(raw: U256, decimals: u8) -> Self {
        Self {
            raw,
            decimals,
            display: format_units(raw, decimals),
        }
    }

    pub fn zero(decimals: u8) -> Self {
        Self::new(U256::ZERO, decimals)
    }

    pub fn is_zero(&self) -> bool {
        self.raw.is_zero()
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display)
    }
}

fn serialize_u256<S: serde::Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.to_string())
}

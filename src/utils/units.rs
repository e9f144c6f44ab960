//! Decimal string <-> base unit conversion
//!
//! Arithmetic is done by `ethers::utils`. Input is checked first, because
//! ethers truncates surplus decimals and accepts `_` separators.

use crate::error::{WalletError, WalletResult};

use ethers::types::U256;
use ethers::utils::ConversionError;

/// Decimals of the native currency
pub const ETHER_DECIMALS: u32 = 18;

/// Largest power of ten that fits in a U256
pub const MAX_DECIMALS: u32 = 77;

fn conversion_error(value: &str, e: ConversionError) -> WalletError {
    WalletError::InvalidAmount(format!("{}: {}", value, e))
}

/// Parse a decimal amount such as `"1.5"` into base units
pub fn parse_units(value: &str, decimals: u32) -> WalletResult<U256> {
    if decimals > MAX_DECIMALS {
        return Err(WalletError::InvalidAmount(format!(
            "{} decimals is out of range",
            decimals
        )));
    }

    let value = value.trim();
    if value.starts_with('-') {
        return Err(WalletError::InvalidAmount(format!(
            "negative amounts are not allowed: {}",
            value
        )));
    }

    let (whole, fraction) = match value.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (value, ""),
    };

    if whole.is_empty() && fraction.is_empty() {
        return Err(WalletError::InvalidAmount(format!("not a number: {:?}", value)));
    }
    if !whole.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit()) {
        return Err(WalletError::InvalidAmount(format!("not a number: {:?}", value)));
    }

    let fraction = fraction.trim_end_matches('0');
    if fraction.len() > decimals as usize {
        return Err(WalletError::InvalidAmount(format!(
            "{} has more than {} decimal places",
            value, decimals
        )));
    }

    // Below 10^77 base units nothing can overflow
    let whole = whole.trim_start_matches('0');
    if whole.len() + decimals as usize > MAX_DECIMALS as usize {
        return Err(WalletError::InvalidAmount(format!(
            "{} overflows 256 bits",
            value
        )));
    }

    let whole = if whole.is_empty() { "0" } else { whole };
    let normalized = if fraction.is_empty() {
        whole.to_string()
    } else {
        format!("{}.{}", whole, fraction)
    };

    let parsed = ethers::utils::parse_units(normalized.as_str(), decimals)
        .map_err(|e| conversion_error(value, e))?;
    Ok(U256::from(parsed))
}

/// Drop trailing fractional zeros, keeping at least one digit after the point
fn trim_fraction(formatted: String) -> String {
    match formatted.split_once('.') {
        Some((whole, fraction)) => {
            let fraction = fraction.trim_end_matches('0');
            let fraction = if fraction.is_empty() { "0" } else { fraction };
            format!("{}.{}", whole, fraction)
        }
        None => format!("{}.0", formatted),
    }
}

/// Render base units as a decimal string, keeping at least one fractional digit
pub fn format_units(value: U256, decimals: u32) -> WalletResult<String> {
    let formatted = ethers::utils::format_units(value, decimals)
        .map_err(|e| conversion_error(&value.to_string(), e))?;
    Ok(trim_fraction(formatted))
}

pub fn parse_ether(value: &str) -> WalletResult<U256> {
    parse_units(value, ETHER_DECIMALS)
}

pub fn format_ether(value: U256) -> String {
    trim_fraction(ethers::utils::format_ether(value))
}

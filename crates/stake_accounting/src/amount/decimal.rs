//! Exact decimal shifting for display. Integer-scaled only, no floats.

use crate::amount::multi_token::AmountError;
use num_bigint::{BigInt, BigUint, Sign};
use num_traits::{pow, Zero};

fn scale(decimals: u32) -> BigUint {
    pow(BigUint::from(10u8), decimals as usize)
}

/// Render `amount` (smallest unit) divided by `10^decimals`, with exactly
/// `decimals` fractional digits.
pub fn shifted_decimal(amount: &BigInt, decimals: u32) -> String {
    let sign = if amount.sign() == Sign::Minus { "-" } else { "" };
    let magnitude = amount.magnitude();
    if decimals == 0 {
        return format!("{sign}{magnitude}");
    }
    let s = scale(decimals);
    let whole = magnitude / &s;
    let frac = (magnitude % &s).to_string();
    let width = decimals as usize;
    format!("{sign}{whole}.{frac:0>width$}")
}

/// Parse a human decimal ("1.5") back into the smallest unit.
/// More fractional digits than `decimals` is an error, never a rounding.
pub fn parse_shifted_decimal(input: &str, decimals: u32) -> Result<BigInt, AmountError> {
    let s = input.trim();
    let invalid = || AmountError::InvalidAmount(input.to_string());
    let (negative, body) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let (whole, frac) = body.split_once('.').unwrap_or((body, ""));
    if whole.is_empty() && frac.is_empty() {
        return Err(invalid());
    }
    if frac.len() > decimals as usize
        || !whole.chars().all(|c| c.is_ascii_digit())
        || !frac.chars().all(|c| c.is_ascii_digit())
    {
        return Err(invalid());
    }
    let whole: BigUint = if whole.is_empty() {
        BigUint::zero()
    } else {
        whole.parse().map_err(|_| invalid())?
    };
    let width = decimals as usize;
    let padded = format!("{frac:0<width$}");
    let frac: BigUint = if padded.is_empty() {
        BigUint::zero()
    } else {
        padded.parse().map_err(|_| invalid())?
    };
    let magnitude = whole * scale(decimals) + frac;
    let sign = if negative { Sign::Minus } else { Sign::Plus };
    Ok(BigInt::from_biguint(sign, magnitude))
}

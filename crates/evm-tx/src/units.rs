//! Decimal unit conversion
//!
//! Converts between human decimal strings ("1.5") and integer base units
//! for a token with a given number of decimals. Values are exact `U256`
//! integers throughout, never floats. Input is validated here; scaling goes
//! through `alloy_primitives::utils`.

use alloy_primitives::utils::{self, Unit};
use alloy_primitives::U256;
use r2r_core::ProtocolError;

/// Parse a decimal string into base units.
///
/// Accepts `"100"`, `"1.5"`, `".5"` and `"2."`. Rejects signs, exponents,
/// separators and more fractional digits than the token supports.
pub fn parse_units(value: &str, decimals: u8) -> Result<U256, ProtocolError> {
    let trimmed = value.trim();
    let invalid = |message: String| ProtocolError::InvalidAmount { message };

    if trimmed.is_empty() {
        return Err(invalid("amount is required".to_string()));
    }

    let (int_part, frac_part) = trimmed.split_once('.').unwrap_or((trimmed, ""));
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if (int_part.is_empty() && frac_part.is_empty())
        || !all_digits(int_part)
        || !all_digits(frac_part)
    {
        return Err(invalid(format!("'{}' is not a decimal number", trimmed)));
    }

    if frac_part.len() > decimals as usize {
        return Err(invalid(format!(
            "'{}' has more than {} decimal places",
            trimmed, decimals
        )));
    }

    // The scaled integer part has to fit in 256 bits
    let overflow = || invalid(format!("'{}' exceeds the uint256 range", trimmed));
    let unit = Unit::new(decimals).ok_or_else(overflow)?;
    let whole = match int_part {
        "" => U256::ZERO,
        digits => U256::from_str_radix(digits, 10).map_err(|_| overflow())?,
    };
    if whole.checked_mul(unit.wei()).is_none() {
        return Err(overflow());
    }

    utils::parse_units(trimmed, decimals)
        .map(|parsed| parsed.get_absolute())
        .map_err(|e| invalid(format!("'{}': {}", trimmed, e)))
}

/// Render base units as a decimal string with trailing zeros trimmed
pub fn format_units(value: U256, decimals: u8) -> String {
    match utils::format_units(value, decimals) {
        Ok(formatted) if formatted.contains('.') => formatted
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string(),
        Ok(formatted) => formatted,
        Err(_) => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_whole_and_fractional() {
        assert_eq!(parse_units("100", 6).unwrap(), U256::from(100_000_000u64));
        assert_eq!(parse_units("1.5", 18).unwrap(), U256::from(1_500_000_000_000_000_000u128));
        assert_eq!(parse_units(".5", 2).unwrap(), U256::from(50u64));
        assert_eq!(parse_units("2.", 2).unwrap(), U256::from(200u64));
        assert_eq!(parse_units(" 0.000001 ", 6).unwrap(), U256::from(1u64));
        assert_eq!(parse_units("0", 6).unwrap(), U256::ZERO);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for bad in ["", " ", ".", "-1", "1e6", "1,5", "abc", "1.2.3", "+1"] {
            assert!(parse_units(bad, 6).is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_parse_rejects_excess_precision() {
        assert!(parse_units("0.0000001", 6).is_err());
        assert!(parse_units("1.5", 0).is_err());
    }

    #[test]
    fn test_parse_overflow() {
        let huge = "9".repeat(80);
        assert!(parse_units(&huge, 0).is_err());
    }

    #[test]
    fn test_format_units() {
        assert_eq!(format_units(U256::from(100_000_000u64), 6), "100");
        assert_eq!(format_units(U256::from(1_500_000u64), 6), "1.5");
        assert_eq!(format_units(U256::from(1u64), 6), "0.000001");
        assert_eq!(format_units(U256::ZERO, 6), "0");
        assert_eq!(format_units(U256::from(42u64), 0), "42");
        assert_eq!(format_units(U256::from(10u64).pow(U256::from(20u64)), 18), "100");
    }
}

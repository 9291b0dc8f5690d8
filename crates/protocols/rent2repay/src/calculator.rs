//! Rent2Repay Calculator
//!
//! Pure functions turning raw on-chain values into derived quantities.
//! No I/O - just calculations. Amounts stay `U256` so no fixed-point value
//! is ever rounded through a float; floats appear only in display helpers.

use alloy_primitives::U256;
use chrono::DateTime;
use evm_tx::units::format_units;

use crate::constants::{fees, periods};

/// Fee fractions are computed in units of 1/(10000 * 10000)
const FEE_SCALE: u64 = fees::BPS_DENOMINATOR * fees::BPS_DENOMINATOR;

/// Smallest of the three amounts
pub fn minimum_of(configured: U256, balance: U256, debt: U256) -> U256 {
    configured.min(balance).min(debt)
}

/// Whether `allowance` covers `required`. An unknown allowance never does.
pub fn is_approval_sufficient(allowance: Option<U256>, required: U256) -> bool {
    allowance.is_some_and(|a| a >= required)
}

/// Fee-reduction eligibility: holding at least the minimum balance
pub fn is_user_eligible(balance: U256, minimum_balance: U256) -> bool {
    balance >= minimum_balance
}

/// DAO fee after the holder discount, in (fractional) basis points
pub fn effective_dao_fee_bps(dao_fee_bps: u64, reduction_bps: u64, user_eligible: bool) -> f64 {
    if !user_eligible {
        return dao_fee_bps as f64;
    }
    let kept = fees::BPS_DENOMINATOR.saturating_sub(reduction_bps);
    dao_fee_bps as f64 * kept as f64 / fees::BPS_DENOMINATOR as f64
}

/// Effective borrowing rate once fees are accounted for.
///
/// `nominal_rate_ray` is the lending protocol's rate in RAY (1e27). Returns
/// the effective rate in RAY, or `None` when the total fee reaches 100%
/// (the division collapses) or the result overflows.
pub fn compute_effective_rate(
    nominal_rate_ray: U256,
    dao_fee_bps: u64,
    sender_tip_bps: u64,
    reduction_bps: u64,
    user_eligible: bool,
) -> Option<U256> {
    let bps = U256::from(fees::BPS_DENOMINATOR);
    let dao = U256::from(dao_fee_bps);

    let dao_scaled = if user_eligible {
        let kept = fees::BPS_DENOMINATOR.saturating_sub(reduction_bps);
        dao.checked_mul(U256::from(kept))?
    } else {
        dao.checked_mul(bps)?
    };
    let total_scaled = dao_scaled.checked_add(U256::from(sender_tip_bps).checked_mul(bps)?)?;

    let scale = U256::from(FEE_SCALE);
    if total_scaled >= scale {
        return None;
    }

    nominal_rate_ray
        .checked_mul(scale)
        .map(|n| n / (scale - total_scaled))
}

/// RAY rate as a percentage, for display
pub fn ray_to_percent(rate_ray: U256) -> f64 {
    let value: f64 = rate_ray.to_string().parse().unwrap_or(0.0);
    value / fees::RAY as f64 * 100.0
}

/// Round a decimal string to `sig_digits` significant digits.
///
/// Small values keep as many decimals as needed to show their leading
/// digits; values of magnitude ≥ 10^(sig_digits-1) keep none. Zero, NaN
/// and unparsable input render as `"0.00"`.
pub fn format_significant(value: &str, sig_digits: u32) -> String {
    const FALLBACK: &str = "0.00";

    let parsed: f64 = match value.trim().parse() {
        Ok(v) => v,
        Err(_) => return FALLBACK.to_string(),
    };
    if !parsed.is_finite() || parsed == 0.0 {
        return FALLBACK.to_string();
    }

    let sig_digits = sig_digits.max(1) as usize;
    let magnitude = parsed.abs().log10().floor() as i64;
    let decimals = (sig_digits as i64 - 1 - magnitude).max(0) as usize;
    let rounded = format!("{:.*}", decimals, parsed);

    // Rounding up to the next power of ten (9.96 -> 10.0) adds a digit
    if decimals > 0 && significant_digits(&rounded) > sig_digits {
        return format!("{:.*}", decimals - 1, parsed);
    }
    rounded
}

fn significant_digits(formatted: &str) -> usize {
    formatted
        .chars()
        .filter(char::is_ascii_digit)
        .skip_while(|c| *c == '0')
        .count()
}

/// Fixed-point amount rendering; `U256::MAX` is the unlimited-approval sentinel
pub fn format_token_amount(amount: U256, decimals: u8) -> String {
    if amount == U256::MAX {
        return "MAX".to_string();
    }
    format_units(amount, decimals)
}

/// Human label for a repayment period
pub fn format_period(seconds: u64) -> String {
    let units: [(u64, &str); 5] = [
        (periods::MONTH, "month"),
        (periods::WEEK, "week"),
        (periods::DAY, "day"),
        (periods::HOUR, "hour"),
        (60, "minute"),
    ];

    let (count, unit) = units
        .iter()
        .find(|(size, _)| seconds > 0 && seconds % size == 0)
        .map(|(size, unit)| (seconds / size, *unit))
        .unwrap_or((seconds, "second"));

    if count == 1 {
        format!("1 {}", unit)
    } else {
        format!("{} {}s", count, unit)
    }
}

/// UTC rendering of a unix timestamp; 0 means the event never happened
pub fn format_timestamp(timestamp: u64) -> String {
    if timestamp == 0 {
        return "Never".to_string();
    }
    i64::try_from(timestamp)
        .ok()
        .and_then(|ts| DateTime::from_timestamp(ts, 0))
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

//! # Fixed-Point Arithmetic
//!
//! Exact integer arithmetic for values, margins, and 2-decimal ratios.
//! Every multiplication is checked before it happens; an overflow is an
//! error, never a wrap and never a saturation in disguise.

use thiserror::Error;

use crate::config::{HEALTH_MULTIPLIER, MAX_LIQUIDATION_THRESHOLD};

/// Arithmetic that would overflow or lose information.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArithmeticError {
    /// `lhs <op> rhs` does not fit in 128 bits.
    #[error("arithmetic overflow: {lhs} {op} {rhs}")]
    Overflow {
        op: &'static str,
        lhs: u128,
        rhs: u128,
    },

    /// A value does not fit the narrower integer width it is converted to.
    #[error("value {value} does not fit in {target}")]
    Narrowing { value: u128, target: &'static str },

    /// Division by zero.
    #[error("division by zero")]
    DivisionByZero,
}

/// `a * b`, or [`ArithmeticError::Overflow`].
pub fn mul(a: u128, b: u128) -> Result<u128, ArithmeticError> {
    a.checked_mul(b).ok_or(ArithmeticError::Overflow {
        op: "*",
        lhs: a,
        rhs: b,
    })
}

/// `a + b`, or [`ArithmeticError::Overflow`].
pub fn add(a: u128, b: u128) -> Result<u128, ArithmeticError> {
    a.checked_add(b).ok_or(ArithmeticError::Overflow {
        op: "+",
        lhs: a,
        rhs: b,
    })
}

/// `a / b` rounded down, or [`ArithmeticError::DivisionByZero`].
pub fn div(a: u128, b: u128) -> Result<u128, ArithmeticError> {
    a.checked_div(b).ok_or(ArithmeticError::DivisionByZero)
}

/// `max(0, a - b)`.
pub fn clamp_sub(a: u128, b: u128) -> u128 {
    if a > b {
        a - b
    } else {
        0
    }
}

/// Applies a 2-decimal percentage in basis form (`10_000` = 100.00) to `value`,
/// rounding down.
pub fn apply_ratio(value: u128, ratio: u16) -> Result<u128, ArithmeticError> {
    Ok(mul(value, u128::from(ratio))? / u128::from(MAX_LIQUIDATION_THRESHOLD))
}

/// Health test: `total_value * 100 >= used_margin * liquidation_threshold`.
///
/// Both products are computed exactly; if either overflows the test is not
/// decided and the caller gets the overflow back.
pub fn is_healthy(
    total_value: u128,
    used_margin: u128,
    liquidation_threshold: u16,
) -> Result<bool, ArithmeticError> {
    let cover = mul(total_value, HEALTH_MULTIPLIER)?;
    let required = mul(used_margin, u128::from(liquidation_threshold))?;
    Ok(cover >= required)
}

/// Narrows a value to `u64`, failing instead of truncating.
pub fn narrow_u64(value: u128) -> Result<u64, ArithmeticError> {
    u64::try_from(value).map_err(|_| ArithmeticError::Narrowing {
        value,
        target: "u64",
    })
}

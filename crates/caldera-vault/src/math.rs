//! Floor mul-div and total-value helpers.
//!
//! Every division in the share formulas floors, and the floor always favors
//! the vault. Composing the preview formulas therefore never manufactures
//! value: `preview_deposit(preview_withdraw(preview_deposit(a))) <= a`.

use caldera_types::price::{Price, PRICE_SCALE};

use crate::{Result, VaultError};

/// `(a * b) / d` with u128 checked multiplication and floor division.
///
/// # Errors
///
/// - [`VaultError::Overflow`] if `a * b` overflows u128, or if `d` is zero
///   (callers guard zero denominators with a more specific error first)
///
/// # Examples
///
/// ```
/// use caldera_vault::math::mul_div_floor;
///
/// assert_eq!(mul_div_floor(10, 3, 4).unwrap(), 7); // 30/4 floors to 7
/// ```
pub fn mul_div_floor(a: u128, b: u128, d: u128) -> Result<u128> {
    a.checked_mul(b)
        .and_then(|num| num.checked_div(d))
        .ok_or(VaultError::Overflow)
}

/// Total vault value: `balance * price / PRICE_SCALE`, floored.
///
/// # Errors
///
/// - [`VaultError::Overflow`] if the product overflows u128
pub fn total_value(balance: u128, price: Price) -> Result<u128> {
    mul_div_floor(balance, price.raw(), PRICE_SCALE)
}

//! 18-decimal fixed-point price representation.
//!
//! All prices inside Caldera are integers scaled by [`PRICE_SCALE`]
//! (`10^18`). Every scale conversion happens in the oracle source adapter;
//! downstream code only ever sees [`Price`] values, which makes silent
//! double-scaling a type error rather than a runtime bug.

use serde::{Deserialize, Serialize};

/// Number of fixed-point decimals carried by a [`Price`].
pub const PRICE_DECIMALS: u8 = 18;

/// Scaling factor for [`Price`] values (`10^18`).
pub const PRICE_SCALE: u128 = 1_000_000_000_000_000_000;

/// A price in 18-decimal fixed point.
///
/// The inner value is `units * 10^18`, so a price of 2000.5 is stored as
/// `2_000_500_000_000_000_000_000`.
///
/// # Examples
///
/// ```
/// use caldera_types::price::{Price, PRICE_SCALE};
///
/// let p = Price::from_units(2000);
/// assert_eq!(p.raw(), 2000 * PRICE_SCALE);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(u128);

impl Price {
    /// The zero price.
    pub const ZERO: Price = Price(0);

    /// Wrap an already-scaled 18-decimal raw value.
    pub const fn from_raw(raw: u128) -> Self {
        Price(raw)
    }

    /// Build a price from whole units (scaled by [`PRICE_SCALE`]).
    ///
    /// Saturates at `u128::MAX` for values that cannot be represented.
    pub const fn from_units(units: u64) -> Self {
        Price((units as u128).saturating_mul(PRICE_SCALE))
    }

    /// The raw scaled value.
    pub const fn raw(&self) -> u128 {
        self.0
    }

    /// Whether the price is zero.
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Absolute difference between two prices.
    pub const fn abs_diff(&self, other: Price) -> u128 {
        self.0.abs_diff(other.0)
    }
}

impl std::fmt::Display for Price {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let units = self.0 / PRICE_SCALE;
        let frac = self.0 % PRICE_SCALE;
        if frac == 0 {
            write!(f, "{units}")
        } else {
            // Trim trailing zeros from the fractional part for readability.
            let frac = format!("{frac:018}");
            write!(f, "{units}.{}", frac.trim_end_matches('0'))
        }
    }
}

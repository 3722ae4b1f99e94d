//! Price source adapter and decimal normalization.
//!
//! A [`PriceSource`] is a synchronous read of an external feed's latest
//! round: raw price, decimal scale, update time, completeness flag. The
//! adapter normalizes the raw value to 18-decimal fixed point and nothing
//! else; validity judgments (staleness, bounds, deviation) belong to the
//! validator.
//!
//! A failed read maps to [`OracleError::SourceError`], never to a staleness
//! rejection: staleness is a property of the data's timestamp, not of call
//! latency.

use caldera_types::{
    price::{Price, PRICE_DECIMALS},
    Timestamp,
};

use crate::{OracleError, Result};

/// One raw round from an external feed, before normalization.
#[derive(Clone, Copy, Debug)]
pub struct RawReading {
    /// Raw price in the feed's own scale. May be non-positive for a broken feed.
    pub price: i128,
    /// Number of decimals in `price`.
    pub decimals: u8,
    /// Unix timestamp the feed last updated.
    pub updated_at: Timestamp,
    /// Whether the feed's round is complete.
    pub round_complete: bool,
}

/// A readable external price feed.
///
/// Implementations perform the read and nothing more; they must surface read
/// failures as [`OracleError::SourceError`] rather than coercing to zero.
pub trait PriceSource {
    /// Read the feed's latest round.
    fn latest_reading(&self) -> Result<RawReading>;
}

/// Rescale a raw reading to 18-decimal fixed point.
///
/// Exact integer arithmetic: `raw * 10^(18 - decimals)` for feeds with fewer
/// decimals, `raw / 10^(decimals - 18)` for feeds with more (the division is
/// lossy only below the fixed-point resolution).
///
/// # Errors
///
/// - [`OracleError::SourceError`] for a non-positive raw price or more than
///   38 decimals
/// - [`OracleError::Overflow`] if the rescaled value exceeds `u128`
///
/// # Examples
///
/// ```
/// use caldera_oracle::source::{normalize, RawReading};
/// use caldera_types::price::Price;
///
/// let reading = RawReading { price: 2000_00000000, decimals: 8, updated_at: 0, round_complete: true };
/// assert_eq!(normalize(&reading).unwrap(), Price::from_units(2000));
/// ```
pub fn normalize(reading: &RawReading) -> Result<Price> {
    if reading.price <= 0 {
        return Err(OracleError::SourceError(format!(
            "non-positive raw price {}",
            reading.price
        )));
    }
    let raw = reading.price as u128;

    let scaled = if reading.decimals <= PRICE_DECIMALS {
        let factor = 10u128
            .checked_pow(u32::from(PRICE_DECIMALS - reading.decimals))
            .ok_or(OracleError::Overflow)?;
        raw.checked_mul(factor).ok_or(OracleError::Overflow)?
    } else {
        let excess = u32::from(reading.decimals - PRICE_DECIMALS);
        let factor = 10u128.checked_pow(excess).ok_or_else(|| {
            OracleError::SourceError(format!("unsupported decimals {}", reading.decimals))
        })?;
        raw / factor
    };

    Ok(Price::from_raw(scaled))
}

/// An in-memory source with a settable reading, for development and tests.
#[derive(Clone, Debug)]
pub struct FixedSource {
    reading: Option<RawReading>,
}

impl FixedSource {
    /// Create a source that fails every read until a reading is set.
    pub fn new() -> Self {
        Self { reading: None }
    }

    /// Create a source preloaded with a complete 18-decimal reading.
    pub fn with_price(price: Price, updated_at: Timestamp) -> Self {
        Self {
            reading: Some(RawReading {
                price: price.raw() as i128,
                decimals: PRICE_DECIMALS,
                updated_at,
                round_complete: true,
            }),
        }
    }

    /// Replace the current reading (development/testing only).
    pub fn set_reading(&mut self, reading: RawReading) {
        tracing::warn!(
            price = reading.price,
            updated_at = reading.updated_at,
            "fixed source: reading changed (dev only)"
        );
        self.reading = Some(reading);
    }

    /// Make every subsequent read fail, simulating an unreachable feed.
    pub fn go_dark(&mut self) {
        self.reading = None;
    }
}

impl Default for FixedSource {
    fn default() -> Self {
        Self::new()
    }
}

impl PriceSource for FixedSource {
    fn latest_reading(&self) -> Result<RawReading> {
        self.reading
            .ok_or_else(|| OracleError::SourceError("fixed source has no reading".to_string()))
    }
}

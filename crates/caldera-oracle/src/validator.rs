//! Staleness, completeness, bounds, and deviation checks.
//!
//! Validation is a pure function of a candidate reading, the current time, a
//! deviation baseline, and the oracle configuration. Checks run in a fixed
//! order and short-circuit on first failure:
//!
//! 1. staleness — `now - updated_at <= max_staleness_secs`
//! 2. completeness — the round must be complete
//! 3. bounds — `min_price <= price <= max_price`
//! 4. deviation — within `max_deviation_bps` of the baseline, when one exists
//!
//! The baseline is the most recent ring-buffer observation regardless of
//! which source produced it, which is what defeats a single-round
//! manipulation of one feed.

use caldera_types::{price::Price, Timestamp, BPS_DENOMINATOR};
use serde::{Deserialize, Serialize};

use crate::{OracleError, Result};

/// Owner-controlled oracle configuration.
///
/// Read once at operation entry and never re-read mid-operation; updates go
/// through [`OracleConfig::validate`] before they are accepted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Maximum age of a reading, in seconds.
    pub max_staleness_secs: u64,
    /// Maximum deviation from the baseline, in basis points.
    pub max_deviation_bps: u64,
    /// Sanity lower bound.
    pub min_price: Price,
    /// Sanity upper bound.
    pub max_price: Price,
    /// How long the last valid price may serve as a fallback of last resort.
    pub grace_period_secs: u64,
    /// Whether a fallback-accepted price also advances the deviation
    /// baseline and last-valid register, as a primary success would.
    pub fallback_extends_baseline: bool,
}

impl OracleConfig {
    /// Check internal consistency.
    ///
    /// # Errors
    ///
    /// - [`OracleError::InvalidConfig`] if `min_price` is zero, the bounds are
    ///   inverted, or the staleness window is zero
    pub fn validate(&self) -> Result<()> {
        if self.min_price.is_zero() {
            return Err(OracleError::InvalidConfig(
                "min_price must be non-zero".to_string(),
            ));
        }
        if self.min_price > self.max_price {
            return Err(OracleError::InvalidConfig(format!(
                "min_price {} exceeds max_price {}",
                self.min_price, self.max_price
            )));
        }
        if self.max_staleness_secs == 0 {
            return Err(OracleError::InvalidConfig(
                "max_staleness_secs must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// A normalized reading awaiting validation.
#[derive(Clone, Copy, Debug)]
pub struct Candidate {
    /// Normalized 18-decimal price.
    pub price: Price,
    /// Unix timestamp the source last updated.
    pub updated_at: Timestamp,
    /// Whether the source's round was complete.
    pub round_complete: bool,
}

/// Validate a candidate against the configured gates.
///
/// Pure function; no side effects. `baseline` is the most recent accepted
/// observation, or `None` before any price has been accepted (in which case
/// the deviation gate is skipped).
///
/// # Errors
///
/// One of [`OracleError::Stale`], [`OracleError::IncompleteRound`],
/// [`OracleError::OutOfBounds`], [`OracleError::ExcessiveDeviation`], in
/// check order.
pub fn validate(
    candidate: &Candidate,
    now: Timestamp,
    baseline: Option<Price>,
    config: &OracleConfig,
) -> Result<Price> {
    let age = now.saturating_sub(candidate.updated_at);
    if age > config.max_staleness_secs {
        return Err(OracleError::Stale {
            updated_at: candidate.updated_at,
            now,
            max_staleness: config.max_staleness_secs,
        });
    }

    if !candidate.round_complete {
        return Err(OracleError::IncompleteRound);
    }

    if candidate.price < config.min_price || candidate.price > config.max_price {
        return Err(OracleError::OutOfBounds {
            price: candidate.price,
            min: config.min_price,
            max: config.max_price,
        });
    }

    if let Some(baseline) = baseline {
        if !within_deviation(candidate.price, baseline, config.max_deviation_bps)? {
            return Err(OracleError::ExcessiveDeviation {
                price: candidate.price,
                baseline,
                max_deviation_bps: config.max_deviation_bps,
            });
        }
    }

    Ok(candidate.price)
}

/// Integer cross-multiplied deviation test:
/// `|price - baseline| * 10_000 <= baseline * max_bps`.
///
/// A price exactly at the limit passes; one basis point beyond fails.
fn within_deviation(price: Price, baseline: Price, max_bps: u64) -> Result<bool> {
    let diff = price.abs_diff(baseline);
    let lhs = diff
        .checked_mul(u128::from(BPS_DENOMINATOR))
        .ok_or(OracleError::Overflow)?;
    let rhs = baseline
        .raw()
        .checked_mul(u128::from(max_bps))
        .ok_or(OracleError::Overflow)?;
    Ok(lhs <= rhs)
}

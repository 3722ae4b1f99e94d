//! # caldera-oracle
//!
//! Oracle-validated price aggregation for the Caldera vault.
//!
//! Price updates from untrusted external feeds are normalized, validated, and
//! aggregated into a time-weighted average. Resolution degrades explicitly:
//! primary source, then fallback source, then the last valid price within a
//! bounded grace period, then a hard failure an operator must respond to.
//!
//! ## Modules
//!
//! - [`source`] — price source adapter and decimal normalization
//! - [`validator`] — staleness, bounds, and deviation checks
//! - [`ring`] — fixed-capacity observation ring with TWAP queries
//! - [`pipeline`] — primary/fallback/last-valid resolution and shutdown

pub mod pipeline;
pub mod ring;
pub mod source;
pub mod validator;

use caldera_types::{price::Price, Timestamp};

/// Error types for oracle operations.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    /// The reading's own timestamp is older than the staleness threshold.
    #[error("stale reading: updated at {updated_at}, now {now}, max staleness {max_staleness}s")]
    Stale {
        /// Timestamp the source last updated.
        updated_at: Timestamp,
        /// Current timestamp.
        now: Timestamp,
        /// Configured staleness threshold in seconds.
        max_staleness: u64,
    },

    /// The source reported an incomplete round.
    #[error("incomplete round")]
    IncompleteRound,

    /// The price fell outside the configured sanity bounds.
    #[error("price {price} out of bounds [{min}, {max}]")]
    OutOfBounds {
        /// The rejected price.
        price: Price,
        /// Configured minimum.
        min: Price,
        /// Configured maximum.
        max: Price,
    },

    /// The price deviates too far from the most recent accepted observation.
    #[error("price {price} deviates more than {max_deviation_bps}bps from baseline {baseline}")]
    ExcessiveDeviation {
        /// The rejected price.
        price: Price,
        /// The deviation baseline (most recent ring observation).
        baseline: Price,
        /// Configured deviation limit in basis points.
        max_deviation_bps: u64,
    },

    /// The source read itself failed, or returned an unusable raw value.
    #[error("source error: {0}")]
    SourceError(String),

    /// An observation timestamp moved backwards.
    #[error("non-monotonic timestamp: {new} < {last}")]
    NonMonotonicTimestamp {
        /// The offending new timestamp.
        new: Timestamp,
        /// The most recent buffered timestamp.
        last: Timestamp,
    },

    /// The ring buffer does not span the requested TWAP window.
    #[error("insufficient history: window {window}s exceeds buffered span {span}s")]
    InsufficientHistory {
        /// Requested trailing window in seconds.
        window: u64,
        /// Span currently covered by buffered observations.
        span: u64,
    },

    /// Every resolution stage failed and the last valid price is too old.
    #[error("no valid price available")]
    NoValidPrice,

    /// Emergency shutdown is active; resolution is halted.
    #[error("emergency shutdown active")]
    ShutdownActive,

    /// Rejected configuration update.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Checked arithmetic overflowed.
    #[error("arithmetic overflow")]
    Overflow,
}

/// Convenience result type for oracle operations.
pub type Result<T> = std::result::Result<T, OracleError>;

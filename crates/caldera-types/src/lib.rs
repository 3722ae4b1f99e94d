//! # caldera-types
//!
//! Shared domain types used across the Caldera workspace.
//!
//! ## Modules
//!
//! - [`price`] — 18-decimal fixed-point price representation
//! - [`events`] — notifications emitted on successful state transitions

pub mod events;
pub mod price;

/// Unix timestamp in seconds.
pub type Timestamp = u64;

/// Opaque account identifier for depositors and administrators.
pub type AccountId = u64;

/// Basis-point denominator (1 bp = 1/10,000).
pub const BPS_DENOMINATOR: u64 = 10_000;

/// Maximum number of price observations retained by the ring buffer.
pub const MAX_OBSERVATIONS: usize = 64;

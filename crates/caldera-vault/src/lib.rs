//! # caldera-vault
//!
//! Share accounting for the Caldera yield vault.
//!
//! Depositors receive proportional ownership units ("shares") against the
//! pooled assets, priced by the oracle resolution pipeline. All divisions
//! floor, and the floor always favors the vault: deposits mint fewer shares,
//! withdrawals return fewer assets. The first depositor bootstraps the
//! exchange rate at 1 share = 1 asset unit.
//!
//! ## Modules
//!
//! - [`math`] — floor mul-div and total-value helpers
//! - [`ledger`] — asset ledger collaborator boundary
//! - [`auth`] — capability check for privileged entry points
//! - [`vault`] — the vault itself
//! - [`snapshot`] — persisted-state layout

pub mod auth;
pub mod ledger;
pub mod math;
pub mod snapshot;
pub mod vault;

use caldera_oracle::OracleError;
use caldera_types::AccountId;

/// Error types for vault operations.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// A zero asset or share amount was passed to a mutating operation.
    #[error("amount must be non-zero")]
    ZeroAmount,

    /// The deposit would mint zero shares after floor rounding.
    #[error("deposit too small: mints zero shares")]
    ZeroShares,

    /// The caller holds fewer shares than requested.
    #[error("insufficient shares: requested {requested}, available {available}")]
    InsufficientShares {
        /// Shares requested.
        requested: u128,
        /// Shares the caller holds.
        available: u128,
    },

    /// The actor lacks the admin capability.
    #[error("unauthorized: account {actor}")]
    Unauthorized {
        /// The rejected actor.
        actor: AccountId,
    },

    /// The operation requires emergency shutdown to be active.
    #[error("emergency shutdown is not active")]
    ShutdownRequired,

    /// Vault value computed to zero while shares are outstanding.
    #[error("vault value is zero with {total_shares} shares outstanding")]
    ZeroTotalValue {
        /// Outstanding shares.
        total_shares: u128,
    },

    /// The external asset ledger refused a transfer.
    #[error("asset ledger: {0}")]
    AssetLedger(String),

    /// Price resolution failed.
    #[error(transparent)]
    Oracle(#[from] OracleError),

    /// Checked arithmetic overflowed.
    #[error("arithmetic overflow")]
    Overflow,
}

/// Convenience result type for vault operations.
pub type Result<T> = std::result::Result<T, VaultError>;

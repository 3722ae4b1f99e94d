//! Notifications emitted on successful state transitions.
//!
//! Events are the only state changes visible to external observers. Each is
//! emitted exactly once per successful transition; a failed or aborted
//! operation emits nothing, with one exception: `OracleFailed` marks a source
//! rejection inside the resolution pipeline, which is a real transition even
//! when the overall resolution later succeeds through the fallback chain.
//!
//! Components queue their events internally; callers drain them with
//! `take_events()` after each operation.

use serde::{Deserialize, Serialize};

use crate::{price::Price, AccountId, Timestamp};

/// All notifications emitted by the oracle pipeline and the vault.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum VaultEvent {
    /// A validated price was appended to the observation ring.
    PriceUpdated {
        price: Price,
        timestamp: Timestamp,
        cumulative_price: u128,
    },

    /// A deposit completed; `price_used` is the resolved price it settled at.
    Deposit {
        account: AccountId,
        assets: u128,
        shares: u128,
        price_used: Price,
    },

    /// A withdrawal completed.
    Withdraw {
        account: AccountId,
        assets: u128,
        shares: u128,
        price_used: Price,
    },

    /// An emergency withdrawal completed against the last valid price.
    EmergencyWithdraw {
        account: AccountId,
        assets: u128,
        shares: u128,
        price_used: Price,
    },

    /// A price source was rejected during resolution.
    OracleFailed { reason: String, timestamp: Timestamp },

    /// Emergency shutdown was toggled.
    EmergencyShutdown { active: bool },
}

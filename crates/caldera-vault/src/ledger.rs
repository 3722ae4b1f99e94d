//! Asset ledger collaborator boundary.
//!
//! The vault never holds asset balances itself; it signals an external
//! ledger to pull deposits in and push withdrawals out, and reads the total
//! it currently holds. Transfers either fully succeed or fail atomically —
//! there is no partial transfer.

use caldera_types::AccountId;
use std::collections::BTreeMap;

use crate::{Result, VaultError};

/// The external fungible-balance ledger the vault draws on.
pub trait AssetLedger {
    /// Pull `amount` assets from `from` into the vault's custody.
    fn pull(&mut self, from: AccountId, amount: u128) -> Result<()>;

    /// Push `amount` assets from the vault's custody to `to`.
    fn push(&mut self, to: AccountId, amount: u128) -> Result<()>;

    /// Total assets currently held by the vault.
    fn total_assets_held(&self) -> u128;
}

/// In-memory asset ledger for tests and local development.
#[derive(Clone, Debug, Default)]
pub struct InMemoryLedger {
    balances: BTreeMap<AccountId, u128>,
    vault_held: u128,
}

impl InMemoryLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit an account, for test setup.
    pub fn credit(&mut self, account: AccountId, amount: u128) {
        let balance = self.balances.entry(account).or_default();
        *balance = balance.saturating_add(amount);
    }

    /// An account's free balance.
    pub fn balance_of(&self, account: AccountId) -> u128 {
        self.balances.get(&account).copied().unwrap_or(0)
    }

    /// Drop assets straight into the vault's custody, bypassing any
    /// account. Models yield accrual (or a donation attack) in tests.
    pub fn donate(&mut self, amount: u128) {
        self.vault_held = self.vault_held.saturating_add(amount);
    }
}

impl AssetLedger for InMemoryLedger {
    fn pull(&mut self, from: AccountId, amount: u128) -> Result<()> {
        let balance = self.balances.entry(from).or_default();
        if *balance < amount {
            return Err(VaultError::AssetLedger(format!(
                "account {from} holds {balance}, cannot pull {amount}"
            )));
        }
        *balance -= amount;
        self.vault_held = self
            .vault_held
            .checked_add(amount)
            .ok_or(VaultError::Overflow)?;
        Ok(())
    }

    fn push(&mut self, to: AccountId, amount: u128) -> Result<()> {
        if self.vault_held < amount {
            return Err(VaultError::AssetLedger(format!(
                "vault holds {}, cannot push {amount}",
                self.vault_held
            )));
        }
        let balance = self.balances.entry(to).or_default();
        let credited = balance.checked_add(amount).ok_or(VaultError::Overflow)?;
        *balance = credited;
        self.vault_held -= amount;
        Ok(())
    }

    fn total_assets_held(&self) -> u128 {
        self.vault_held
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pull_moves_balance_into_custody() {
        let mut ledger = InMemoryLedger::new();
        ledger.credit(1, 1000);
        ledger.pull(1, 400).expect("pull");
        assert_eq!(ledger.balance_of(1), 600);
        assert_eq!(ledger.total_assets_held(), 400);
    }

    #[test]
    fn test_pull_insufficient_fails_atomically() {
        let mut ledger = InMemoryLedger::new();
        ledger.credit(1, 100);
        let err = ledger.pull(1, 101).expect_err("insufficient");
        assert!(matches!(err, VaultError::AssetLedger(_)));
        assert_eq!(ledger.balance_of(1), 100);
        assert_eq!(ledger.total_assets_held(), 0);
    }

    #[test]
    fn test_push_returns_custody() {
        let mut ledger = InMemoryLedger::new();
        ledger.credit(1, 1000);
        ledger.pull(1, 1000).expect("pull");
        ledger.push(2, 250).expect("push");
        assert_eq!(ledger.balance_of(2), 250);
        assert_eq!(ledger.total_assets_held(), 750);
    }

    #[test]
    fn test_push_overflowing_recipient_fails_atomically() {
        let mut ledger = InMemoryLedger::new();
        ledger.credit(1, u128::MAX);
        ledger.pull(1, u128::MAX).expect("pull");
        ledger.push(2, 1).expect("first unit");
        ledger.credit(2, u128::MAX - 1);
        let err = ledger.push(2, 1).expect_err("recipient would overflow");
        assert!(matches!(err, VaultError::Overflow));
        assert_eq!(ledger.balance_of(2), u128::MAX);
        assert_eq!(ledger.total_assets_held(), u128::MAX - 1);
    }

    #[test]
    fn test_push_beyond_custody_fails() {
        let mut ledger = InMemoryLedger::new();
        let err = ledger.push(1, 1).expect_err("nothing held");
        assert!(matches!(err, VaultError::AssetLedger(_)));
    }
}

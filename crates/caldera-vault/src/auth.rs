//! Capability check for privileged entry points.
//!
//! Configuration updates, source replacement, and the shutdown toggle are
//! owner-only. The check is a trait so the vault's tests run without a full
//! authorization subsystem, and so a governance or multisig collaborator can
//! be plugged in at the boundary.

use caldera_types::AccountId;

use crate::{Result, VaultError};

/// Decides whether an actor may invoke privileged operations.
pub trait Authorizer {
    /// Succeed only for actors holding the admin capability.
    fn require_admin(&self, actor: AccountId) -> Result<()>;
}

/// A single fixed admin account.
#[derive(Clone, Copy, Debug)]
pub struct SingleAdmin {
    admin: AccountId,
}

impl SingleAdmin {
    /// Grant the capability to one account.
    pub fn new(admin: AccountId) -> Self {
        Self { admin }
    }
}

impl Authorizer for SingleAdmin {
    fn require_admin(&self, actor: AccountId) -> Result<()> {
        if actor == self.admin {
            Ok(())
        } else {
            Err(VaultError::Unauthorized { actor })
        }
    }
}

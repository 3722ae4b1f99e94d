//! Persisted-state layout.
//!
//! The complete durable state of one vault instance: the observation ring
//! (slots, cursor, count), the resolution state, the oracle config, and the
//! share ledger. There is no other hidden state; sources, the asset ledger,
//! and the authorizer are collaborators re-injected on restore.

use caldera_oracle::{
    pipeline::{PricePipeline, ResolutionState},
    ring::RingBuffer,
    source::PriceSource,
    validator::OracleConfig,
};
use caldera_types::AccountId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{auth::Authorizer, ledger::AssetLedger, vault::Vault, Result};

/// Serializable image of a vault's full durable state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VaultSnapshot {
    /// Observation ring: slots plus write cursor.
    pub ring: RingBuffer,
    /// Last-valid register and shutdown flag.
    pub resolution: ResolutionState,
    /// Oracle configuration.
    pub config: OracleConfig,
    /// Total shares outstanding.
    pub total_shares: u128,
    /// Per-account share balances.
    pub share_balances: BTreeMap<AccountId, u128>,
}

impl<L: AssetLedger, A: Authorizer> Vault<L, A> {
    /// Capture the vault's durable state.
    pub fn snapshot(&self) -> VaultSnapshot {
        let (pipeline, total_shares, share_balances) = self.parts();
        VaultSnapshot {
            ring: pipeline.ring().clone(),
            resolution: pipeline.state().clone(),
            config: pipeline.config().clone(),
            total_shares,
            share_balances: share_balances.clone(),
        }
    }

    /// Rebuild a vault from a snapshot and fresh collaborators.
    ///
    /// # Errors
    ///
    /// - [`crate::VaultError::Oracle`] if the snapshot's config fails
    ///   validation
    pub fn restore(
        snapshot: VaultSnapshot,
        assets: L,
        authorizer: A,
        primary: Box<dyn PriceSource + Send>,
        fallback: Box<dyn PriceSource + Send>,
    ) -> Result<Self> {
        let pipeline = PricePipeline::from_parts(
            primary,
            fallback,
            snapshot.config,
            snapshot.ring,
            snapshot.resolution,
        )?;
        Ok(Vault::from_parts(
            assets,
            authorizer,
            pipeline,
            snapshot.total_shares,
            snapshot.share_balances,
        ))
    }
}

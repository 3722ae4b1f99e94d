//! Primary/fallback/last-valid price resolution.
//!
//! Each resolution call walks a fixed degradation chain:
//!
//! ```text
//! TryPrimary -> TryFallback -> UseLastValid -> NoValidPrice
//! ```
//!
//! A primary acceptance records an observation and advances the last-valid
//! register. A fallback acceptance is returned to the caller but does not
//! advance the deviation baseline unless
//! [`OracleConfig::fallback_extends_baseline`] is set. The last valid price
//! serves only within the configured grace period; past that the call fails
//! and an operator is expected to respond with an emergency shutdown.
//!
//! Shutdown is terminal until explicitly cleared: it short-circuits every
//! resolution and TWAP query with [`OracleError::ShutdownActive`].

use caldera_types::{events::VaultEvent, price::Price, Timestamp};
use serde::{Deserialize, Serialize};

use crate::{
    ring::{Observation, RingBuffer},
    source::{normalize, PriceSource},
    validator::{validate, Candidate, OracleConfig},
    OracleError, Result,
};

/// A resolved price whose ring append and last-valid update are deferred.
///
/// Produced by [`PricePipeline::begin_resolve`]; the caller passes it back
/// to [`PricePipeline::commit_price`] in the same final commit step as its
/// own state change. Dropping it instead discards the staged acceptance and
/// leaves the pipeline exactly as it was.
#[must_use = "a pending price must be committed or deliberately dropped"]
#[derive(Clone, Copy, Debug)]
pub struct PendingPrice {
    price: Price,
    staged: Option<Observation>,
}

impl PendingPrice {
    /// The resolved price.
    pub fn price(&self) -> Price {
        self.price
    }
}

/// Durable resolution state: the last price that cleared every check, and
/// the shutdown flag.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ResolutionState {
    /// Last price that passed all validator checks, if any.
    pub last_valid_price: Option<Price>,
    /// Timestamp of that acceptance.
    pub last_valid_timestamp: Timestamp,
    /// Whether emergency shutdown is active.
    pub emergency_shutdown: bool,
}

/// The resolution pipeline: two sources, the observation ring, and the
/// last-valid register, producing one authoritative price per call.
pub struct PricePipeline {
    primary: Box<dyn PriceSource + Send>,
    fallback: Box<dyn PriceSource + Send>,
    ring: RingBuffer,
    state: ResolutionState,
    config: OracleConfig,
    events: Vec<VaultEvent>,
}

impl PricePipeline {
    /// Create a pipeline with an empty ring and no last-valid price.
    ///
    /// # Errors
    ///
    /// - [`OracleError::InvalidConfig`] if the config fails validation
    pub fn new(
        primary: Box<dyn PriceSource + Send>,
        fallback: Box<dyn PriceSource + Send>,
        config: OracleConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            primary,
            fallback,
            ring: RingBuffer::new(),
            state: ResolutionState::default(),
            config,
            events: Vec::new(),
        })
    }

    /// Rebuild a pipeline from persisted parts.
    ///
    /// # Errors
    ///
    /// - [`OracleError::InvalidConfig`] if the config fails validation
    pub fn from_parts(
        primary: Box<dyn PriceSource + Send>,
        fallback: Box<dyn PriceSource + Send>,
        config: OracleConfig,
        ring: RingBuffer,
        state: ResolutionState,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            primary,
            fallback,
            ring,
            state,
            config,
            events: Vec::new(),
        })
    }

    /// Resolve one authoritative price at `now`, committing any acceptance
    /// immediately.
    ///
    /// # Errors
    ///
    /// - [`OracleError::ShutdownActive`] while shut down
    /// - [`OracleError::NoValidPrice`] when both sources fail and the last
    ///   valid price is unset or older than the grace period
    pub fn resolve(&mut self, now: Timestamp) -> Result<Price> {
        let pending = self.begin_resolve(now)?;
        Ok(self.commit_price(pending))
    }

    /// Run the resolution state machine without committing.
    ///
    /// All fallible work happens here; the returned [`PendingPrice`] carries
    /// any staged ring observation. Source rejections still queue their
    /// `OracleFailed` events — a rejection is a pipeline transition that
    /// happened regardless of what the caller does next.
    ///
    /// # Errors
    ///
    /// As for [`resolve`](Self::resolve), plus the staging errors of
    /// [`RingBuffer::stage`].
    pub fn begin_resolve(&mut self, now: Timestamp) -> Result<PendingPrice> {
        if self.state.emergency_shutdown {
            return Err(OracleError::ShutdownActive);
        }

        // Config and baseline are read once here; nothing re-reads them
        // mid-resolution.
        let config = self.config.clone();
        let baseline = self.ring.latest().map(|obs| obs.price);

        match Self::read_and_validate(self.primary.as_ref(), now, baseline, &config) {
            Ok(price) => {
                return Ok(PendingPrice {
                    price,
                    staged: Some(self.ring.stage(price, now)?),
                });
            }
            Err(err) => self.note_failure("primary", &err, now),
        }

        // The fallback is judged against the same baseline as the primary,
        // not against its own history.
        match Self::read_and_validate(self.fallback.as_ref(), now, baseline, &config) {
            Ok(price) => {
                let staged = if config.fallback_extends_baseline {
                    Some(self.ring.stage(price, now)?)
                } else {
                    tracing::info!(price = %price, "resolved via fallback (baseline unchanged)");
                    None
                };
                return Ok(PendingPrice { price, staged });
            }
            Err(err) => self.note_failure("fallback", &err, now),
        }

        match self.state.last_valid_price {
            Some(last)
                if now.saturating_sub(self.state.last_valid_timestamp)
                    <= config.grace_period_secs =>
            {
                tracing::warn!(
                    price = %last,
                    age = now.saturating_sub(self.state.last_valid_timestamp),
                    "both sources failed, serving last valid price"
                );
                Ok(PendingPrice {
                    price: last,
                    staged: None,
                })
            }
            _ => {
                self.note_failure("last-valid", &OracleError::NoValidPrice, now);
                Err(OracleError::NoValidPrice)
            }
        }
    }

    /// Commit a staged resolution: write the observation, advance the
    /// last-valid register, and emit `PriceUpdated`. Infallible, so callers
    /// can run it inside their own final commit step.
    pub fn commit_price(&mut self, pending: PendingPrice) -> Price {
        if let Some(obs) = pending.staged {
            self.ring.commit(obs);
            self.state.last_valid_price = Some(obs.price);
            self.state.last_valid_timestamp = obs.timestamp;
            tracing::info!(price = %obs.price, timestamp = obs.timestamp, "price accepted");
            self.events.push(VaultEvent::PriceUpdated {
                price: obs.price,
                timestamp: obs.timestamp,
                cumulative_price: obs.cumulative_price,
            });
        }
        pending.price
    }

    /// Time-weighted average over the trailing `window` ending at `now`.
    ///
    /// # Errors
    ///
    /// - [`OracleError::ShutdownActive`] while shut down
    /// - [`OracleError::InsufficientHistory`] if the ring does not span the
    ///   window; the window is never silently shrunk
    pub fn twap(&self, now: Timestamp, window: u64) -> Result<Price> {
        if self.state.emergency_shutdown {
            return Err(OracleError::ShutdownActive);
        }
        self.ring.twap(now, window)
    }

    /// The last valid price and its timestamp, regardless of age or
    /// shutdown. This backs historical-price queries during failure windows
    /// and the emergency withdrawal path.
    pub fn last_valid(&self) -> Option<(Price, Timestamp)> {
        self.state
            .last_valid_price
            .map(|p| (p, self.state.last_valid_timestamp))
    }

    /// Toggle emergency shutdown. Emits [`VaultEvent::EmergencyShutdown`]
    /// once per actual transition; setting the current value is a no-op.
    pub fn set_shutdown(&mut self, active: bool) {
        if self.state.emergency_shutdown == active {
            return;
        }
        self.state.emergency_shutdown = active;
        if active {
            tracing::warn!("emergency shutdown engaged");
        } else {
            tracing::info!("emergency shutdown cleared");
        }
        self.events.push(VaultEvent::EmergencyShutdown { active });
    }

    /// Whether emergency shutdown is active.
    pub fn is_shutdown(&self) -> bool {
        self.state.emergency_shutdown
    }

    /// Replace the configuration.
    ///
    /// # Errors
    ///
    /// - [`OracleError::InvalidConfig`] if the new config fails validation;
    ///   the current config is kept
    pub fn set_config(&mut self, config: OracleConfig) -> Result<()> {
        config.validate()?;
        tracing::info!(
            max_staleness_secs = config.max_staleness_secs,
            max_deviation_bps = config.max_deviation_bps,
            grace_period_secs = config.grace_period_secs,
            "oracle config updated"
        );
        self.config = config;
        Ok(())
    }

    /// Replace both price sources.
    pub fn set_sources(
        &mut self,
        primary: Box<dyn PriceSource + Send>,
        fallback: Box<dyn PriceSource + Send>,
    ) {
        tracing::info!("oracle sources replaced");
        self.primary = primary;
        self.fallback = fallback;
    }

    /// Current configuration.
    pub fn config(&self) -> &OracleConfig {
        &self.config
    }

    /// The observation ring.
    pub fn ring(&self) -> &RingBuffer {
        &self.ring
    }

    /// The durable resolution state.
    pub fn state(&self) -> &ResolutionState {
        &self.state
    }

    /// Drain events queued since the last call.
    pub fn take_events(&mut self) -> Vec<VaultEvent> {
        std::mem::take(&mut self.events)
    }

    fn read_and_validate(
        source: &(dyn PriceSource + Send),
        now: Timestamp,
        baseline: Option<Price>,
        config: &OracleConfig,
    ) -> Result<Price> {
        let reading = source.latest_reading()?;
        let price = normalize(&reading)?;
        validate(
            &Candidate {
                price,
                updated_at: reading.updated_at,
                round_complete: reading.round_complete,
            },
            now,
            baseline,
            config,
        )
    }

    fn note_failure(&mut self, stage: &str, err: &OracleError, now: Timestamp) {
        tracing::warn!(stage, error = %err, "price resolution stage failed");
        self.events.push(VaultEvent::OracleFailed {
            reason: format!("{stage}: {err}"),
            timestamp: now,
        });
    }
}

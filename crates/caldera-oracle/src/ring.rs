//! Fixed-capacity observation ring with TWAP queries.
//!
//! Each accepted price is stored as an [`Observation`] carrying a running
//! cumulative of `price * elapsed`, so the time-weighted average over any
//! window is a subtraction of two cumulatives divided by the time delta:
//!
//! ```text
//! TWAP = (cumulative_new - cumulative_old) / (ts_new - ts_old)
//! ```
//!
//! The ring is an arena of [`MAX_OBSERVATIONS`] slots plus a monotonic write
//! counter; the physical index is the counter modulo capacity, and the number
//! of valid entries is tracked separately from the storage size. Once full,
//! the oldest observation is overwritten. Eviction cannot corrupt in-window
//! averages because the cumulatives travel with the observations.

use caldera_types::{price::Price, Timestamp, MAX_OBSERVATIONS};
use serde::{Deserialize, Serialize};

use crate::{OracleError, Result};

/// One accepted price observation. Immutable once written.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    /// Time the observation was recorded.
    pub timestamp: Timestamp,
    /// The accepted price.
    pub price: Price,
    /// Running sum of `price * elapsed` up to and including this observation.
    pub cumulative_price: u128,
}

/// Fixed-capacity FIFO ring of price observations.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RingBuffer {
    slots: Vec<Observation>,
    /// Monotonic count of appends; physical index = written % capacity.
    written: u64,
    capacity: usize,
}

impl RingBuffer {
    /// Create an empty ring with the default capacity ([`MAX_OBSERVATIONS`]).
    pub fn new() -> Self {
        Self::with_capacity(MAX_OBSERVATIONS)
    }

    /// Create an empty ring with a custom capacity (minimum 1).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Vec::with_capacity(capacity),
            written: 0,
            capacity,
        }
    }

    /// Number of valid observations currently buffered.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the ring holds no observations yet.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// The most recently appended observation.
    pub fn latest(&self) -> Option<&Observation> {
        if self.written == 0 {
            return None;
        }
        let idx = ((self.written - 1) % self.capacity as u64) as usize;
        self.slots.get(idx)
    }

    /// Time span covered by the buffered observations, in seconds.
    pub fn span(&self) -> u64 {
        match (self.oldest(), self.latest()) {
            (Some(old), Some(new)) => new.timestamp - old.timestamp,
            _ => 0,
        }
    }

    /// The oldest observation still buffered.
    pub fn oldest(&self) -> Option<&Observation> {
        self.get(0)
    }

    /// Observation at logical position `i`, 0 = oldest.
    fn get(&self, i: usize) -> Option<&Observation> {
        if i >= self.len() {
            return None;
        }
        let first = if self.written as usize <= self.capacity {
            0
        } else {
            (self.written % self.capacity as u64) as usize
        };
        self.slots.get((first + i) % self.capacity)
    }

    /// Compute the observation an append at (`price`, `now`) would write,
    /// without writing it. All fallible work happens here so that
    /// [`commit`](Self::commit) cannot fail.
    ///
    /// The cumulative is `previous_cumulative + price * (now - previous_ts)`;
    /// the first observation starts at 0. A repeated timestamp is allowed
    /// (elapsed 0 contributes nothing); a decreasing one is rejected.
    ///
    /// # Errors
    ///
    /// - [`OracleError::NonMonotonicTimestamp`] if `now` precedes the latest
    ///   buffered timestamp
    /// - [`OracleError::Overflow`] if the cumulative sum overflows
    pub fn stage(&self, price: Price, now: Timestamp) -> Result<Observation> {
        let cumulative_price = match self.latest() {
            None => 0,
            Some(prev) => {
                if now < prev.timestamp {
                    return Err(OracleError::NonMonotonicTimestamp {
                        new: now,
                        last: prev.timestamp,
                    });
                }
                let elapsed = u128::from(now - prev.timestamp);
                price
                    .raw()
                    .checked_mul(elapsed)
                    .and_then(|weighted| prev.cumulative_price.checked_add(weighted))
                    .ok_or(OracleError::Overflow)?
            }
        };
        Ok(Observation {
            timestamp: now,
            price,
            cumulative_price,
        })
    }

    /// Write a staged observation, evicting the oldest once at capacity.
    /// Infallible: validity was established by [`stage`](Self::stage), and
    /// nothing mutates the ring between the two under the single-writer
    /// model.
    pub fn commit(&mut self, obs: Observation) {
        let idx = (self.written % self.capacity as u64) as usize;
        if idx < self.slots.len() {
            self.slots[idx] = obs;
        } else {
            self.slots.push(obs);
        }
        self.written += 1;
    }

    /// Stage and immediately commit a new observation.
    ///
    /// # Errors
    ///
    /// As for [`stage`](Self::stage).
    pub fn append(&mut self, price: Price, now: Timestamp) -> Result<Observation> {
        let obs = self.stage(price, now)?;
        self.commit(obs);
        Ok(obs)
    }

    /// Time-weighted average price over the trailing `window` ending at `now`.
    ///
    /// Boundary lookup is a bounded linear scan over at most `capacity`
    /// entries. The window is never silently shrunk: if no buffered
    /// observation exists at or before `now - window`, the call fails.
    ///
    /// # Errors
    ///
    /// - [`OracleError::InsufficientHistory`] if the buffer does not reach
    ///   back to `now - window`, if no observation is at or before `now`, or
    ///   if both boundary observations share a timestamp
    pub fn twap(&self, now: Timestamp, window: u64) -> Result<Price> {
        let insufficient = || OracleError::InsufficientHistory {
            window,
            span: self.span(),
        };

        let newest = self
            .newest_at_or_before(now)
            .ok_or_else(insufficient)?;
        let target = now.checked_sub(window).ok_or_else(insufficient)?;
        let oldest = self
            .newest_at_or_before(target)
            .ok_or_else(insufficient)?;

        let delta = newest.timestamp - oldest.timestamp;
        if delta == 0 {
            return Err(insufficient());
        }

        let avg = (newest.cumulative_price - oldest.cumulative_price) / u128::from(delta);
        Ok(Price::from_raw(avg))
    }

    /// Newest buffered observation with `timestamp <= at`.
    fn newest_at_or_before(&self, at: Timestamp) -> Option<&Observation> {
        (0..self.len())
            .rev()
            .filter_map(|i| self.get(i))
            .find(|obs| obs.timestamp <= at)
    }
}

impl Default for RingBuffer {
    fn default() -> Self {
        Self::new()
    }
}

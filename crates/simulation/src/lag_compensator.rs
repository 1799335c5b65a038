//! Server-side lag compensation
//!
//! A shooter with 150ms of latency aims at where the target was 150ms ago.
//! `LagCompensator` judges a hit claim against the world as the shooter saw
//! it: it rewinds `WorldHistory` by the shooter's latency, reads the target's
//! position at the closest recorded tick and checks the claimed hit point
//! against it.
//!
//! Validation only reads the history, so any number of claims can be judged
//! concurrently under a shared read lock.

use std::time::Duration;

use tickshift_protocol::{EntityId, Tick, Vec2};

use crate::config::SyncConfig;
use crate::world_history::WorldHistory;

/// A hit claim as seen by the server
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitRequest {
    pub shooter_id: EntityId,
    pub target_id: EntityId,
    pub claimed_position: Vec2,
    pub shooter_latency: Duration,
    pub hit_radius: f32,
}

/// Result of a successfully adjudicated claim
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitVerdict {
    pub valid: bool,
    pub shooter_id: EntityId,
    pub target_id: EntityId,

    /// Tick the world was rewound to
    pub rewound_tick: Tick,

    /// Target position at `rewound_tick`
    pub target_position: Vec2,

    /// Distance between the claimed point and `target_position`
    pub distance: f32,

    /// Latency actually compensated after clamping, in ms
    pub compensation_ms: u64,
}

/// Reasons a claim cannot be adjudicated
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RewindError {
    #[error("World history is empty")]
    EmptyHistory,

    #[error("Rewind of {rewind_ms}ms reaches past the {retained_ms}ms of retained history")]
    StaleReference { rewind_ms: u64, retained_ms: u64 },

    #[error("Entity {target_id} has no recorded position at tick {tick}")]
    UnknownTarget { target_id: EntityId, tick: Tick },
}

/// Rewinds world history to validate time-shifted hit claims
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LagCompensator {
    min_compensation_ms: u64,
    max_compensation_ms: u64,
}

impl LagCompensator {
    pub fn new() -> Self {
        Self::with_config(&SyncConfig::default())
    }

    pub fn with_config(config: &SyncConfig) -> Self {
        Self::with_bounds(config.min_compensation_ms, config.max_compensation_ms)
    }

    pub fn with_bounds(min_compensation_ms: u64, max_compensation_ms: u64) -> Self {
        Self {
            min_compensation_ms: min_compensation_ms.min(max_compensation_ms),
            max_compensation_ms,
        }
    }

    /// Latency (ms) the rewind will use for a measured latency
    pub fn compensation_ms(&self, latency: Duration) -> u64 {
        let latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        latency_ms.clamp(self.min_compensation_ms, self.max_compensation_ms)
    }

    /// Judges a hit claim against the rewound world
    ///
    /// "Now" is the newest recorded tick. A claim whose raw latency reaches
    /// before the oldest retained entry cannot be judged fairly and fails with
    /// `RewindError::StaleReference`. Otherwise the latency is clamped to
    /// the configured compensation range and the nearest tick is used.
    pub fn validate_hit(
        &self,
        history: &WorldHistory,
        request: &HitRequest,
    ) -> Result<HitVerdict, RewindError> {
        let now = history.newest_timestamp().ok_or(RewindError::EmptyHistory)?;
        let oldest = history.oldest_timestamp().ok_or(RewindError::EmptyHistory)?;

        let latency_ms = u64::try_from(request.shooter_latency.as_millis()).unwrap_or(u64::MAX);
        match now.checked_sub(latency_ms) {
            Some(requested) if requested >= oldest => {}
            _ => {
                return Err(RewindError::StaleReference {
                    rewind_ms: latency_ms,
                    retained_ms: now - oldest,
                })
            }
        }

        let compensation_ms = self.compensation_ms(request.shooter_latency);
        // The minimum must not push a fresh claim off the start of history
        let rewind_time = now.saturating_sub(compensation_ms).max(oldest);
        let entry = history.nearest(rewind_time)?;

        let target_position =
            entry
                .position(request.target_id)
                .ok_or(RewindError::UnknownTarget {
                    target_id: request.target_id,
                    tick: entry.tick,
                })?;

        let distance = request.claimed_position.distance(target_position);
        let valid = distance <= request.hit_radius;

        tracing::debug!(
            shooter = request.shooter_id,
            target = request.target_id,
            rewound_tick = entry.tick,
            compensation_ms,
            distance,
            valid,
            "Validated hit claim"
        );

        Ok(HitVerdict {
            valid,
            shooter_id: request.shooter_id,
            target_id: request.target_id,
            rewound_tick: entry.tick,
            target_position,
            distance,
            compensation_ms,
        })
    }

    /// Like `validate_hit`, but any claim that cannot be adjudicated counts
    /// as a miss and is logged
    pub fn is_valid_hit(&self, history: &WorldHistory, request: &HitRequest) -> bool {
        match self.validate_hit(history, request) {
            Ok(verdict) => verdict.valid,
            Err(e) => {
                tracing::warn!(
                    shooter = request.shooter_id,
                    target = request.target_id,
                    error = %e,
                    "Rejecting hit claim"
                );
                false
            }
        }
    }

    pub fn min_compensation_ms(&self) -> u64 {
        self.min_compensation_ms
    }

    pub fn max_compensation_ms(&self) -> u64 {
        self.max_compensation_ms
    }
}

impl Default for LagCompensator {
    fn default() -> Self {
        Self::new()
    }
}

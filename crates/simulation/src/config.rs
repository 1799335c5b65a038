//! Tunable parameters of the synchronization core
//!
//! All values are plain numbers with defaults; loading them from a file is
//! the embedding application's business. Every field is `#[serde(default)]`
//! so a partial document only overrides what it names.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What a remote entity does when render time runs past its newest snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrunPolicy {
    /// Stay on the newest snapshot (t = 1)
    #[default]
    Hold,

    /// Keep moving along the newest velocity, up to the extrapolation horizon
    Extrapolate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Client input history entries (≈6.4s at 20Hz)
    pub input_history_capacity: usize,

    /// Snapshots kept per remote entity (≈5s at 20Hz)
    pub snapshot_capacity: usize,

    /// Render delay applied to remote entities
    pub interpolation_delay_ms: u64,

    /// Maximum time past the newest snapshot an entity may be projected
    pub extrapolation_horizon_ms: u64,

    pub overrun_policy: OverrunPolicy,

    /// Latencies below this are judged as this much
    pub min_compensation_ms: u64,

    /// Latencies above this are capped to it
    pub max_compensation_ms: u64,

    /// Server world history entries (≈7.5s at 20Hz)
    pub world_history_capacity: usize,

    pub tick_rate_hz: u32,

    /// Upper bound on the time step a single input may claim
    pub max_input_dt_ms: u64,

    /// A remote entity is dropped once its newest snapshot is this far behind render time
    pub remote_expiry_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            input_history_capacity: 128,
            snapshot_capacity: 100,
            interpolation_delay_ms: 100,
            extrapolation_horizon_ms: 200,
            overrun_policy: OverrunPolicy::Hold,
            min_compensation_ms: 5,
            max_compensation_ms: 1000,
            world_history_capacity: 150,
            tick_rate_hz: 20,
            max_input_dt_ms: 250,
            remote_expiry_ms: 1000,
        }
    }
}

impl SyncConfig {
    /// Milliseconds between server ticks
    pub fn tick_interval_ms(&self) -> u64 {
        1000 / u64::from(self.tick_rate_hz.max(1))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms())
    }

    pub fn interpolation_delay(&self) -> Duration {
        Duration::from_millis(self.interpolation_delay_ms)
    }

    /// Longest step one input may advance the simulation by, in seconds
    pub fn max_input_dt(&self) -> f32 {
        self.max_input_dt_ms as f32 / 1000.0
    }

    /// Time covered by a full world history
    pub fn world_history_span_ms(&self) -> u64 {
        self.world_history_capacity as u64 * self.tick_interval_ms()
    }

    /// Checks the parameters against each other
    ///
    /// The world history must reach at least `max_compensation_ms` into the
    /// past, otherwise valid rewind targets are already evicted.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_rate_hz == 0 || self.tick_rate_hz > 1000 {
            return Err(ConfigError::InvalidTickRate(self.tick_rate_hz));
        }
        if self.input_history_capacity == 0 {
            return Err(ConfigError::ZeroCapacity("input_history_capacity"));
        }
        if self.snapshot_capacity < 2 {
            return Err(ConfigError::SnapshotCapacityTooSmall(self.snapshot_capacity));
        }
        if self.world_history_capacity == 0 {
            return Err(ConfigError::ZeroCapacity("world_history_capacity"));
        }
        if self.max_input_dt_ms == 0 {
            return Err(ConfigError::ZeroDuration("max_input_dt_ms"));
        }
        if self.remote_expiry_ms <= self.interpolation_delay_ms {
            return Err(ConfigError::ExpiryWithinDelay {
                expiry_ms: self.remote_expiry_ms,
                delay_ms: self.interpolation_delay_ms,
            });
        }
        if self.min_compensation_ms > self.max_compensation_ms {
            return Err(ConfigError::CompensationRange {
                min_ms: self.min_compensation_ms,
                max_ms: self.max_compensation_ms,
            });
        }
        if self.world_history_span_ms() < self.max_compensation_ms {
            return Err(ConfigError::HistoryTooShort {
                span_ms: self.world_history_span_ms(),
                max_compensation_ms: self.max_compensation_ms,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Tick rate must be within 1..=1000 Hz, got {0}")]
    InvalidTickRate(u32),

    #[error("{0} must be greater than zero")]
    ZeroCapacity(&'static str),

    #[error("Snapshot capacity must hold at least two snapshots, got {0}")]
    SnapshotCapacityTooSmall(usize),

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("Remote expiry {expiry_ms}ms must exceed the interpolation delay {delay_ms}ms")]
    ExpiryWithinDelay { expiry_ms: u64, delay_ms: u64 },

    #[error("Minimum compensation {min_ms}ms exceeds maximum {max_ms}ms")]
    CompensationRange { min_ms: u64, max_ms: u64 },

    #[error("World history spans {span_ms}ms, shorter than max compensation {max_compensation_ms}ms")]
    HistoryTooShort { span_ms: u64, max_compensation_ms: u64 },
}

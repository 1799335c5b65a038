//! Remote entity snapshot history and render-time interpolation
//!
//! Remote entities are drawn slightly in the past (the interpolation delay)
//! so that the render time almost always falls between two received
//! snapshots. Each entity keeps its own timestamp-ordered stream; datagrams
//! arriving out of order are slotted into place rather than appended.

use std::collections::{HashMap, VecDeque};

use tickshift_protocol::{EntityId, Vec2};

use crate::config::{OverrunPolicy, SyncConfig};

/// A timestamped copy of one entity's state
///
/// `server_timestamp` is server time in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Snapshot {
    pub server_timestamp: u64,
    pub entity_id: EntityId,
    pub position: Vec2,
    pub velocity: Vec2,
}

/// How a `RenderState` was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Between (or exactly on) two retained snapshots
    Interpolated,

    /// Render time precedes the retained window; oldest snapshot used
    ClampedToOldest,

    /// Past the newest snapshot, holding it (`OverrunPolicy::Hold`)
    Held,

    /// Past the newest snapshot, projected along its velocity
    /// (`OverrunPolicy::Extrapolate`)
    Extrapolated,

    /// Past the newest snapshot by more than the extrapolation horizon;
    /// the value is capped at the horizon and should be treated as stale
    Stale,
}

/// Position and velocity to draw a remote entity with
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderState {
    pub position: Vec2,
    pub velocity: Vec2,
    pub mode: RenderMode,
}

/// Per-entity snapshot streams with a fixed capacity each
#[derive(Debug, Clone)]
pub struct SnapshotBuffer {
    streams: HashMap<EntityId, VecDeque<Snapshot>>,
    capacity: usize,
    interpolation_delay_ms: u64,
    extrapolation_horizon_ms: u64,
    overrun_policy: OverrunPolicy,
    expiry_ms: u64,
}

impl SnapshotBuffer {
    pub fn new() -> Self {
        Self::with_config(&SyncConfig::default())
    }

    pub fn with_config(config: &SyncConfig) -> Self {
        Self {
            streams: HashMap::new(),
            capacity: config.snapshot_capacity.max(2),
            interpolation_delay_ms: config.interpolation_delay_ms,
            extrapolation_horizon_ms: config.extrapolation_horizon_ms,
            overrun_policy: config.overrun_policy,
            expiry_ms: config.remote_expiry_ms,
        }
    }

    /// Stores a snapshot at its timestamp position
    ///
    /// A snapshot with an already stored timestamp replaces it. A snapshot
    /// older than everything in a full stream would be evicted immediately,
    /// so it is dropped and `false` is returned.
    pub fn add_snapshot(&mut self, entity_id: EntityId, snapshot: Snapshot) -> bool {
        let capacity = self.capacity;
        let stream = self
            .streams
            .entry(entity_id)
            .or_insert_with(|| VecDeque::with_capacity(capacity));

        let ts = snapshot.server_timestamp;
        let idx = stream.partition_point(|s| s.server_timestamp < ts);

        if stream.get(idx).is_some_and(|s| s.server_timestamp == ts) {
            stream[idx] = snapshot;
            return true;
        }

        if idx == 0 && stream.len() >= capacity {
            tracing::trace!(entity_id, ts, "Dropping snapshot older than retained window");
            return false;
        }

        stream.insert(idx, snapshot);
        if stream.len() > capacity {
            stream.pop_front();
        }
        true
    }

    /// Render time for a client clock reading (server time, ms)
    pub fn render_time(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.interpolation_delay_ms)
    }

    /// State of `entity_id` at `render_time`
    ///
    /// Returns `None` while fewer than two snapshots are known; the caller
    /// keeps drawing the last position it had.
    pub fn interpolate_entity(&self, entity_id: EntityId, render_time: u64) -> Option<RenderState> {
        let stream = self.streams.get(&entity_id)?;
        if stream.len() < 2 {
            return None;
        }
        let oldest = stream.front()?;
        let newest = stream.back()?;

        if render_time < oldest.server_timestamp {
            return Some(RenderState {
                position: oldest.position,
                velocity: oldest.velocity,
                mode: RenderMode::ClampedToOldest,
            });
        }

        if render_time >= newest.server_timestamp {
            return Some(self.overrun(newest, render_time - newest.server_timestamp));
        }

        // oldest <= render_time < newest, so both neighbours exist
        let idx = stream.partition_point(|s| s.server_timestamp <= render_time);
        let s0 = &stream[idx - 1];
        let s1 = &stream[idx];

        let span = (s1.server_timestamp - s0.server_timestamp) as f64;
        let t = ((render_time - s0.server_timestamp) as f64 / span).clamp(0.0, 1.0) as f32;

        Some(RenderState {
            position: s0.position.lerp(s1.position, t),
            velocity: s0.velocity.lerp(s1.velocity, t),
            mode: RenderMode::Interpolated,
        })
    }

    fn overrun(&self, newest: &Snapshot, overrun_ms: u64) -> RenderState {
        if overrun_ms == 0 {
            return RenderState {
                position: newest.position,
                velocity: newest.velocity,
                mode: RenderMode::Interpolated,
            };
        }

        let stale = overrun_ms > self.extrapolation_horizon_ms;
        match self.overrun_policy {
            OverrunPolicy::Hold => RenderState {
                position: newest.position,
                velocity: newest.velocity,
                mode: if stale { RenderMode::Stale } else { RenderMode::Held },
            },
            OverrunPolicy::Extrapolate => {
                let capped_ms = overrun_ms.min(self.extrapolation_horizon_ms);
                let seconds = capped_ms as f32 / 1000.0;
                RenderState {
                    position: newest.position + newest.velocity * seconds,
                    velocity: newest.velocity,
                    mode: if stale {
                        RenderMode::Stale
                    } else {
                        RenderMode::Extrapolated
                    },
                }
            }
        }
    }

    /// Interpolates every known entity, ordered by entity id
    pub fn interpolate_all(&self, render_time: u64) -> Vec<(EntityId, RenderState)> {
        let mut ids: Vec<EntityId> = self.streams.keys().copied().collect();
        ids.sort_unstable();
        ids.into_iter()
            .filter_map(|id| self.interpolate_entity(id, render_time).map(|s| (id, s)))
            .collect()
    }

    /// Newest snapshot received for `entity_id`
    pub fn latest(&self, entity_id: EntityId) -> Option<&Snapshot> {
        self.streams.get(&entity_id).and_then(|s| s.back())
    }

    pub fn remove_entity(&mut self, entity_id: EntityId) -> bool {
        self.streams.remove(&entity_id).is_some()
    }

    /// Forgets entities the server stopped describing
    ///
    /// A stream whose newest snapshot is more than the expiry older than
    /// `render_time` is dropped. Returns how many were removed.
    pub fn prune_expired(&mut self, render_time: u64) -> usize {
        let cutoff = render_time.saturating_sub(self.expiry_ms);
        let before = self.streams.len();
        self.streams.retain(|&entity_id, stream| {
            let keep = stream.back().is_some_and(|s| s.server_timestamp >= cutoff);
            if !keep {
                tracing::debug!(entity_id, render_time, "Dropping expired remote entity");
            }
            keep
        });
        before - self.streams.len()
    }

    /// Number of snapshots held for `entity_id`
    pub fn len(&self, entity_id: EntityId) -> usize {
        self.streams.get(&entity_id).map_or(0, VecDeque::len)
    }

    pub fn entity_count(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn overrun_policy(&self) -> OverrunPolicy {
        self.overrun_policy
    }

    pub fn set_overrun_policy(&mut self, policy: OverrunPolicy) {
        self.overrun_policy = policy;
    }
}

impl Default for SnapshotBuffer {
    fn default() -> Self {
        Self::new()
    }
}

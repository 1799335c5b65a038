//! Server-side history of world positions per tick
//!
//! Recorded once per tick right after the simulation step, read by the lag
//! compensator to see the world as a lagging client saw it. Fixed capacity,
//! O(1) insert, oldest entry evicted first.

use std::collections::{HashMap, VecDeque};

use tickshift_protocol::{EntityId, Tick, Vec2};

use crate::config::SyncConfig;
use crate::lag_compensator::RewindError;
use crate::WorldState;

/// Positions of every entity at one tick
#[derive(Debug, Clone, PartialEq)]
pub struct WorldHistoryEntry {
    pub tick: Tick,

    /// Server time of the tick in ms (`tick * tick_interval_ms`)
    pub timestamp: u64,

    pub entity_positions: HashMap<EntityId, Vec2>,
}

impl WorldHistoryEntry {
    pub fn position(&self, entity_id: EntityId) -> Option<Vec2> {
        self.entity_positions.get(&entity_id).copied()
    }
}

#[derive(Debug, Clone)]
pub struct WorldHistory {
    entries: VecDeque<WorldHistoryEntry>,
    capacity: usize,
    tick_interval_ms: u64,
}

impl WorldHistory {
    pub fn new(capacity: usize, tick_interval_ms: u64) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            tick_interval_ms: tick_interval_ms.max(1),
        }
    }

    pub fn with_config(config: &SyncConfig) -> Self {
        Self::new(config.world_history_capacity, config.tick_interval_ms())
    }

    /// Records the authoritative positions for `tick`
    ///
    /// Ticks must strictly increase; a tick at or below the newest recorded
    /// one is refused and `false` is returned.
    pub fn record_snapshot(&mut self, tick: Tick, world: &WorldState) -> bool {
        if let Some(newest) = self.entries.back() {
            if tick <= newest.tick {
                tracing::warn!(tick, newest = newest.tick, "Refusing non-increasing world history tick");
                return false;
            }
        }

        let entity_positions = world
            .iter()
            .map(|(&id, state)| (id, state.position))
            .collect();

        self.entries.push_back(WorldHistoryEntry {
            tick,
            timestamp: self.timestamp_of(tick),
            entity_positions,
        });
        if self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
        true
    }

    /// Server time of `tick` in ms
    pub fn timestamp_of(&self, tick: Tick) -> u64 {
        tick.saturating_mul(self.tick_interval_ms)
    }

    /// Entry whose timestamp is closest to `time_ms`
    ///
    /// No interpolation between ticks. Times after the newest entry resolve
    /// to the newest one; times before the oldest are a stale reference.
    pub fn nearest(&self, time_ms: u64) -> Result<&WorldHistoryEntry, RewindError> {
        let oldest = self.entries.front().ok_or(RewindError::EmptyHistory)?;
        if time_ms < oldest.timestamp {
            return Err(RewindError::StaleReference {
                rewind_ms: self.newest_timestamp().unwrap_or(0).saturating_sub(time_ms),
                retained_ms: self.retained_span_ms(),
            });
        }

        let idx = self.entries.partition_point(|e| e.timestamp < time_ms);
        if idx == self.entries.len() {
            return self.entries.back().ok_or(RewindError::EmptyHistory);
        }
        if idx == 0 {
            return Ok(&self.entries[0]);
        }

        let before = &self.entries[idx - 1];
        let after = &self.entries[idx];
        if time_ms - before.timestamp <= after.timestamp - time_ms {
            Ok(before)
        } else {
            Ok(after)
        }
    }

    pub fn get(&self, tick: Tick) -> Option<&WorldHistoryEntry> {
        self.entries
            .binary_search_by_key(&tick, |e| e.tick)
            .ok()
            .map(|i| &self.entries[i])
    }

    pub fn oldest(&self) -> Option<&WorldHistoryEntry> {
        self.entries.front()
    }

    pub fn newest(&self) -> Option<&WorldHistoryEntry> {
        self.entries.back()
    }

    pub fn oldest_timestamp(&self) -> Option<u64> {
        self.entries.front().map(|e| e.timestamp)
    }

    pub fn newest_timestamp(&self) -> Option<u64> {
        self.entries.back().map(|e| e.timestamp)
    }

    /// Time between the oldest and newest retained entries
    pub fn retained_span_ms(&self) -> u64 {
        match (self.oldest_timestamp(), self.newest_timestamp()) {
            (Some(oldest), Some(newest)) => newest - oldest,
            _ => 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn tick_interval_ms(&self) -> u64 {
        self.tick_interval_ms
    }
}

impl Default for WorldHistory {
    fn default() -> Self {
        Self::with_config(&SyncConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EntityState;

    fn world(entries: &[(EntityId, f32)]) -> WorldState {
        entries
            .iter()
            .map(|&(id, x)| {
                (
                    id,
                    EntityState {
                        position: Vec2::new(x, 0.0),
                        velocity: Vec2::ZERO,
                    },
                )
            })
            .collect()
    }

    #[test]
    fn test_record_and_evict() {
        let mut history = WorldHistory::new(3, 50);
        for tick in 1..=5 {
            assert!(history.record_snapshot(tick, &world(&[(1, tick as f32)])));
        }

        assert_eq!(history.len(), 3);
        assert_eq!(history.oldest().map(|e| e.tick), Some(3));
        assert_eq!(history.newest().map(|e| e.timestamp), Some(250));
        assert_eq!(history.retained_span_ms(), 100);
    }

    #[test]
    fn test_non_increasing_tick_refused() {
        let mut history = WorldHistory::new(10, 50);
        history.record_snapshot(4, &world(&[(1, 0.0)]));
        assert!(!history.record_snapshot(4, &world(&[(1, 1.0)])));
        assert!(!history.record_snapshot(2, &world(&[(1, 1.0)])));
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_nearest_picks_closest_tick() {
        let mut history = WorldHistory::new(10, 50);
        for tick in 0..5 {
            history.record_snapshot(tick, &world(&[(1, tick as f32)]));
        }

        assert_eq!(history.nearest(0).unwrap().tick, 0);
        assert_eq!(history.nearest(60).unwrap().tick, 1);
        assert_eq!(history.nearest(80).unwrap().tick, 2);
        assert_eq!(history.nearest(10_000).unwrap().tick, 4);
    }

    #[test]
    fn test_nearest_before_oldest_is_stale() {
        let mut history = WorldHistory::new(2, 50);
        for tick in 10..15 {
            history.record_snapshot(tick, &world(&[(1, 0.0)]));
        }
        assert!(matches!(
            history.nearest(100),
            Err(RewindError::StaleReference { .. })
        ));
    }

    #[test]
    fn test_empty_history() {
        let history = WorldHistory::default();
        assert_eq!(history.nearest(0), Err(RewindError::EmptyHistory));
        assert_eq!(history.capacity(), 150);
    }

    #[test]
    fn test_get_by_tick() {
        let mut history = WorldHistory::new(10, 50);
        history.record_snapshot(7, &world(&[(3, 9.0)]));
        assert_eq!(history.get(7).and_then(|e| e.position(3)), Some(Vec2::new(9.0, 0.0)));
        assert!(history.get(8).is_none());
    }
}

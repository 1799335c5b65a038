//! Priority-ordered outbound queue
//!
//! Under bandwidth pressure higher-priority updates leave first. A newer
//! update for an entity supersedes one still waiting in the queue, so a
//! starved low-priority entity never receives outdated state once it gets
//! its turn.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use bytes::Bytes;

use crate::types::EntityId;

#[derive(Debug)]
struct Queued {
    priority: u8,
    order: u64,
    entity_id: EntityId,
    bytes: Bytes,
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.order == other.order
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    // Max-heap: highest priority first, then oldest first
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.order.cmp(&self.order))
    }
}

/// Per-connection outbound queue of encoded updates
#[derive(Debug, Default)]
pub struct SendQueue {
    heap: BinaryHeap<Queued>,
    /// Order of the newest queued update per entity
    latest: HashMap<EntityId, u64>,
    next_order: u64,
}

impl SendQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an encoded update, superseding any queued one for the same entity
    pub fn push(&mut self, entity_id: EntityId, priority: u8, bytes: Bytes) {
        let order = self.next_order;
        self.next_order += 1;
        self.latest.insert(entity_id, order);
        self.heap.push(Queued {
            priority,
            order,
            entity_id,
            bytes,
        });
    }

    /// Pops updates, highest priority first, until `budget` bytes are used
    ///
    /// At least one update is returned when the queue is non-empty, even if
    /// it alone exceeds the budget, so an oversized update cannot wedge the
    /// queue.
    pub fn drain(&mut self, budget: usize) -> Vec<Bytes> {
        let mut out = Vec::new();
        let mut used = 0usize;

        while let Some(next) = self.heap.peek() {
            if self.latest.get(&next.entity_id) != Some(&next.order) {
                // Superseded
                self.heap.pop();
                continue;
            }
            if !out.is_empty() && used + next.bytes.len() > budget {
                break;
            }

            if let Some(item) = self.heap.pop() {
                self.latest.remove(&item.entity_id);
                used += item.bytes.len();
                out.push(item.bytes);
            }
        }

        self.compact();
        out
    }

    /// Drops superseded entries still buried below the budget cut
    ///
    /// Amortized: only runs once they make up half of the heap.
    fn compact(&mut self) {
        if self.heap.len() <= self.latest.len() * 2 {
            return;
        }
        let latest = &self.latest;
        self.heap.retain(|q| latest.get(&q.entity_id) == Some(&q.order));
    }

    /// Number of live (not superseded) queued updates
    pub fn len(&self) -> usize {
        self.latest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.latest.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
        self.latest.clear();
    }
}

//! Ring buffer of locally applied inputs
//!
//! Holds every input the client predicted but the server has not yet
//! confirmed, together with the state the prediction produced. Capacity is
//! bounded so a client that stops hearing from the server keeps predicting
//! open-loop with fixed memory.

use std::collections::VecDeque;

use tickshift_protocol::{InputCommand, Sequence};

use crate::PredictedState;

/// One predicted input and the state it produced
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub command: InputCommand,
    pub state: PredictedState,
}

/// Sequence-ordered input history with FIFO eviction
#[derive(Debug, Clone)]
pub struct InputHistory {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl InputHistory {
    /// Creates a history holding at most `capacity` entries
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends an entry, evicting the oldest once capacity is exceeded
    ///
    /// Sequences must strictly increase; an entry whose sequence is not newer
    /// than the newest stored one is refused and `false` is returned.
    pub fn push(&mut self, command: InputCommand, state: PredictedState) -> bool {
        if let Some(newest) = self.entries.back() {
            if command.sequence <= newest.command.sequence {
                return false;
            }
        }

        self.entries.push_back(HistoryEntry { command, state });
        if self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
        true
    }

    fn index_of(&self, sequence: Sequence) -> Option<usize> {
        self.entries
            .binary_search_by_key(&sequence, |e| e.command.sequence)
            .ok()
    }

    pub fn get(&self, sequence: Sequence) -> Option<&HistoryEntry> {
        self.index_of(sequence).map(|i| &self.entries[i])
    }

    pub fn contains(&self, sequence: Sequence) -> bool {
        self.index_of(sequence).is_some()
    }

    /// Drops every entry with a sequence at or below `sequence`
    pub fn discard_through(&mut self, sequence: Sequence) {
        while self
            .entries
            .front()
            .is_some_and(|e| e.command.sequence <= sequence)
        {
            self.entries.pop_front();
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut HistoryEntry> {
        self.entries.iter_mut()
    }

    pub fn oldest(&self) -> Option<&HistoryEntry> {
        self.entries.front()
    }

    pub fn newest(&self) -> Option<&HistoryEntry> {
        self.entries.back()
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

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for InputHistory {
    fn default() -> Self {
        Self::new(128) // ≈6.4s at 20Hz
    }
}

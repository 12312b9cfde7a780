//! # Bounded Observation Ring
//!
//! A fixed-capacity, append-only history of the most recent values recorded
//! for one observability stream (chunk sizes, transcript texts, emitted events).
//!
//! ## Behavior:
//! - **push**: appends at the back; once the ring holds more than `capacity`
//!   values the oldest ones are evicted from the front (FIFO)
//! - **snapshot**: returns an owned, ordered copy so callers never see the live buffer

use serde::Serialize;
use std::collections::VecDeque;

/// Default number of values kept per stream.
pub const DEFAULT_RING_CAPACITY: usize = 50;

/// Fixed-capacity recent-history buffer.
///
/// `len() <= capacity()` holds after every operation and insertion order is preserved.
#[derive(Debug, Clone)]
pub struct ObservationRing<T> {
    values: VecDeque<T>,
    capacity: usize,
}

impl<T: Clone> ObservationRing<T> {
    /// Create an empty ring. A capacity of 0 is bumped to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a value, evicting the oldest entries beyond capacity.
    pub fn push(&mut self, value: T) {
        self.values.push_back(value);
        while self.values.len() > self.capacity {
            self.values.pop_front();
        }
    }

    /// Ordered copy of the current contents, oldest first.
    pub fn snapshot(&self) -> Vec<T> {
        self.values.iter().cloned().collect()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[cfg(test)]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T: Clone> Default for ObservationRing<T> {
    fn default() -> Self {
        Self::new(DEFAULT_RING_CAPACITY)
    }
}

impl<T: Clone + Serialize> Serialize for ObservationRing<T> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.values.iter())
    }
}

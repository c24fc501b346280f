//! Fixed-capacity history with oldest-eviction.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// A bounded FIFO buffer.
///
/// When full, pushing evicts the oldest entry. Serializes as its capacity
/// plus the retained items, oldest first.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundedHistory<T> {
    capacity: usize,
    items: VecDeque<T>,
}

impl<T> BoundedHistory<T> {
    /// Create a history with the given capacity (at least 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            items: VecDeque::with_capacity(capacity.min(1024)),
        }
    }

    /// Push an item, returning the evicted one when full.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.items.len() >= self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    /// Items in insertion order (oldest first).
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.items.iter()
    }

    /// The `n` most recent items, oldest first.
    pub fn last_n(&self, n: usize) -> impl Iterator<Item = &T> {
        let skip = self.items.len().saturating_sub(n);
        self.items.iter().skip(skip)
    }

    pub fn latest(&self) -> Option<&T> {
        self.items.back()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Fill ratio in `[0, 1]`.
    pub fn utilization(&self) -> f64 {
        self.items.len() as f64 / self.capacity as f64
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Change capacity, evicting the oldest items that no longer fit.
    ///
    /// Also repairs restored state whose item count exceeds its capacity.
    pub fn resize(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.items.len() > self.capacity {
            self.items.pop_front();
        }
    }
}

//! Rolling Window Implementation

use serde::Serialize;
use std::collections::VecDeque;

/// Default window capacity (last 100 samples)
pub const DEFAULT_CAPACITY: usize = 100;

/// Bounded FIFO window. Pushing into a full window evicts the oldest sample.
///
/// Not synchronized: owners wrap it in their own lock.
#[derive(Debug, Clone, Serialize)]
pub struct RollingWindow<T> {
    /// Samples in arrival order (front = oldest)
    items: VecDeque<T>,
    /// Maximum number of samples retained
    capacity: usize,
}

impl<T: Clone> RollingWindow<T> {
    /// Create a new window with given capacity
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push a sample, returning the evicted one if the window was full
    pub fn push(&mut self, value: T) -> Option<T> {
        self.items.push_back(value);

        if self.items.len() > self.capacity {
            self.items.pop_front()
        } else {
            None
        }
    }

    /// Number of samples currently held
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// All samples, oldest first
    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}

impl<T: Clone> Default for RollingWindow<T> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// A min-heap with lazy deletion: priority updates are realized by pushing a
/// fresh entry and skipping stale ones on pop. Callers detect staleness by
/// comparing the popped priority against their authoritative value.
#[derive(Clone)]
pub struct LazyHeap<P, K> {
    heap: BinaryHeap<Reverse<(P, K)>>,
}

impl<P: Ord, K: Ord> Default for LazyHeap<P, K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Ord, K: Ord> LazyHeap<P, K> {
    pub fn new() -> Self {
        LazyHeap { heap: BinaryHeap::new() }
    }

    pub fn push(&mut self, prio: P, key: K) {
        self.heap.push(Reverse((prio, key)));
    }

    /// Removes and returns the entry with the smallest priority.
    /// Equal priorities are resolved by the key ordering.
    pub fn pop(&mut self) -> Option<(P, K)> {
        self.heap.pop().map(|Reverse(entry)| entry)
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }
}

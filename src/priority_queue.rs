// SPDX-License-Identifier: MPL-2.0

use std::collections::{BTreeMap, VecDeque};

/// A priority queue, FIFO within one priority.
///
/// Higher values of `P` are served first. Used by the session loop to order
/// outbound requests so that a DISCONNECT overtakes anything still unsent.
#[derive(Debug)]
pub struct PriorityQueue<P, T>
where
    P: Ord,
{
    // Max key = next to serve
    map: BTreeMap<P, VecDeque<T>>,
    size: usize,
}

impl<P: Ord, T> Default for PriorityQueue<P, T> {
    fn default() -> Self {
        Self {
            map: BTreeMap::new(),
            size: 0,
        }
    }
}

impl<P, T> PriorityQueue<P, T>
where
    P: Ord + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, priority: P, item: T) {
        self.map.entry(priority).or_default().push_back(item);
        self.size += 1;
    }

    /// Puts an item back at the head of its priority level.
    pub fn requeue_front(&mut self, priority: P, item: T) {
        self.map.entry(priority).or_default().push_front(item);
        self.size += 1;
    }

    /// Removes the oldest element of the highest priority.
    pub fn dequeue(&mut self) -> Option<(P, T)> {
        let mut entry = self.map.last_entry()?;
        let priority = entry.key().clone();
        let item = entry.get_mut().pop_front();
        if entry.get().is_empty() {
            entry.remove();
        }
        if item.is_some() {
            self.size -= 1;
        }
        item.map(|item| (priority, item))
    }

    pub fn peek(&self) -> Option<(&P, &T)> {
        self.map
            .iter()
            .next_back()
            .and_then(|(p, q)| q.front().map(|item| (p, item)))
    }

    /// Empties the queue, yielding items in service order.
    pub fn drain(&mut self) -> Vec<(P, T)> {
        let mut items = Vec::with_capacity(self.size);
        while let Some(item) = self.dequeue() {
            items.push(item);
        }
        items
    }

    /// Keeps only the items for which `f` returns true.
    pub fn retain(&mut self, mut f: impl FnMut(&T) -> bool) {
        for queue in self.map.values_mut() {
            queue.retain(|item| f(item));
        }
        self.map.retain(|_, q| !q.is_empty());
        self.size = self.map.values().map(VecDeque::len).sum();
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }
}

use super::{OwnerId, PendingWaiter};
use crate::library::communication::RpcError;
use log::debug;
use std::cmp::Reverse;
use std::collections::hash_map::Entry;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::time::Instant;

/// Capacity below which the queue never bothers to release memory
const CAPACITY_SHRINK_THRESHOLD: usize = 16;

/// Identifier of a waiter within a [`DeadlineQueue`], never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WaiterKey(u64);

/// Collection of [`PendingWaiters`](PendingWaiter) ordered by their deadline
///
/// Waiters are stored by key while a min-heap of `(deadline, key)` pairs provides the ordering.
/// Removing a waiter by key or owner leaves its heap entry behind, such stale entries are skipped
/// when peeking and purged whenever the heap holds twice as many slots as there are live waiters.
/// An index from owner to keys makes removing all waiters of one owner proportional to their number.
///
/// Waiters with equal deadlines are returned in insertion order. Any waiter still contained when
/// the queue is dropped is expired with [`RpcError::ShuttingDown`].
#[derive(Debug, Default)]
pub struct DeadlineQueue {
    heap: BinaryHeap<Reverse<(Instant, WaiterKey)>>,
    waiters: HashMap<WaiterKey, PendingWaiter>,
    owners: HashMap<OwnerId, HashSet<WaiterKey>>,
    next_key: u64,
}

impl DeadlineQueue {
    /// Creates an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of waiters in the queue
    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    /// Whether the queue holds no waiters
    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }

    /// Adds a waiter and returns the key it can be removed with
    pub fn insert(&mut self, waiter: PendingWaiter) -> WaiterKey {
        let key = WaiterKey(self.next_key);
        self.next_key += 1;

        self.heap.push(Reverse((waiter.deadline(), key)));
        self.owners.entry(waiter.owner()).or_default().insert(key);
        self.waiters.insert(key, waiter);

        key
    }

    /// Deadline of the earliest waiter
    pub fn next_deadline(&mut self) -> Option<Instant> {
        while let Some(Reverse((deadline, key))) = self.heap.peek() {
            if self.waiters.contains_key(key) {
                return Some(*deadline);
            }

            self.heap.pop();
        }

        None
    }

    /// Removes the waiter with the earliest deadline
    pub fn remove_earliest(&mut self) -> Option<PendingWaiter> {
        while let Some(Reverse((_, key))) = self.heap.pop() {
            if let Some(waiter) = self.detach(key) {
                self.reclaim();
                return Some(waiter);
            }
        }

        None
    }

    /// Removes the earliest waiter if its deadline is at or before `now`
    pub fn pop_expired(&mut self, now: Instant) -> Option<PendingWaiter> {
        match self.next_deadline() {
            Some(deadline) if deadline <= now => self.remove_earliest(),
            _ => None,
        }
    }

    /// Removes a specific waiter
    pub fn remove(&mut self, key: WaiterKey) -> Option<PendingWaiter> {
        let waiter = self.detach(key);
        self.reclaim();
        waiter
    }

    /// Removes all waiters belonging to `owner`
    ///
    /// The returned waiters have not been notified, callers are expected to do so once
    /// they no longer hold any lock guarding the queue.
    pub fn remove_all(&mut self, owner: OwnerId) -> Vec<PendingWaiter> {
        let keys = self.owners.remove(&owner).unwrap_or_default();
        let removed: Vec<PendingWaiter> = keys
            .into_iter()
            .filter_map(|key| self.waiters.remove(&key))
            .collect();

        self.reclaim();
        removed
    }

    /// Removes every waiter, ordered by deadline
    pub fn drain(&mut self) -> Vec<PendingWaiter> {
        self.heap.clear();
        self.owners.clear();

        let mut drained: Vec<PendingWaiter> = self.waiters.drain().map(|(_, w)| w).collect();
        drained.sort_by_key(PendingWaiter::deadline);
        drained
    }

    fn detach(&mut self, key: WaiterKey) -> Option<PendingWaiter> {
        let waiter = self.waiters.remove(&key)?;

        if let Entry::Occupied(mut keys) = self.owners.entry(waiter.owner()) {
            keys.get_mut().remove(&key);
            if keys.get().is_empty() {
                keys.remove();
            }
        }

        Some(waiter)
    }

    fn reclaim(&mut self) {
        let capacity = self.heap.capacity();

        if capacity > CAPACITY_SHRINK_THRESHOLD && self.waiters.len() < capacity / 2 {
            let waiters = &self.waiters;
            self.heap.retain(|Reverse((_, key))| waiters.contains_key(key));

            self.heap.shrink_to_fit();
            self.waiters.shrink_to_fit();
            self.owners.shrink_to_fit();

            debug!(
                "Reclaimed deadline queue memory, capacity {} -> {}",
                capacity,
                self.heap.capacity()
            );
        }
    }
}

impl Drop for DeadlineQueue {
    fn drop(&mut self) {
        for waiter in self.drain() {
            waiter.expire(RpcError::ShuttingDown);
        }
    }
}

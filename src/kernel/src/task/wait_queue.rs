//! Ordered queues of task references.
//!
//! A [`WaitQueue`] never owns tasks. It stores [`TaskId`]s into the
//! scheduler's arena, ordered by an admission key computed at insertion
//! time, so removing the head is always "next task in policy order".

use alloc::collections::BTreeMap;
use kestrel_common::{Priority, QueuePolicy, TaskId};

/// Rank used by [`WaitQueue::push_tail`]; sorts after every priority.
const TAIL_RANK: u16 = u16::MAX;

/// Ordering key: rank first, then arrival sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct WaitKey {
    rank: u16,
    seq: u64,
}

/// An ordered collection of tasks waiting on one kernel object.
///
/// Insertion and head removal are `O(log n)`. Arbitrary removal is `O(n)`;
/// it only happens when a bounded wait gives up.
#[derive(Debug)]
pub struct WaitQueue {
    entries: BTreeMap<WaitKey, TaskId>,
    next_seq: u64,
}

impl Default for WaitQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitQueue {
    /// Create an empty queue.
    pub const fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            next_seq: 0,
        }
    }

    /// Insert `task` according to `policy`.
    pub fn insert(&mut self, task: TaskId, priority: Priority, policy: QueuePolicy) {
        match policy {
            QueuePolicy::Fifo => self.push_tail(task),
            QueuePolicy::Priority => self.insert_by_priority(task, priority),
        }
    }

    /// Append `task` behind every task currently queued.
    pub fn push_tail(&mut self, task: TaskId) {
        self.insert_ranked(task, TAIL_RANK);
    }

    /// Insert `task` ahead of every less urgent task and behind every task
    /// of equal or greater urgency.
    pub fn insert_by_priority(&mut self, task: TaskId, priority: Priority) {
        self.insert_ranked(task, u16::from(priority.value()));
    }

    fn insert_ranked(&mut self, task: TaskId, rank: u16) {
        debug_assert!(!self.contains(task), "{} queued twice", task);
        let key = WaitKey {
            rank,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.entries.insert(key, task);
    }

    /// Remove and return the next task in policy order.
    pub fn pop_front(&mut self) -> Option<TaskId> {
        self.entries.pop_first().map(|(_, task)| task)
    }

    /// The next task in policy order, without removing it.
    pub fn peek(&self) -> Option<TaskId> {
        self.entries.values().next().copied()
    }

    /// Remove `task` wherever it sits. Returns whether it was queued.
    pub fn remove(&mut self, task: TaskId) -> bool {
        let key = self
            .entries
            .iter()
            .find(|(_, queued)| **queued == task)
            .map(|(key, _)| *key);
        match key {
            Some(key) => self.entries.remove(&key).is_some(),
            None => false,
        }
    }

    /// Whether `task` is queued.
    pub fn contains(&self, task: TaskId) -> bool {
        self.entries.values().any(|queued| *queued == task)
    }

    /// Number of queued tasks.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Queued tasks, head first.
    pub fn iter(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.entries.values().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    fn id(index: u32) -> TaskId {
        TaskId::new(index, 0)
    }

    #[test]
    fn test_fifo_keeps_arrival_order() {
        let mut queue = WaitQueue::new();
        for i in 1..=3 {
            queue.insert(id(i), Priority::new(10 - i as u8), QueuePolicy::Fifo);
        }

        assert_eq!(queue.pop_front(), Some(id(1)));
        assert_eq!(queue.pop_front(), Some(id(2)));
        assert_eq!(queue.pop_front(), Some(id(3)));
        assert_eq!(queue.pop_front(), None);
    }

    #[test]
    fn test_priority_order_with_fifo_ties() {
        let mut queue = WaitQueue::new();
        queue.insert(id(1), Priority::new(5), QueuePolicy::Priority);
        queue.insert(id(2), Priority::new(1), QueuePolicy::Priority);
        queue.insert(id(3), Priority::new(3), QueuePolicy::Priority);
        queue.insert(id(4), Priority::new(1), QueuePolicy::Priority);

        let order: Vec<_> = queue.iter().collect();
        assert_eq!(order, [id(2), id(4), id(3), id(1)]);
    }

    #[test]
    fn test_push_tail_goes_behind_priorities() {
        let mut queue = WaitQueue::new();
        queue.insert_by_priority(id(1), Priority::LOWEST);
        queue.push_tail(id(2));
        queue.insert_by_priority(id(3), Priority::LOWEST);

        assert_eq!(queue.peek(), Some(id(1)));
        let order: Vec<_> = queue.iter().collect();
        assert_eq!(order, [id(1), id(3), id(2)]);
    }

    #[test]
    fn test_remove_arbitrary_entry() {
        let mut queue = WaitQueue::new();
        queue.push_tail(id(1));
        queue.push_tail(id(2));
        queue.push_tail(id(3));

        assert!(queue.remove(id(2)));
        assert!(!queue.remove(id(2)));
        assert!(!queue.contains(id(2)));
        assert_eq!(queue.len(), 2);

        let order: Vec<_> = queue.iter().collect();
        assert_eq!(order, [id(1), id(3)]);
    }

    #[test]
    fn test_generation_distinguishes_ids() {
        let mut queue = WaitQueue::new();
        queue.push_tail(TaskId::new(7, 0));

        assert!(!queue.contains(TaskId::new(7, 1)));
        assert!(!queue.remove(TaskId::new(7, 1)));
        assert!(queue.contains(TaskId::new(7, 0)));
    }
}

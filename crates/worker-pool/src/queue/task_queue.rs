//! Multi-level FIFO queue
//!
//! One lane per priority level, indexed by the level's position in the list
//! given at construction. Lanes are scanned in that order on dequeue.

use std::collections::VecDeque;
use std::fmt;

/// Items that can be placed in a [`PriorityTaskQueue`]
pub trait Prioritized {
    type Level: Copy + PartialEq + fmt::Debug;

    fn priority(&self) -> Self::Level;
}

/// Queue construction and admission errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    /// No priority levels were given
    #[error("priority list must not be empty")]
    EmptyLevels,

    /// The same level appears twice
    #[error("priority level listed more than once: {0}")]
    DuplicateLevel(String),

    /// The item's level is not one of the configured levels
    #[error("priority {0} is not one of the configured levels")]
    UnknownPriority(String),
}

/// Ordered multi-level FIFO queue
///
/// `dequeue` always returns the oldest item of the highest non-empty level;
/// `unshift` places an item in front of everything else at its level.
#[derive(Debug)]
pub struct PriorityTaskQueue<T: Prioritized> {
    levels: Vec<T::Level>,
    lanes: Vec<VecDeque<T>>,
}

impl<T: Prioritized> PriorityTaskQueue<T> {
    /// Create a queue with the given levels, highest precedence first
    pub fn new(levels: Vec<T::Level>) -> Result<Self, QueueError> {
        if levels.is_empty() {
            return Err(QueueError::EmptyLevels);
        }
        for (i, level) in levels.iter().enumerate() {
            if levels[..i].contains(level) {
                return Err(QueueError::DuplicateLevel(format!("{level:?}")));
            }
        }

        let lanes = levels.iter().map(|_| VecDeque::new()).collect();
        Ok(Self { levels, lanes })
    }

    /// Configured levels in dispatch order
    pub fn levels(&self) -> &[T::Level] {
        &self.levels
    }

    /// Whether `level` is one of the configured levels
    pub fn accepts(&self, level: &T::Level) -> bool {
        self.levels.contains(level)
    }

    /// Append to the tail of the item's lane
    pub fn enqueue(&mut self, item: T) -> Result<(), QueueError> {
        let lane = self.lane_index(item.priority())?;
        self.lanes[lane].push_back(item);
        Ok(())
    }

    /// Insert at the head of the item's lane
    pub fn unshift(&mut self, item: T) -> Result<(), QueueError> {
        let lane = self.lane_index(item.priority())?;
        self.lanes[lane].push_front(item);
        Ok(())
    }

    /// Remove and return the head of the highest non-empty lane
    pub fn dequeue(&mut self) -> Option<T> {
        self.lanes.iter_mut().find_map(|lane| lane.pop_front())
    }

    /// Whether any lane holds an item
    pub fn has_task(&self) -> bool {
        self.lanes.iter().any(|lane| !lane.is_empty())
    }

    /// Total number of queued items
    pub fn size(&self) -> usize {
        self.lanes.iter().map(VecDeque::len).sum()
    }

    pub fn len(&self) -> usize {
        self.size()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_task()
    }

    /// Number of items per level, in dispatch order
    pub fn level_sizes(&self) -> Vec<(T::Level, usize)> {
        self.levels
            .iter()
            .copied()
            .zip(self.lanes.iter().map(VecDeque::len))
            .collect()
    }

    /// Keep only the items matching `keep`; returns how many were removed
    pub fn retain(&mut self, mut keep: impl FnMut(&T) -> bool) -> usize {
        let before = self.size();
        for lane in &mut self.lanes {
            lane.retain(|item| keep(item));
        }
        before - self.size()
    }

    /// Drop every queued item
    pub fn clear(&mut self) {
        for lane in &mut self.lanes {
            lane.clear();
        }
    }

    fn lane_index(&self, level: T::Level) -> Result<usize, QueueError> {
        self.levels
            .iter()
            .position(|l| *l == level)
            .ok_or_else(|| QueueError::UnknownPriority(format!("{level:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::Priority;

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        name: &'static str,
        priority: Priority,
    }

    impl Prioritized for Item {
        type Level = Priority;

        fn priority(&self) -> Priority {
            self.priority
        }
    }

    fn item(name: &'static str, priority: Priority) -> Item {
        Item { name, priority }
    }

    fn queue() -> PriorityTaskQueue<Item> {
        PriorityTaskQueue::new(Priority::ALL.to_vec()).unwrap()
    }

    fn drain(q: &mut PriorityTaskQueue<Item>) -> Vec<&'static str> {
        std::iter::from_fn(|| q.dequeue()).map(|i| i.name).collect()
    }

    #[test]
    fn test_rejects_empty_levels() {
        let result = PriorityTaskQueue::<Item>::new(vec![]);
        assert_eq!(result.unwrap_err(), QueueError::EmptyLevels);
    }

    #[test]
    fn test_rejects_duplicate_levels() {
        let result = PriorityTaskQueue::<Item>::new(vec![Priority::High, Priority::High]);
        assert!(matches!(result, Err(QueueError::DuplicateLevel(_))));
    }

    #[test]
    fn test_empty_queue() {
        let mut q = queue();
        assert!(!q.has_task());
        assert!(q.is_empty());
        assert_eq!(q.size(), 0);
        assert!(q.dequeue().is_none());
    }

    #[test]
    fn test_priority_ordering() {
        let mut q = queue();
        q.enqueue(item("low-1", Priority::Low)).unwrap();
        q.enqueue(item("medium-1", Priority::Medium)).unwrap();
        q.enqueue(item("high-1", Priority::High)).unwrap();
        q.enqueue(item("low-2", Priority::Low)).unwrap();
        q.enqueue(item("high-2", Priority::High)).unwrap();
        q.enqueue(item("medium-2", Priority::Medium)).unwrap();

        assert_eq!(q.size(), 6);
        assert_eq!(
            drain(&mut q),
            vec!["high-1", "high-2", "medium-1", "medium-2", "low-1", "low-2"]
        );
        assert!(!q.has_task());
    }

    #[test]
    fn test_unshift_jumps_the_line() {
        let mut q = queue();
        q.enqueue(item("medium-1", Priority::Medium)).unwrap();
        q.enqueue(item("medium-2", Priority::Medium)).unwrap();
        q.unshift(item("retried", Priority::Medium)).unwrap();

        assert_eq!(drain(&mut q), vec!["retried", "medium-1", "medium-2"]);
    }

    #[test]
    fn test_unshift_does_not_beat_higher_priority() {
        let mut q = queue();
        q.enqueue(item("high", Priority::High)).unwrap();
        q.unshift(item("retried-low", Priority::Low)).unwrap();

        assert_eq!(drain(&mut q), vec!["high", "retried-low"]);
    }

    #[test]
    fn test_unknown_priority_is_rejected() {
        let mut q = PriorityTaskQueue::<Item>::new(vec![Priority::High, Priority::Low]).unwrap();
        let err = q.enqueue(item("medium", Priority::Medium)).unwrap_err();
        assert!(matches!(err, QueueError::UnknownPriority(_)));
        assert!(!q.accepts(&Priority::Medium));
        assert!(q.is_empty());
    }

    #[test]
    fn test_level_sizes_and_retain() {
        let mut q = queue();
        q.enqueue(item("a", Priority::High)).unwrap();
        q.enqueue(item("b", Priority::Low)).unwrap();
        q.enqueue(item("c", Priority::Low)).unwrap();

        assert_eq!(
            q.level_sizes(),
            vec![(Priority::High, 1), (Priority::Medium, 0), (Priority::Low, 2)]
        );

        let removed = q.retain(|i| i.name != "b");
        assert_eq!(removed, 1);
        assert_eq!(drain(&mut q), vec!["a", "c"]);
    }

    #[test]
    fn test_clear() {
        let mut q = queue();
        q.enqueue(item("a", Priority::High)).unwrap();
        q.enqueue(item("b", Priority::Medium)).unwrap();
        q.clear();
        assert_eq!(q.size(), 0);
    }

    #[test]
    fn test_custom_levels_order() {
        let mut q = PriorityTaskQueue::<Item>::new(vec![Priority::Low, Priority::High]).unwrap();
        q.enqueue(item("high", Priority::High)).unwrap();
        q.enqueue(item("low", Priority::Low)).unwrap();

        // Declared order wins, not the enum order
        assert_eq!(drain(&mut q), vec!["low", "high"]);
    }
}

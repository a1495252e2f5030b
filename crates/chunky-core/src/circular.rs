//! Fixed-capacity ring buffer.
//!
//! Newer items are pushed onto the tail; once the buffer is full the oldest
//! item (the head) is evicted. The head is always the oldest item and the
//! tail always the newest. Out-of-range access returns `None`.

use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircularBuffer<T> {
    data: VecDeque<T>,
    capacity: usize,
}

impl<T> CircularBuffer<T> {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            data: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push onto the tail, evicting and returning the head if full.
    ///
    /// With capacity 0 the item is handed straight back.
    pub fn push(&mut self, item: T) -> Option<T> {
        if self.capacity == 0 {
            return Some(item);
        }
        let evicted = if self.is_full() {
            self.data.pop_front()
        } else {
            None
        };
        self.data.push_back(item);
        evicted
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.data.len() == self.capacity
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Oldest item.
    #[must_use]
    pub fn head(&self) -> Option<&T> {
        self.data.front()
    }

    /// Newest item.
    #[must_use]
    pub fn tail(&self) -> Option<&T> {
        self.data.back()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.data.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.data.get_mut(index)
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Iterate from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.data.iter()
    }

    /// Consume the buffer, oldest first.
    #[must_use]
    pub fn into_vec(self) -> Vec<T> {
        self.data.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_buffer_is_empty() {
        let mut buffer: CircularBuffer<i32> = CircularBuffer::new(10);
        assert_eq!(buffer.len(), 0);
        assert_eq!(buffer.capacity(), 10);
        assert!(!buffer.is_full());
        assert!(buffer.is_empty());
        assert_eq!(buffer.head(), None);
        assert_eq!(buffer.tail(), None);
        assert_eq!(buffer.get(0), None);
        assert_eq!(buffer.get_mut(0), None);
    }

    #[test]
    fn push_evicts_oldest_when_full() {
        let mut buffer = CircularBuffer::new(3);
        assert_eq!(buffer.push(1), None);
        assert_eq!(buffer.push(2), None);
        assert_eq!(buffer.push(3), None);
        assert!(buffer.is_full());

        assert_eq!(buffer.push(4), Some(1));
        assert_eq!(buffer.head(), Some(&2));
        assert_eq!(buffer.tail(), Some(&4));
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.into_vec(), vec![2, 3, 4]);
    }

    #[test]
    fn index_access_and_mutation() {
        let mut buffer = CircularBuffer::new(2);
        buffer.push("a");
        buffer.push("b");
        if let Some(slot) = buffer.get_mut(1) {
            *slot = "c";
        }
        assert_eq!(buffer.iter().copied().collect::<Vec<_>>(), vec!["a", "c"]);
        assert_eq!(buffer.get(2), None);
    }

    #[test]
    fn zero_capacity_stores_nothing() {
        let mut buffer = CircularBuffer::new(0);
        assert_eq!(buffer.push(1), Some(1));
        assert!(buffer.is_empty());
        assert!(buffer.is_full());
    }
}

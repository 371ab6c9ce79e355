use std::collections::vec_deque::{self, VecDeque};

/// Fixed-capacity FIFO used as the storage unit of every scheduler.
///
/// A bucket never grows past the capacity it was built with; `push` refuses the item instead.
#[derive(Debug, Clone)]
pub struct Bucket<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> Bucket<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an item at the tail. Returns `false` and drops the item when the bucket is full.
    pub fn push(&mut self, item: T) -> bool {
        if self.is_full() {
            return false;
        }
        self.items.push_back(item);
        true
    }

    pub fn pop(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    pub fn peek(&self) -> Option<&T> {
        self.items.front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Resident items from head to tail.
    pub fn iter(&self) -> vec_deque::Iter<'_, T> {
        self.items.iter()
    }
}

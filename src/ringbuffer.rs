//! Ringbuffer module backing the rolling history window.
//!
//! This module provides a fixed-capacity circular buffer with predictable
//! memory usage. Once full, every push overwrites the oldest entry.

/// A circular buffer for storing entries with fixed capacity.
#[derive(Debug, Clone)]
pub struct Ringbuffer<T> {
    entries: Vec<T>,
    capacity: usize,
    write_index: usize,
}

impl<T: Clone> Ringbuffer<T> {
    /// Creates a new ringbuffer with the specified capacity.
    ///
    /// A capacity of zero is raised to one so the newest entry is always kept.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
            write_index: 0,
        }
    }

    /// Pushes a new entry into the ringbuffer.
    ///
    /// If the buffer is full, the oldest entry is overwritten and returned.
    pub fn push(&mut self, entry: T) -> Option<T> {
        if self.entries.len() < self.capacity {
            self.entries.push(entry);
            self.write_index = self.entries.len() % self.capacity;
            return None;
        }

        let evicted = std::mem::replace(&mut self.entries[self.write_index], entry);
        self.write_index = (self.write_index + 1) % self.capacity;
        Some(evicted)
    }

    /// Iterates entries in chronological order (oldest to newest).
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        // Before the first wrap write_index == len, so `older` is empty.
        let (newer, older) = self.entries.split_at(self.write_index);
        older.iter().chain(newer.iter())
    }

    /// Returns all entries in chronological order (oldest to newest).
    pub fn get_history(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }

    /// Returns the current number of entries in the buffer.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns the maximum capacity of the buffer.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns true if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns true once every slot holds an entry.
    pub fn is_full(&self) -> bool {
        self.entries.len() == self.capacity
    }
}

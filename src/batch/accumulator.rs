//! Batch accumulator.
//!
//! Owned by exactly one pipeline worker, so it needs no interior locking.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchAddResult {
    Added { count: usize },
    ShouldFlush { count: usize },
}

impl BatchAddResult {
    pub fn should_flush(&self) -> bool {
        matches!(self, BatchAddResult::ShouldFlush { .. })
    }

    pub fn count(&self) -> usize {
        match self {
            BatchAddResult::Added { count } | BatchAddResult::ShouldFlush { count } => *count,
        }
    }
}

/// Ordered in-memory buffer of pending items.
#[derive(Debug)]
pub struct BatchAccumulator<T> {
    items: Vec<T>,
    capacity_hint: usize,
    flush_size: usize,
    batch_start: Option<Instant>,
}

impl<T> BatchAccumulator<T> {
    pub fn new(capacity_hint: usize, flush_size: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity_hint),
            capacity_hint,
            flush_size,
            batch_start: None,
        }
    }

    pub fn push(&mut self, item: T) -> BatchAddResult {
        if self.items.is_empty() {
            self.batch_start = Some(Instant::now());
        }
        self.items.push(item);
        let count = self.items.len();
        if count >= self.flush_size {
            BatchAddResult::ShouldFlush { count }
        } else {
            BatchAddResult::Added { count }
        }
    }

    /// Takes the buffered batch in arrival order.
    pub fn drain(&mut self) -> Vec<T> {
        self.batch_start = None;
        std::mem::replace(&mut self.items, Vec::with_capacity(self.capacity_hint))
    }

    /// How long the oldest buffered item has been waiting.
    pub fn age(&self) -> Option<Duration> {
        self.batch_start.map(|s| s.elapsed())
    }

    pub fn flush_size(&self) -> usize {
        self.flush_size
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

//! Destinations for items a flush could not write.

use crate::Error;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use tracing::{error, warn};

/// Receives the contiguous tail of a batch that was not written.
///
/// `error` is `None` only when nothing was attempted (zero chunk size).
#[async_trait]
pub trait UnflushedHandler<T>: Send + Sync {
    async fn on_unflushed(&self, items: Vec<T>, error: Option<&Error>);
}

/// Logs the lost items and drops them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogUnflushed;

#[async_trait]
impl<T: Send + 'static> UnflushedHandler<T> for LogUnflushed {
    async fn on_unflushed(&self, items: Vec<T>, error: Option<&Error>) {
        match error {
            Some(e) => error!(count = items.len(), error = %e, "failed to save items"),
            None => warn!(count = items.len(), "items were not saved"),
        }
    }
}

/// Bounded in-memory store for unwritten items.
///
/// The owner drains it and resubmits. Items arriving while the queue is full
/// are dropped and counted.
#[derive(Debug)]
pub struct DeadLetterQueue<T> {
    limit: usize,
    inner: Mutex<DeadLetters<T>>,
}

#[derive(Debug)]
struct DeadLetters<T> {
    items: VecDeque<T>,
    dropped: usize,
    last_error: Option<String>,
}

impl<T> DeadLetterQueue<T> {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            inner: Mutex::new(DeadLetters {
                items: VecDeque::new(),
                dropped: 0,
                last_error: None,
            }),
        }
    }

    /// Removes and returns every held item, oldest first.
    pub fn drain(&self) -> Vec<T> {
        self.inner
            .lock()
            .map(|mut q| q.items.drain(..).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|q| q.items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Items discarded because the queue was full.
    pub fn dropped(&self) -> usize {
        self.inner.lock().map(|q| q.dropped).unwrap_or(0)
    }

    pub fn last_error(&self) -> Option<String> {
        self.inner.lock().ok().and_then(|q| q.last_error.clone())
    }
}

#[async_trait]
impl<T: Send + 'static> UnflushedHandler<T> for DeadLetterQueue<T> {
    async fn on_unflushed(&self, items: Vec<T>, error: Option<&Error>) {
        let Ok(mut q) = self.inner.lock() else {
            error!(count = items.len(), "dead letter queue poisoned, items lost");
            return;
        };
        let room = self.limit.saturating_sub(q.items.len());
        let overflow = items.len().saturating_sub(room);
        q.items.extend(items.into_iter().take(room));
        q.dropped += overflow;
        if let Some(e) = error {
            q.last_error = Some(e.to_string());
        }
        if overflow > 0 {
            warn!(dropped = overflow, limit = self.limit, "dead letter queue full");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dead_letter_queue_keeps_order() {
        let dlq = DeadLetterQueue::new(10);
        dlq.on_unflushed(vec![1, 2], Some(&Error::sink("down"))).await;
        dlq.on_unflushed(vec![3], None).await;

        assert_eq!(dlq.len(), 3);
        assert_eq!(dlq.last_error().as_deref(), Some("Sink error: down"));
        assert_eq!(dlq.drain(), vec![1, 2, 3]);
        assert!(dlq.is_empty());
    }

    #[tokio::test]
    async fn test_dead_letter_queue_is_bounded() {
        let dlq = DeadLetterQueue::new(3);
        dlq.on_unflushed(vec![1, 2], None).await;
        dlq.on_unflushed(vec![3, 4, 5], None).await;

        assert_eq!(dlq.drain(), vec![1, 2, 3]);
        assert_eq!(dlq.dropped(), 2);
    }

    #[tokio::test]
    async fn test_log_handler_accepts_anything() {
        LogUnflushed.on_unflushed(vec!["a"], Some(&Error::sink("x"))).await;
        UnflushedHandler::<u8>::on_unflushed(&LogUnflushed, Vec::new(), None).await;
    }
}

//! Chunked writer.
//!
//! Writes an ordered batch to a sink with a per-call size limit. Chunks go out
//! strictly in order and the writer stops at the first rejected chunk, so the
//! caller always gets back an exact, contiguous resubmission set.

use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Splits `items` into consecutive chunks of at most `chunk_size` items.
///
/// A zero chunk size yields no chunks at all.
pub fn split_to_chunks<T>(items: &[T], chunk_size: usize) -> Vec<&[T]> {
    if chunk_size == 0 {
        return Vec::new();
    }
    items.chunks(chunk_size).collect()
}

/// Downstream that accepts bounded writes.
#[async_trait]
pub trait ChunkSink<T>: Send + Sync {
    async fn write_chunk(&self, chunk: &[T]) -> Result<()>;
}

#[async_trait]
impl<T, S> ChunkSink<T> for Arc<S>
where
    T: Sync,
    S: ChunkSink<T> + ?Sized,
{
    async fn write_chunk(&self, chunk: &[T]) -> Result<()> {
        (**self).write_chunk(chunk).await
    }
}

/// Result of a [`ChunkedWriter::write`] call.
#[derive(Debug)]
pub struct WriteOutcome<T> {
    pub written_chunks: usize,
    pub written_items: usize,
    /// Items from the start of the failing chunk to the end of the batch.
    pub unwritten: Vec<T>,
    pub error: Option<Error>,
    pub execution_time: Duration,
}

impl<T> WriteOutcome<T> {
    fn new() -> Self {
        Self {
            written_chunks: 0,
            written_items: 0,
            unwritten: Vec::new(),
            error: None,
            execution_time: Duration::ZERO,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.unwritten.is_empty() && self.error.is_none()
    }

    pub fn into_parts(self) -> (Vec<T>, Option<Error>) {
        (self.unwritten, self.error)
    }
}

pub struct ChunkedWriter<T, S> {
    sink: S,
    chunk_size: usize,
    _item: std::marker::PhantomData<fn(T)>,
}

impl<T, S> ChunkedWriter<T, S>
where
    T: Send + Sync,
    S: ChunkSink<T>,
{
    pub fn new(sink: S, chunk_size: usize) -> Self {
        Self {
            sink,
            chunk_size,
            _item: std::marker::PhantomData,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub async fn write(&self, mut batch: Vec<T>) -> WriteOutcome<T> {
        let start = Instant::now();
        let mut outcome = WriteOutcome::new();

        if batch.is_empty() {
            return outcome;
        }
        if self.chunk_size == 0 {
            warn!(items = batch.len(), "chunk size is zero, nothing written");
            outcome.unwritten = batch;
            return outcome;
        }

        let mut failed_at = None;
        for (index, chunk) in split_to_chunks(&batch, self.chunk_size).into_iter().enumerate() {
            match self.sink.write_chunk(chunk).await {
                Ok(()) => {
                    outcome.written_chunks += 1;
                    outcome.written_items += chunk.len();
                }
                Err(e) => {
                    warn!(chunk = index, size = chunk.len(), error = %e, "chunk write failed");
                    failed_at = Some((index, e));
                    break;
                }
            }
        }

        if let Some((index, e)) = failed_at {
            outcome.unwritten = batch.split_off(index * self.chunk_size);
            outcome.error = Some(e);
        }
        outcome.execution_time = start.elapsed();
        debug!(
            written = outcome.written_items,
            unwritten = outcome.unwritten.len(),
            elapsed_ms = outcome.execution_time.as_millis() as u64,
            "chunked write finished"
        );
        outcome
    }
}

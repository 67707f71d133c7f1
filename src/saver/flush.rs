//! Pipeline sink that writes batches in chunks.

use super::handler::UnflushedHandler;
use crate::batch::{ChunkSink, ChunkedWriter, FlushSink};
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// [`FlushSink`] adapter over a [`ChunkedWriter`].
///
/// Whatever the writer leaves unwritten goes to the handler, and the flush
/// reports [`Error::PartialWrite`].
pub struct ChunkedFlush<T, S> {
    writer: ChunkedWriter<T, S>,
    handler: Arc<dyn UnflushedHandler<T>>,
}

impl<T, S> ChunkedFlush<T, S>
where
    T: Send + Sync + 'static,
    S: ChunkSink<T>,
{
    pub fn new(sink: S, chunk_size: usize, handler: Arc<dyn UnflushedHandler<T>>) -> Self {
        Self {
            writer: ChunkedWriter::new(sink, chunk_size),
            handler,
        }
    }

    pub fn writer(&self) -> &ChunkedWriter<T, S> {
        &self.writer
    }
}

#[async_trait]
impl<T, S> FlushSink<T> for ChunkedFlush<T, S>
where
    T: Send + Sync + 'static,
    S: ChunkSink<T> + 'static,
{
    async fn flush(&self, batch: Vec<T>) -> Result<()> {
        let outcome = self.writer.write(batch).await;
        if outcome.is_complete() {
            return Ok(());
        }

        let written_items = outcome.written_items;
        let (unwritten, error) = outcome.into_parts();
        let left = unwritten.len();
        self.handler.on_unflushed(unwritten, error.as_ref()).await;

        let source = error.unwrap_or_else(|| {
            Error::sink_with_context(
                "nothing was written",
                ErrorContext::new()
                    .with_details(format!("chunk size {}", self.writer.chunk_size()))
                    .with_source("chunked_flush"),
            )
        });
        Err(Error::PartialWrite {
            written_items,
            unwritten: left,
            source: Box::new(source),
        })
    }

    fn name(&self) -> &'static str {
        "chunked"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::saver::DeadLetterQueue;
    use std::sync::Mutex;

    struct FlakySink {
        fail_from: usize,
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl ChunkSink<u32> for FlakySink {
        async fn write_chunk(&self, _chunk: &[u32]) -> Result<()> {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            if *calls > self.fail_from {
                return Err(Error::sink("disk full"));
            }
            Ok(())
        }
    }

    fn chunked(
        fail_from: usize,
        chunk_size: usize,
        dlq: &Arc<DeadLetterQueue<u32>>,
    ) -> ChunkedFlush<u32, FlakySink> {
        let sink = FlakySink {
            fail_from,
            calls: Mutex::new(0),
        };
        let handler: Arc<dyn UnflushedHandler<u32>> = dlq.clone();
        ChunkedFlush::new(sink, chunk_size, handler)
    }

    #[tokio::test]
    async fn test_complete_write_is_ok() {
        let dlq = Arc::new(DeadLetterQueue::new(16));
        let flush = chunked(usize::MAX, 2, &dlq);
        flush.flush(vec![1, 2, 3]).await.unwrap();
        assert!(dlq.is_empty());
    }

    #[tokio::test]
    async fn test_remainder_goes_to_handler() {
        let dlq = Arc::new(DeadLetterQueue::new(16));
        let flush = chunked(1, 2, &dlq);

        let err = flush.flush(vec![1, 2, 3, 4, 5]).await.unwrap_err();
        match err {
            Error::PartialWrite {
                written_items,
                unwritten,
                source,
            } => {
                assert_eq!(written_items, 2);
                assert_eq!(unwritten, 3);
                assert_eq!(source.to_string(), "Sink error: disk full");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(dlq.drain(), vec![3, 4, 5]);
    }

    #[tokio::test]
    async fn test_zero_chunk_size_reports_partial_write() {
        let dlq = Arc::new(DeadLetterQueue::new(16));
        let flush = chunked(usize::MAX, 0, &dlq);

        let err = flush.flush(vec![7, 8]).await.unwrap_err();
        assert!(matches!(err, Error::PartialWrite { written_items: 0, unwritten: 2, .. }));
        assert_eq!(dlq.drain(), vec![7, 8]);
        assert_eq!(dlq.last_error(), None);
    }
}

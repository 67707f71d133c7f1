//! 批处理流水线模块：按容量或定时批量刷写，并保证优雅关闭时不丢失已接收的条目。
//!
//! # Batching Pipeline Module
//!
//! This module holds the machinery shared by the event producer and the
//! buffered saver: accept items one at a time from concurrent callers, group
//! them into ordered batches and hand each batch to a sink.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`BatchAccumulator`] | Ordered in-memory buffer with a flush threshold |
//! | [`ChunkedWriter`] | Writes a batch in bounded chunks, stops at the first failure |
//! | [`TimedPipeline`] | Bounded ingress, single worker task, size/timer/shutdown flushes |
//! | [`LifecycleGuard`] | Uninitialized → Running → Closed state machine |
//!
//! ## Example
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use request_pipeline::batch::{FlushSink, PipelineConfig, TimedPipeline};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! struct PrintSink;
//!
//! #[async_trait]
//! impl FlushSink<String> for PrintSink {
//!     async fn flush(&self, batch: Vec<String>) -> request_pipeline::Result<()> {
//!         println!("{batch:?}");
//!         Ok(())
//!     }
//! }
//!
//! # async fn run() -> request_pipeline::Result<()> {
//! let config = PipelineConfig::new()
//!     .with_capacity(128)
//!     .with_flush_size(32)
//!     .with_flush_interval(Duration::from_millis(250));
//! let pipeline: TimedPipeline<String> = TimedPipeline::start("printer", config, Arc::new(PrintSink))?;
//!
//! pipeline.submit("hello".to_string()).await?;
//! pipeline.close().await?; // flushes "hello" before returning
//! # Ok(())
//! # }
//! ```
//!
//! ## Guarantees
//!
//! - Items are flushed in submission order within one pipeline instance.
//! - `submit` waits when the ingress channel is full instead of dropping items.
//! - `close` returns only after the final flush has completed.
//! - A failing sink is logged and never stops the worker.

mod accumulator;
mod chunked;
mod lifecycle;
mod pipeline;

pub use accumulator::{BatchAccumulator, BatchAddResult};
pub use chunked::{split_to_chunks, ChunkSink, ChunkedWriter, WriteOutcome};
pub use lifecycle::{LifecycleError, LifecycleGuard, PipelineState};
pub use pipeline::{FlushSink, FlushTrigger, PipelineConfig, TimedPipeline};

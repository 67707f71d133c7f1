//! 缓冲保存模块：异步收集请求，按容量或定时分块写入存储。
//!
//! # Buffered Saver
//!
//! [`Saver`] accepts [`Request`]s one at a time, batches them in a
//! [`TimedPipeline`] and writes every batch through a [`ChunkedWriter`] so no
//! single storage call exceeds `chunk_size` rows.
//!
//! Rows left over after a failed chunk are handed to an
//! [`UnflushedHandler`]. The default [`LogUnflushed`] logs and drops them;
//! [`DeadLetterQueue`] keeps them for the owner to resubmit.
//!
//! [`ChunkedWriter`]: crate::batch::ChunkedWriter

mod flush;
mod handler;

pub use flush::ChunkedFlush;
pub use handler::{DeadLetterQueue, LogUnflushed, UnflushedHandler};

use crate::batch::{FlushSink, PipelineConfig, PipelineState, TimedPipeline};
use crate::storage::{RepoChunkSink, Request, RequestRepo};
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaverConfig {
    pub capacity: usize,
    /// Max rows per storage call.
    pub chunk_size: usize,
    pub flush_interval_ms: u64,
    /// Defaults to `capacity`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flush_size: Option<usize>,
}

impl Default for SaverConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            chunk_size: 100,
            flush_interval_ms: 1000,
            flush_size: None,
        }
    }
}

impl SaverConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_flush_size(mut self, size: usize) -> Self {
        self.flush_size = Some(size);
        self
    }

    pub fn effective_flush_size(&self) -> usize {
        self.flush_size.unwrap_or(self.capacity)
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig::new()
            .with_capacity(self.capacity)
            .with_flush_size(self.effective_flush_size())
            .with_flush_interval(Duration::from_millis(self.flush_interval_ms))
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::configuration_with_context(
                "chunk size must be greater than 0",
                ErrorContext::new()
                    .with_field_path("saver.chunk_size")
                    .with_source("saver_config"),
            ));
        }
        self.pipeline_config().validate()
    }
}

/// Asynchronous, batching writer of requests into a [`RequestRepo`].
///
/// Must be initialized before [`Saver::save`] and closed to make sure every
/// accepted request reached storage (or the unflushed handler).
pub struct Saver {
    pipeline: TimedPipeline<Request>,
}

impl Saver {
    /// Creates an uninitialized saver that logs unwritten rows.
    pub fn new(config: SaverConfig, repo: Arc<dyn RequestRepo>) -> Result<Self> {
        Self::with_unflushed_handler(config, repo, Arc::new(LogUnflushed))
    }

    /// Creates an uninitialized saver with a custom handler for unwritten rows.
    pub fn with_unflushed_handler(
        config: SaverConfig,
        repo: Arc<dyn RequestRepo>,
        handler: Arc<dyn UnflushedHandler<Request>>,
    ) -> Result<Self> {
        config.validate()?;
        let sink: Arc<dyn FlushSink<Request>> = Arc::new(ChunkedFlush::new(
            RepoChunkSink::new(repo),
            config.chunk_size,
            handler,
        ));
        let pipeline = TimedPipeline::new("saver", config.pipeline_config(), sink)?;
        Ok(Self { pipeline })
    }

    /// Creates a saver that is ready to accept requests.
    pub fn start(config: SaverConfig, repo: Arc<dyn RequestRepo>) -> Result<Self> {
        let saver = Self::new(config, repo)?;
        saver.init()?;
        Ok(saver)
    }

    pub fn init(&self) -> Result<()> {
        self.pipeline.init()
    }

    /// Queues a request for storage. Waits while the buffer is full.
    pub async fn save(&self, request: Request) -> Result<()> {
        self.pipeline.submit(request).await
    }

    /// Writes every pending request and stops the saver.
    pub async fn close(&self) -> Result<()> {
        self.pipeline.close().await
    }

    pub fn state(&self) -> PipelineState {
        self.pipeline.state()
    }
}

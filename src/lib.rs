//! # request-pipeline
//!
//! 请求服务核心：带有事件通知与缓冲存储写入的异步批处理流水线。
//!
//! Request service core with asynchronous batching pipelines for event
//! notification and buffered storage writes.
//!
//! ## Overview
//!
//! Two components share one batching engine:
//!
//! - the **event producer** reports every handled call to a message broker,
//! - the **saver** accepts records one at a time and writes them to storage
//!   in bounded chunks.
//!
//! Both accept items from concurrent callers, buffer them in arrival order and
//! flush when the batch is full, when a timer fires, or when they are closed.
//! Closing waits for the final flush, so nothing accepted is silently lost.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use request_pipeline::events::{EventProducer, InMemoryBroker, ProducerConfig};
//! use request_pipeline::saver::{Saver, SaverConfig};
//! use request_pipeline::service::{CallContext, RequestService};
//! use request_pipeline::storage::{InMemoryRepo, Request};
//! use request_pipeline::telemetry::NoopMetrics;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> request_pipeline::Result<()> {
//!     let repo = Arc::new(InMemoryRepo::new());
//!     let producer = Arc::new(EventProducer::start(
//!         ProducerConfig::default(),
//!         Arc::new(InMemoryBroker::new()),
//!     )?);
//!     let service = RequestService::new(repo.clone(), producer.clone(), Arc::new(NoopMetrics), 1000)?;
//!
//!     let id = service.create(&CallContext::new(), 42, 1, "hello").await?;
//!
//!     let saver = Saver::start(SaverConfig::default(), repo)?;
//!     saver.save(Request::new(0, 42, 1, "buffered")).await?;
//!
//!     saver.close().await?;
//!     producer.close().await?;
//!     println!("created {id}");
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`batch`] | Accumulator, chunked writer, timed pipeline, lifecycle guard |
//! | [`events`] | Events, wire codec, broker boundary, batching producer |
//! | [`saver`] | Buffered chunked writes into storage |
//! | [`storage`] | Request entity and repository boundary |
//! | [`service`] | CRUD handlers that drive both pipelines |
//! | [`telemetry`] | Injected metrics and call trace context |
//! | [`config`] | YAML configuration with environment overrides |

pub mod batch;
pub mod config;
pub mod events;
pub mod saver;
pub mod service;
pub mod storage;
pub mod telemetry;

// Re-export main types for convenience
pub use batch::{FlushSink, PipelineConfig, PipelineState, TimedPipeline};
pub use config::ServiceConfig;
pub use events::{Event, EventKind, EventProducer};
pub use saver::Saver;
pub use service::RequestService;
pub use storage::Request;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};

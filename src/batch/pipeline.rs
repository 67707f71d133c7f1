//! Timed batching pipeline.
//!
//! Items are accepted from any number of concurrent callers through a bounded
//! channel and moved into a [`BatchAccumulator`] by a single worker task. The
//! worker flushes when the batch reaches `flush_size`, when the flush interval
//! elapses, and one last time when the pipeline is closed.

use super::accumulator::BatchAccumulator;
use super::lifecycle::{LifecycleError, LifecycleGuard, PipelineState};
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, trace};

/// Downstream consumer of a whole batch.
#[async_trait]
pub trait FlushSink<T>: Send + Sync {
    async fn flush(&self, batch: Vec<T>) -> Result<()>;

    fn name(&self) -> &'static str {
        "sink"
    }
}

#[async_trait]
impl<T, S> FlushSink<T> for Arc<S>
where
    T: Send + 'static,
    S: FlushSink<T> + ?Sized,
{
    async fn flush(&self, batch: Vec<T>) -> Result<()> {
        (**self).flush(batch).await
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Ingress channel bound, also the initial batch buffer capacity.
    pub capacity: usize,
    /// Batch length that triggers an immediate flush.
    pub flush_size: usize,
    pub flush_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            flush_size: 1000,
            flush_interval: Duration::from_secs(1),
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_flush_size(mut self, size: usize) -> Self {
        self.flush_size = size;
        self
    }

    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |field: &str, msg: &str| {
            Error::configuration_with_context(
                msg,
                ErrorContext::new()
                    .with_field_path(field)
                    .with_source("pipeline_config"),
            )
        };
        if self.capacity == 0 {
            return Err(invalid("capacity", "ingress capacity must be greater than 0"));
        }
        if self.flush_size == 0 {
            return Err(invalid("flush_size", "flush size must be greater than 0"));
        }
        if self.flush_interval.is_zero() {
            return Err(invalid("flush_interval", "flush interval must be non-zero"));
        }
        Ok(())
    }
}

/// What caused a flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    Size,
    Timer,
    Shutdown,
}

pub struct TimedPipeline<T> {
    name: &'static str,
    config: PipelineConfig,
    sink: Arc<dyn FlushSink<T>>,
    guard: LifecycleGuard,
    ingress: Mutex<Option<mpsc::Sender<T>>>,
    worker: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl<T: Send + 'static> TimedPipeline<T> {
    /// Creates an uninitialized pipeline. Call [`TimedPipeline::init`] before submitting.
    pub fn new(
        name: &'static str,
        config: PipelineConfig,
        sink: Arc<dyn FlushSink<T>>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            name,
            config,
            sink,
            guard: LifecycleGuard::new(name),
            ingress: Mutex::new(None),
            worker: tokio::sync::Mutex::new(None),
        })
    }

    /// Creates and initializes a pipeline in one step.
    pub fn start(
        name: &'static str,
        config: PipelineConfig,
        sink: Arc<dyn FlushSink<T>>,
    ) -> Result<Self> {
        let pipeline = Self::new(name, config, sink)?;
        pipeline.init()?;
        Ok(pipeline)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn state(&self) -> PipelineState {
        self.guard.state()
    }

    /// Spawns the worker task. A second call on a running pipeline does nothing.
    ///
    /// The ingress lock is held from the state transition until the sender and
    /// the worker handle are stored, so a concurrent `submit` or `close` waits
    /// for a fully started pipeline.
    pub fn init(&self) -> Result<()> {
        self.guard.ensure_not_closed()?;
        if self.guard.state() == PipelineState::Running {
            return Ok(());
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            Error::runtime_with_context(
                format!("{} needs a tokio runtime: {}", self.name, e),
                ErrorContext::new().with_source("timed_pipeline"),
            )
        })?;

        let mut ingress = self.lock_ingress()?;
        if !self.guard.begin_init()? {
            return Ok(());
        }
        let (tx, rx) = mpsc::channel(self.config.capacity);
        *ingress = Some(tx);

        let worker = Worker {
            name: self.name,
            config: self.config.clone(),
            sink: Arc::clone(&self.sink),
        };
        let handle = runtime.spawn(worker.run(rx));
        match self.worker.try_lock() {
            Ok(mut slot) => *slot = Some(handle),
            Err(_) => {
                return Err(Error::runtime_with_context(
                    "worker slot is busy",
                    ErrorContext::new().with_source("timed_pipeline"),
                ))
            }
        }
        drop(ingress);
        debug!(pipeline = self.name, capacity = self.config.capacity, "pipeline started");
        Ok(())
    }

    /// Queues an item for the next flush.
    ///
    /// Waits while the ingress channel is full.
    pub async fn submit(&self, item: T) -> Result<()> {
        self.guard.ensure_accepting()?;
        let sender = self
            .lock_ingress()?
            .clone()
            .ok_or(LifecycleError::Closed(self.name))?;
        sender.send(item).await.map_err(|_| {
            Error::runtime_with_context(
                format!("{} worker is no longer running", self.name),
                ErrorContext::new().with_source("timed_pipeline"),
            )
        })
    }

    /// Stops accepting items and waits for the final flush to complete.
    pub async fn close(&self) -> Result<()> {
        if !self.guard.begin_close()? {
            return Ok(());
        }
        // dropping the last sender lets the worker drain and exit
        drop(self.lock_ingress()?.take());

        let handle = self.worker.lock().await.take();
        if let Some(handle) = handle {
            handle.await.map_err(|e| {
                Error::runtime_with_context(
                    format!("{} worker failed: {}", self.name, e),
                    ErrorContext::new().with_source("timed_pipeline"),
                )
            })?;
        }
        debug!(pipeline = self.name, "pipeline closed");
        Ok(())
    }

    fn lock_ingress(&self) -> Result<std::sync::MutexGuard<'_, Option<mpsc::Sender<T>>>> {
        self.ingress.lock().map_err(|_| {
            Error::runtime_with_context(
                "ingress lock poisoned",
                ErrorContext::new().with_source("timed_pipeline"),
            )
        })
    }
}

struct Worker<T> {
    name: &'static str,
    config: PipelineConfig,
    sink: Arc<dyn FlushSink<T>>,
}

impl<T: Send + 'static> Worker<T> {
    async fn run(self, mut rx: mpsc::Receiver<T>) {
        let period = self.config.flush_interval;
        let mut acc = BatchAccumulator::new(self.config.capacity, self.config.flush_size);
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                received = rx.recv() => match received {
                    Some(item) => {
                        if acc.push(item).should_flush() {
                            self.flush(&mut acc, FlushTrigger::Size).await;
                        }
                    }
                    None => {
                        self.flush(&mut acc, FlushTrigger::Shutdown).await;
                        break;
                    }
                },
                _ = ticker.tick() => {
                    self.flush(&mut acc, FlushTrigger::Timer).await;
                    ticker.reset();
                }
            }
        }
        trace!(pipeline = self.name, "worker stopped");
    }

    async fn flush(&self, acc: &mut BatchAccumulator<T>, trigger: FlushTrigger) {
        if acc.is_empty() {
            trace!(pipeline = self.name, ?trigger, "nothing to flush");
            return;
        }
        let waited_ms = acc.age().map(|d| d.as_millis() as u64).unwrap_or(0);
        let batch = acc.drain();

        let size = batch.len();
        match self.sink.flush(batch).await {
            Ok(()) => debug!(
                pipeline = self.name,
                sink = self.sink.name(),
                ?trigger,
                size,
                waited_ms,
                "flushed batch"
            ),
            Err(e) => error!(
                pipeline = self.name,
                sink = self.sink.name(),
                ?trigger,
                size,
                error = %e,
                "failed to flush batch"
            ),
        }
    }
}

//! Batching event producer.

use super::broker::{Broker, BrokerMessage};
use super::codec::EncodedEvent;
use super::{Event, EventKind};
use crate::batch::{FlushSink, PipelineConfig, PipelineState, TimedPipeline};
use crate::telemetry::CallContext;
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProducerConfig {
    pub topic: String,
    pub capacity: usize,
    pub flush_size: usize,
    pub flush_interval_ms: u64,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            topic: "ocp_request_events".to_string(),
            capacity: 10_000,
            flush_size: 10_000,
            flush_interval_ms: 1_000,
        }
    }
}

impl ProducerConfig {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            ..Self::default()
        }
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
        self.flush_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig::new()
            .with_capacity(self.capacity)
            .with_flush_size(self.flush_size)
            .with_flush_interval(Duration::from_millis(self.flush_interval_ms))
    }

    pub fn validate(&self) -> Result<()> {
        if self.topic.trim().is_empty() {
            return Err(Error::configuration_with_context(
                "topic must not be empty",
                ErrorContext::new()
                    .with_field_path("producer.topic")
                    .with_source("producer_config"),
            ));
        }
        self.pipeline_config().validate()
    }
}

/// Publishes a whole batch to one topic.
pub struct BrokerSink {
    topic: String,
    broker: Arc<dyn Broker>,
}

impl BrokerSink {
    pub fn new(topic: impl Into<String>, broker: Arc<dyn Broker>) -> Self {
        Self {
            topic: topic.into(),
            broker,
        }
    }
}

#[async_trait]
impl FlushSink<EncodedEvent> for BrokerSink {
    async fn flush(&self, batch: Vec<EncodedEvent>) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let messages: Vec<BrokerMessage> = batch
            .into_iter()
            .map(|e| BrokerMessage::new(self.topic.as_str(), e.into_payload()))
            .collect();
        debug!(topic = %self.topic, broker = self.broker.name(), count = messages.len(), "sending events");
        self.broker.send_messages(messages).await
    }

    fn name(&self) -> &'static str {
        "broker"
    }
}

/// Forwards events to the broker in batches.
///
/// Delivery is best-effort: a batch the broker rejects is logged by the
/// pipeline and dropped.
pub struct EventProducer {
    topic: String,
    pipeline: TimedPipeline<EncodedEvent>,
}

impl EventProducer {
    pub fn new(config: ProducerConfig, broker: Arc<dyn Broker>) -> Result<Self> {
        config.validate()?;
        let sink: Arc<dyn FlushSink<EncodedEvent>> =
            Arc::new(BrokerSink::new(config.topic.clone(), broker));
        let pipeline = TimedPipeline::new("producer", config.pipeline_config(), sink)?;
        Ok(Self {
            topic: config.topic,
            pipeline,
        })
    }

    /// Creates a producer that is ready to send.
    pub fn start(config: ProducerConfig, broker: Arc<dyn Broker>) -> Result<Self> {
        let producer = Self::new(config, broker)?;
        producer.init()?;
        Ok(producer)
    }

    pub fn init(&self) -> Result<()> {
        self.pipeline.init()
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn state(&self) -> PipelineState {
        self.pipeline.state()
    }

    pub async fn send(&self, event: Event) -> Result<()> {
        self.pipeline.submit(EncodedEvent::new(event)).await
    }

    /// Builds an event for an API call and sends it.
    pub async fn notify(
        &self,
        ctx: &CallContext,
        request_id: u64,
        kind: EventKind,
        error: Option<&Error>,
    ) -> Result<()> {
        let mut event = Event::new(request_id, kind).with_trace_context(ctx.trace.clone());
        if let Some(e) = error {
            event = event.with_error(e);
        }
        self.send(event).await
    }

    /// Flushes every queued event and stops the producer.
    pub async fn close(&self) -> Result<()> {
        self.pipeline.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::broker::InMemoryBroker;
    use crate::events::codec;

    fn quiet_config() -> ProducerConfig {
        ProducerConfig::new("events")
            .with_capacity(8)
            .with_flush_size(3)
            .with_flush_interval(Duration::from_secs(3600))
    }

    #[test]
    fn test_config_defaults() {
        let config = ProducerConfig::default();
        assert_eq!(config.topic, "ocp_request_events");
        assert_eq!(config.flush_size, 10_000);
        assert_eq!(
            config.pipeline_config().flush_interval,
            Duration::from_secs(1)
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_rejects_empty_topic() {
        let err = ProducerConfig::new("  ").validate().unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[tokio::test]
    async fn test_events_reach_broker_in_order() {
        let broker = Arc::new(InMemoryBroker::new());
        let producer = EventProducer::start(quiet_config(), broker.clone()).unwrap();

        for id in 1..=4 {
            producer.send(Event::new(id, EventKind::Create)).await.unwrap();
        }
        producer.close().await.unwrap();

        let batches = broker.batches();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 3);
        assert_eq!(batches[1].len(), 1);

        let ids: Vec<u64> = broker
            .messages()
            .iter()
            .map(|m| codec::decode(&m.payload).unwrap().request_id)
            .collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        assert!(broker.messages().iter().all(|m| m.topic == "events"));
    }

    #[tokio::test]
    async fn test_notify_carries_trace_and_error() {
        let broker = Arc::new(InMemoryBroker::new());
        let producer = EventProducer::start(quiet_config(), broker.clone()).unwrap();
        let ctx = CallContext::new().with_trace_header("uber-trace-id", "t1");
        let failure = Error::sink("db down");

        producer
            .notify(&ctx, 5, EventKind::Delete, Some(&failure))
            .await
            .unwrap();
        producer.close().await.unwrap();

        let event = codec::decode(&broker.messages()[0].payload).unwrap();
        assert_eq!(event.request_id, 5);
        assert_eq!(event.kind, EventKind::Delete);
        assert_eq!(event.error.as_deref(), Some("Sink error: db down"));
        assert_eq!(event.trace_context.get("uber-trace-id").map(String::as_str), Some("t1"));
    }

    #[tokio::test]
    async fn test_rejected_batch_is_dropped() {
        let broker = Arc::new(InMemoryBroker::new());
        broker.fail_next(1);
        let producer = EventProducer::start(quiet_config(), broker.clone()).unwrap();

        for id in 1..=6 {
            producer.send(Event::new(id, EventKind::Read)).await.unwrap();
        }
        producer.close().await.unwrap();

        assert_eq!(broker.attempts(), 2);
        let ids: Vec<u64> = broker
            .messages()
            .iter()
            .map(|m| codec::decode(&m.payload).unwrap().request_id)
            .collect();
        assert_eq!(ids, vec![4, 5, 6]);
    }

    #[tokio::test]
    async fn test_send_after_close() {
        let producer =
            EventProducer::start(quiet_config(), Arc::new(InMemoryBroker::new())).unwrap();
        producer.close().await.unwrap();
        let err = producer.send(Event::new(1, EventKind::Read)).await.unwrap_err();
        assert!(err.is_usage_error());
        assert_eq!(producer.state(), PipelineState::Closed);
    }

    #[tokio::test]
    async fn test_broker_sink_skips_empty_batch() {
        let broker = Arc::new(InMemoryBroker::new());
        let sink = BrokerSink::new("events", broker.clone());
        sink.flush(Vec::new()).await.unwrap();
        assert_eq!(broker.attempts(), 0);
    }
}

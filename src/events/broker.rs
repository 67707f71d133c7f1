//! Message broker boundary.

use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerMessage {
    pub topic: String,
    /// `None` lets the broker pick the partition.
    pub partition: Option<i32>,
    pub payload: Bytes,
}

impl BrokerMessage {
    pub fn new(topic: impl Into<String>, payload: Bytes) -> Self {
        Self {
            topic: topic.into(),
            partition: None,
            payload,
        }
    }
}

/// Synchronous-acknowledgement producer client.
///
/// Implementations resolve only after every replica acknowledged the whole
/// batch and report a single error if any message in it failed.
#[async_trait]
pub trait Broker: Send + Sync {
    async fn send_messages(&self, messages: Vec<BrokerMessage>) -> Result<()>;

    fn name(&self) -> &'static str {
        "broker"
    }
}

#[derive(Debug, Default)]
struct State {
    delivered: Vec<Vec<BrokerMessage>>,
    attempts: usize,
    failures_left: usize,
}

/// Broker double that keeps every acknowledged batch in memory.
#[derive(Debug, Default)]
pub struct InMemoryBroker {
    state: RwLock<State>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects the next `count` batches.
    pub fn fail_next(&self, count: usize) {
        if let Ok(mut st) = self.state.write() {
            st.failures_left = count;
        }
    }

    pub fn batches(&self) -> Vec<Vec<BrokerMessage>> {
        self.state
            .read()
            .map(|st| st.delivered.clone())
            .unwrap_or_default()
    }

    pub fn messages(&self) -> Vec<BrokerMessage> {
        self.batches().into_iter().flatten().collect()
    }

    pub fn message_count(&self) -> usize {
        self.state
            .read()
            .map(|st| st.delivered.iter().map(Vec::len).sum())
            .unwrap_or(0)
    }

    /// Number of send calls, including rejected ones.
    pub fn attempts(&self) -> usize {
        self.state.read().map(|st| st.attempts).unwrap_or(0)
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn send_messages(&self, messages: Vec<BrokerMessage>) -> Result<()> {
        let mut st = self.state.write().map_err(|_| {
            Error::runtime_with_context(
                "InMemoryBroker poisoned",
                ErrorContext::new().with_source("in_memory_broker"),
            )
        })?;
        st.attempts += 1;
        if st.failures_left > 0 {
            st.failures_left -= 1;
            return Err(Error::sink_with_context(
                format!("broker rejected {} message(s)", messages.len()),
                ErrorContext::new().with_source("in_memory_broker"),
            ));
        }
        st.delivered.push(messages);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "in_memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(payload: &'static [u8]) -> BrokerMessage {
        BrokerMessage::new("ocp_request_events", Bytes::from_static(payload))
    }

    #[tokio::test]
    async fn test_records_batches() {
        let broker = InMemoryBroker::new();
        broker.send_messages(vec![message(b"a"), message(b"b")]).await.unwrap();
        broker.send_messages(vec![message(b"c")]).await.unwrap();

        assert_eq!(broker.batches().len(), 2);
        assert_eq!(broker.message_count(), 3);
        assert_eq!(broker.messages()[2].payload, Bytes::from_static(b"c"));
        assert_eq!(broker.messages()[0].partition, None);
    }

    #[tokio::test]
    async fn test_scripted_failures() {
        let broker = InMemoryBroker::new();
        broker.fail_next(1);

        let err = broker.send_messages(vec![message(b"a")]).await.unwrap_err();
        assert!(matches!(err, Error::Sink { .. }));
        broker.send_messages(vec![message(b"b")]).await.unwrap();

        assert_eq!(broker.attempts(), 2);
        assert_eq!(broker.message_count(), 1);
    }
}

//! 事件通知模块：为每次变更生成事件，并通过批处理流水线发送到消息代理。
//!
//! # Event Notification Module
//!
//! Every mutation (and read) handled by the request service is reported as an
//! [`Event`]. Events are encoded once into the broker wire format and pushed
//! through a [`TimedPipeline`](crate::batch::TimedPipeline) to a [`Broker`].
//!
//! Delivery is best-effort: a batch the broker rejects is logged and dropped.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`Event`] / [`EventKind`] | Mutation notification |
//! | [`codec`] | Binary wire format, encode-once [`EncodedEvent`] |
//! | [`Broker`] | Acknowledged batch send to the message broker |
//! | [`EventProducer`] | Batching producer wired to a broker |

pub mod broker;
pub mod codec;
mod producer;

pub use broker::{Broker, BrokerMessage, InMemoryBroker};
pub use codec::{CodecError, EncodedEvent};
pub use producer::{BrokerSink, EventProducer, ProducerConfig};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Operation that produced an event. Discriminants are the wire values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Create = 0,
    Read = 1,
    Update = 2,
    Delete = 3,
}

impl EventKind {
    pub fn from_wire(value: u64) -> Option<Self> {
        match value {
            0 => Some(EventKind::Create),
            1 => Some(EventKind::Read),
            2 => Some(EventKind::Update),
            3 => Some(EventKind::Delete),
            _ => None,
        }
    }

    pub fn as_wire(self) -> u64 {
        self as u64
    }
}

/// Notification about one operation on one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub request_id: u64,
    pub kind: EventKind,
    /// Set only when the originating operation failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Propagated trace carrier of the originating call.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub trace_context: BTreeMap<String, String>,
}

impl Event {
    pub fn new(request_id: u64, kind: EventKind) -> Self {
        Self {
            request_id,
            kind,
            error: None,
            trace_context: BTreeMap::new(),
        }
    }

    pub fn with_error(mut self, error: impl std::fmt::Display) -> Self {
        self.error = Some(error.to_string());
        self
    }

    pub fn with_trace_context(mut self, trace: BTreeMap<String, String>) -> Self {
        self.trace_context = trace;
        self
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

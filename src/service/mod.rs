//! 请求服务：CRUD 处理逻辑，每次调用都会生成事件并上报指标。
//!
//! # Request Service
//!
//! Thin handlers over a [`RequestRepo`]. Every handled call reports an
//! [`Event`](crate::events::Event) through the [`EventProducer`] and bumps an
//! operation counter on the injected [`MetricsReporter`].
//!
//! | Call | Event | Counter |
//! |------|-------|---------|
//! | [`RequestService::create`] | `Create` | `Create` |
//! | [`RequestService::multi_create`] | `Create` per id | `Create` per chunk |
//! | [`RequestService::describe`] | `Read` | `Read` |
//! | [`RequestService::list`] | `Read` per row | `List` |
//! | [`RequestService::update`] | `Update` | `Update` |
//! | [`RequestService::remove`] | `Delete` | `Remove` |
//!
//! A failed event send is logged and never fails the call itself.

mod validation;

pub use crate::telemetry::CallContext;
pub use validation::MAX_LIST_LIMIT;

use crate::batch::split_to_chunks;
use crate::events::{EventKind, EventProducer};
use crate::storage::{Request, RequestRepo};
use crate::telemetry::{MetricsReporter, Operation};
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Payload of a create call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRequest {
    pub user_id: u64,
    #[serde(rename = "type")]
    pub kind: u64,
    pub text: String,
}

impl NewRequest {
    pub fn new(user_id: u64, kind: u64, text: impl Into<String>) -> Self {
        Self {
            user_id,
            kind,
            text: text.into(),
        }
    }

    fn into_request(self) -> Request {
        Request::new(0, self.user_id, self.kind, self.text)
    }
}

pub struct RequestService {
    repo: Arc<dyn RequestRepo>,
    producer: Arc<EventProducer>,
    metrics: Arc<dyn MetricsReporter>,
    write_batch_size: usize,
}

impl RequestService {
    pub fn new(
        repo: Arc<dyn RequestRepo>,
        producer: Arc<EventProducer>,
        metrics: Arc<dyn MetricsReporter>,
        write_batch_size: usize,
    ) -> Result<Self> {
        if write_batch_size == 0 {
            return Err(Error::configuration_with_context(
                "write batch size must be greater than 0",
                ErrorContext::new()
                    .with_field_path("general.write_batch_size")
                    .with_source("request_service"),
            ));
        }
        Ok(Self {
            repo,
            producer,
            metrics,
            write_batch_size,
        })
    }

    pub fn write_batch_size(&self) -> usize {
        self.write_batch_size
    }

    pub async fn create(
        &self,
        ctx: &CallContext,
        user_id: u64,
        kind: u64,
        text: impl Into<String>,
    ) -> Result<u64> {
        debug!(user_id, kind, "create request");
        if let Err(e) = validation::positive("user_id", user_id) {
            self.notify(ctx, 0, EventKind::Create, Some(&e)).await;
            return Err(e);
        }

        let id = self
            .repo
            .add_one(Request::new(0, user_id, kind, text))
            .await
            .map_err(|e| {
                error!(user_id, error = %e, "create failed");
                e
            })?;

        self.notify(ctx, id, EventKind::Create, None).await;
        self.metrics.increment(Operation::Create, 1, "create");
        Ok(id)
    }

    /// Creates requests in groups of `write_batch_size`.
    ///
    /// Stops at the first failing group. Ids of groups stored before the
    /// failure are not returned, although those rows do exist.
    pub async fn multi_create(
        &self,
        ctx: &CallContext,
        requests: Vec<NewRequest>,
    ) -> Result<Vec<u64>> {
        debug!(count = requests.len(), "multi create request");
        for (index, r) in requests.iter().enumerate() {
            if let Err(e) = validation::positive(&format!("requests[{index}].user_id"), r.user_id) {
                self.notify(ctx, 0, EventKind::Create, Some(&e)).await;
                return Err(e);
            }
        }

        let to_create: Vec<Request> = requests.into_iter().map(NewRequest::into_request).collect();
        let mut ids = Vec::with_capacity(to_create.len());

        for (index, chunk) in split_to_chunks(&to_create, self.write_batch_size)
            .into_iter()
            .enumerate()
        {
            let created = match self.repo.add_many(chunk).await {
                Ok(created) => created,
                Err(e) => {
                    error!(chunk = index, size = chunk.len(), error = %e, "failed to save requests");
                    self.notify(ctx, 0, EventKind::Create, Some(&e)).await;
                    return Err(e);
                }
            };
            self.metrics
                .increment(Operation::Create, created.len() as u64, "multi_create");
            for id in &created {
                self.notify(ctx, *id, EventKind::Create, None).await;
            }
            ids.extend(created);
        }
        Ok(ids)
    }

    pub async fn describe(&self, ctx: &CallContext, request_id: u64) -> Result<Request> {
        debug!(request_id, "describe request");
        if let Err(e) = validation::positive("request_id", request_id) {
            self.notify(ctx, request_id, EventKind::Read, Some(&e)).await;
            return Err(e);
        }

        let request = self.repo.describe(request_id).await.map_err(|e| {
            if !e.is_not_found() {
                error!(request_id, error = %e, "describe failed");
            }
            e
        })?;

        self.notify(ctx, request_id, EventKind::Read, None).await;
        self.metrics.increment(Operation::Read, 1, "describe");
        Ok(request)
    }

    pub async fn list(&self, ctx: &CallContext, limit: u64, offset: u64) -> Result<Vec<Request>> {
        debug!(limit, offset, "list requests");
        if let Err(e) = validation::list_limit(limit) {
            self.notify(ctx, 0, EventKind::Read, Some(&e)).await;
            return Err(e);
        }

        let requests = match self.repo.list(limit, offset).await {
            Ok(requests) => requests,
            Err(e) => {
                error!(limit, offset, error = %e, "list failed");
                self.notify(ctx, 0, EventKind::Read, Some(&e)).await;
                return Err(e);
            }
        };

        for r in &requests {
            self.notify(ctx, r.id, EventKind::Read, None).await;
        }
        self.metrics.increment(Operation::List, 1, "list");
        Ok(requests)
    }

    pub async fn update(&self, ctx: &CallContext, request: Request) -> Result<()> {
        debug!(request_id = request.id, "update request");
        validation::positive("request_id", request.id)?;
        validation::positive("user_id", request.user_id)?;

        let request_id = request.id;
        self.repo.update(request).await.map_err(|e| {
            if !e.is_not_found() {
                error!(request_id, error = %e, "update failed");
            }
            e
        })?;

        self.notify(ctx, request_id, EventKind::Update, None).await;
        self.metrics.increment(Operation::Update, 1, "update");
        Ok(())
    }

    pub async fn remove(&self, ctx: &CallContext, request_id: u64) -> Result<()> {
        debug!(request_id, "remove request");
        if let Err(e) = validation::positive("request_id", request_id) {
            self.notify(ctx, request_id, EventKind::Delete, Some(&e)).await;
            return Err(e);
        }

        self.repo.remove(request_id).await.map_err(|e| {
            if !e.is_not_found() {
                error!(request_id, error = %e, "remove failed");
            }
            e
        })?;

        self.notify(ctx, request_id, EventKind::Delete, None).await;
        self.metrics.increment(Operation::Remove, 1, "remove");
        Ok(())
    }

    async fn notify(&self, ctx: &CallContext, request_id: u64, kind: EventKind, err: Option<&Error>) {
        if let Err(e) = self.producer.notify(ctx, request_id, kind, err).await {
            warn!(request_id, ?kind, error = %e, "event not sent");
        }
    }
}

//! 存储边界：Request 实体、仓储接口与内存实现。
//!
//! # Storage Boundary
//!
//! The relational store is an external collaborator; this module only defines
//! the entity, the [`RequestRepo`] interface the rest of the crate writes
//! through, and an in-memory implementation used by tests and the demo binary.

mod memory;

pub use memory::InMemoryRepo;

use crate::batch::ChunkSink;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A user's request record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub id: u64,
    pub user_id: u64,
    #[serde(rename = "type")]
    pub kind: u64,
    pub text: String,
}

impl Request {
    pub fn new(id: u64, user_id: u64, kind: u64, text: impl Into<String>) -> Self {
        Self {
            id,
            user_id,
            kind,
            text: text.into(),
        }
    }
}

impl std::fmt::Display for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Request{{{}, {}, {}, {}}}",
            self.id, self.user_id, self.kind, self.text
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("request {0} not found")]
    NotFound(u64),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait RequestRepo: Send + Sync {
    /// Stores a group of requests in one write.
    async fn add(&self, requests: &[Request]) -> Result<()>;
    async fn add_one(&self, request: Request) -> Result<u64>;
    async fn add_many(&self, requests: &[Request]) -> Result<Vec<u64>>;
    async fn list(&self, limit: u64, offset: u64) -> Result<Vec<Request>>;
    async fn describe(&self, id: u64) -> Result<Request>;
    async fn update(&self, request: Request) -> Result<()>;
    async fn remove(&self, id: u64) -> Result<()>;
}

/// Adapts a [`RequestRepo`] to the chunked writer.
pub struct RepoChunkSink {
    repo: Arc<dyn RequestRepo>,
}

impl RepoChunkSink {
    pub fn new(repo: Arc<dyn RequestRepo>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl ChunkSink<Request> for RepoChunkSink {
    async fn write_chunk(&self, chunk: &[Request]) -> Result<()> {
        self.repo.add(chunk).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_display() {
        let r = Request::new(1, 2, 3, "help");
        assert_eq!(r.to_string(), "Request{1, 2, 3, help}");
    }

    #[test]
    fn test_request_yaml_uses_type_field() {
        let r: Request = serde_yaml::from_str("id: 4\nuser_id: 5\ntype: 6\ntext: hi\n").unwrap();
        assert_eq!(r, Request::new(4, 5, 6, "hi"));
        assert!(serde_yaml::to_string(&r).unwrap().contains("type: 6"));
    }

    #[tokio::test]
    async fn test_repo_chunk_sink_writes_through() {
        let repo = Arc::new(InMemoryRepo::new());
        let sink = RepoChunkSink::new(repo.clone());
        sink.write_chunk(&[Request::new(0, 1, 1, "a"), Request::new(0, 2, 1, "b")])
            .await
            .unwrap();
        assert_eq!(repo.len(), 2);
    }
}

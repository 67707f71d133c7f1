//! In-memory request repository.

use super::{Request, RequestRepo, StorageError};
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug)]
struct State {
    rows: BTreeMap<u64, Request>,
    next_id: u64,
    /// Remaining successful writes before the store reports itself unavailable.
    write_budget: Option<usize>,
}

/// Ordered in-memory store with monotonically increasing ids.
///
/// Ids are assigned on insert, whatever the incoming `id` field holds.
#[derive(Debug)]
pub struct InMemoryRepo {
    state: RwLock<State>,
}

impl InMemoryRepo {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State {
                rows: BTreeMap::new(),
                next_id: 1,
                write_budget: None,
            }),
        }
    }

    /// Lets the next `writes` insert calls succeed, then fails every insert
    /// until [`InMemoryRepo::restore`] is called.
    pub fn fail_writes_after(&self, writes: usize) {
        if let Ok(mut st) = self.state.write() {
            st.write_budget = Some(writes);
        }
    }

    pub fn restore(&self) {
        if let Ok(mut st) = self.state.write() {
            st.write_budget = None;
        }
    }

    pub fn len(&self) -> usize {
        self.state.read().map(|st| st.rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<Request> {
        self.state
            .read()
            .map(|st| st.rows.values().cloned().collect())
            .unwrap_or_default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>> {
        self.state.read().map_err(|_| poisoned())
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>> {
        self.state.write().map_err(|_| poisoned())
    }

    fn insert_all(&self, requests: &[Request]) -> Result<Vec<u64>> {
        let mut st = self.write()?;
        if let Some(budget) = st.write_budget.as_mut() {
            if *budget == 0 {
                return Err(StorageError::Unavailable("write rejected".to_string()).into());
            }
            *budget -= 1;
        }
        let mut ids = Vec::with_capacity(requests.len());
        for request in requests {
            let id = st.next_id;
            st.next_id += 1;
            st.rows.insert(
                id,
                Request {
                    id,
                    ..request.clone()
                },
            );
            ids.push(id);
        }
        Ok(ids)
    }
}

impl Default for InMemoryRepo {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned() -> Error {
    Error::runtime_with_context(
        "InMemoryRepo poisoned",
        ErrorContext::new().with_source("in_memory_repo"),
    )
}

#[async_trait]
impl RequestRepo for InMemoryRepo {
    async fn add(&self, requests: &[Request]) -> Result<()> {
        self.insert_all(requests).map(|_| ())
    }

    async fn add_one(&self, request: Request) -> Result<u64> {
        let ids = self.insert_all(std::slice::from_ref(&request))?;
        ids.first().copied().ok_or_else(|| {
            Error::runtime_with_context(
                "insert returned no id",
                ErrorContext::new().with_source("in_memory_repo"),
            )
        })
    }

    async fn add_many(&self, requests: &[Request]) -> Result<Vec<u64>> {
        self.insert_all(requests)
    }

    async fn list(&self, limit: u64, offset: u64) -> Result<Vec<Request>> {
        let st = self.read()?;
        Ok(st
            .rows
            .values()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn describe(&self, id: u64) -> Result<Request> {
        let st = self.read()?;
        st.rows
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(id).into())
    }

    async fn update(&self, request: Request) -> Result<()> {
        let mut st = self.write()?;
        match st.rows.get_mut(&request.id) {
            Some(row) => {
                *row = request;
                Ok(())
            }
            None => Err(StorageError::NotFound(request.id).into()),
        }
    }

    async fn remove(&self, id: u64) -> Result<()> {
        let mut st = self.write()?;
        st.rows
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(id).into())
    }
}

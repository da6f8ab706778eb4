//! Transport Layer
//!
//! Authenticated access to the document store. The [`NodeStore`] trait is
//! the seam between the persistence logic and the wire:
//!
//! - [`HttpSession`] - the REST client used in production
//! - [`MemoryStore`] - an in-process store honoring the same contract, used
//!   by tests and offline tooling
//!
//! # Contract
//!
//! - `insert` assigns an id and version 1
//! - `update` and `remove` succeed only if the supplied version matches the
//!   stored one, otherwise they fail with [`StoreError::VersionConflict`]
//! - `query` is paged; pages are numbered from 1
//! - a write whose outcome cannot be known fails with
//!   [`StoreError::AmbiguousWrite`] and is never repeated

mod error;
mod http;
mod memory;
mod retry;

pub use error::{StoreError, TransportError};
pub use http::HttpSession;
pub use memory::{MemoryStore, StoreCounters};
pub use retry::RetryPolicy;

use crate::models::{InsertReceipt, NodeDocument, QueryPage, StoreQuery, UpdateReceipt};
use crate::validation::TypeResolver;
use async_trait::async_trait;
use std::sync::Arc;

/// Operations the document store offers
#[async_trait]
pub trait NodeStore: Send + Sync {
    /// Namespace every document written through this store belongs to
    fn namespace(&self) -> &str;

    async fn insert(&self, doc: &NodeDocument) -> Result<InsertReceipt, StoreError>;

    async fn get(&self, id: &str) -> Result<NodeDocument, StoreError>;

    async fn update(
        &self,
        id: &str,
        version: u64,
        doc: &NodeDocument,
    ) -> Result<UpdateReceipt, StoreError>;

    async fn remove(&self, id: &str, version: u64) -> Result<(), StoreError>;

    async fn query(&self, query: &StoreQuery, page: usize) -> Result<QueryPage, StoreError>;
}

/// Resolves node types by fetching the node from a store
pub struct StoreTypeResolver {
    store: Arc<dyn NodeStore>,
}

impl StoreTypeResolver {
    pub fn new(store: Arc<dyn NodeStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl TypeResolver for StoreTypeResolver {
    async fn resolve_type(&self, id: &str) -> Result<Option<String>, TransportError> {
        match self.store.get(id).await {
            Ok(doc) => Ok(Some(doc.node_type)),
            Err(StoreError::NotFound { .. }) => Ok(None),
            Err(StoreError::Transport(err)) => Err(err),
            Err(other) => Err(TransportError::Request(other.to_string())),
        }
    }
}

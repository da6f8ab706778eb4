//! In-process node store
//!
//! Implements the [`NodeStore`] contract without a network: store-assigned
//! ids, version checks on update and delete, paged queries, and private
//! sub-documents visible only to principals on the write ACL. Handles made
//! with [`MemoryStore::as_principal`] share one backing map, which lets tests
//! observe the same data from different identities.

use super::{NodeStore, StoreError};
use crate::models::{InsertReceipt, NodeDocument, QueryPage, StoreQuery, UpdateReceipt};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

const DEFAULT_PAGE_SIZE: usize = 100;

/// Number of calls made to each operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCounters {
    pub inserts: usize,
    pub gets: usize,
    pub updates: usize,
    pub removes: usize,
    pub queries: usize,
}

impl StoreCounters {
    /// Every call that could reach the network
    pub fn total(&self) -> usize {
        self.inserts + self.gets + self.updates + self.removes + self.queries
    }

    pub fn writes(&self) -> usize {
        self.inserts + self.updates + self.removes
    }
}

#[derive(Default)]
struct Counters {
    inserts: AtomicUsize,
    gets: AtomicUsize,
    updates: AtomicUsize,
    removes: AtomicUsize,
    queries: AtomicUsize,
}

#[derive(Default)]
struct State {
    /// Insertion sequence → document; gives queries a stable order
    documents: BTreeMap<u64, NodeDocument>,
    sequence_by_id: BTreeMap<String, u64>,
    next_sequence: u64,
}

struct Shared {
    namespace: String,
    page_size: usize,
    state: RwLock<State>,
    counters: Counters,
    injected: Mutex<Option<StoreError>>,
}

/// Node store held entirely in memory
#[derive(Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
    principal: String,
}

impl MemoryStore {
    /// Empty store; the handle acts as the namespace owner
    pub fn new(namespace: impl Into<String>) -> Self {
        Self::with_page_size(namespace, DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(namespace: impl Into<String>, page_size: usize) -> Self {
        let namespace = namespace.into();
        Self {
            principal: namespace.clone(),
            shared: Arc::new(Shared {
                namespace,
                page_size: page_size.max(1),
                state: RwLock::new(State::default()),
                counters: Counters::default(),
                injected: Mutex::new(None),
            }),
        }
    }

    /// Another handle on the same data acting as `principal`
    pub fn as_principal(&self, principal: impl Into<String>) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            principal: principal.into(),
        }
    }

    pub fn principal(&self) -> &str {
        &self.principal
    }

    pub fn counters(&self) -> StoreCounters {
        let c = &self.shared.counters;
        StoreCounters {
            inserts: c.inserts.load(Ordering::SeqCst),
            gets: c.gets.load(Ordering::SeqCst),
            updates: c.updates.load(Ordering::SeqCst),
            removes: c.removes.load(Ordering::SeqCst),
            queries: c.queries.load(Ordering::SeqCst),
        }
    }

    pub async fn len(&self) -> usize {
        self.shared.state.read().await.documents.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Fail the next operation with `error` instead of running it
    pub async fn fail_next(&self, error: StoreError) {
        *self.shared.injected.lock().await = Some(error);
    }

    /// Stored version of a node, bypassing counters and ACLs
    pub async fn stored_version(&self, id: &str) -> Option<u64> {
        let state = self.shared.state.read().await;
        let seq = state.sequence_by_id.get(id)?;
        state.documents.get(seq).and_then(|doc| doc.ver)
    }

    async fn take_injected(&self) -> Result<(), StoreError> {
        match self.shared.injected.lock().await.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Copy of a stored document as this principal may see it
    fn visible(&self, doc: &NodeDocument) -> NodeDocument {
        let mut doc = doc.clone();
        if !doc.acl.can_write(&self.principal) {
            doc.private = None;
        }
        doc
    }
}

#[async_trait]
impl NodeStore for MemoryStore {
    fn namespace(&self) -> &str {
        &self.shared.namespace
    }

    async fn insert(&self, doc: &NodeDocument) -> Result<InsertReceipt, StoreError> {
        self.shared.counters.inserts.fetch_add(1, Ordering::SeqCst);
        self.take_injected().await?;

        let id = Uuid::new_v4().simple().to_string();
        let now = Utc::now();

        let mut stored = doc.clone();
        stored.id = Some(id.clone());
        stored.ver = Some(1);
        stored.created = Some(now);
        stored.modified = Some(now);

        let mut state = self.shared.state.write().await;
        let seq = state.next_sequence;
        state.next_sequence += 1;
        state.sequence_by_id.insert(id.clone(), seq);
        state.documents.insert(seq, stored);

        Ok(InsertReceipt {
            id,
            ver: 1,
            created: Some(now),
            modified: Some(now),
        })
    }

    async fn get(&self, id: &str) -> Result<NodeDocument, StoreError> {
        self.shared.counters.gets.fetch_add(1, Ordering::SeqCst);
        self.take_injected().await?;

        let state = self.shared.state.read().await;
        state
            .sequence_by_id
            .get(id)
            .and_then(|seq| state.documents.get(seq))
            .filter(|doc| doc.acl.can_read(&self.principal))
            .map(|doc| self.visible(doc))
            .ok_or_else(|| StoreError::not_found(id))
    }

    async fn update(
        &self,
        id: &str,
        version: u64,
        doc: &NodeDocument,
    ) -> Result<UpdateReceipt, StoreError> {
        self.shared.counters.updates.fetch_add(1, Ordering::SeqCst);
        self.take_injected().await?;

        let mut state = self.shared.state.write().await;
        let seq = *state
            .sequence_by_id
            .get(id)
            .ok_or_else(|| StoreError::not_found(id))?;
        let current = state
            .documents
            .get_mut(&seq)
            .ok_or_else(|| StoreError::not_found(id))?;

        let stored_version = current.ver.unwrap_or_default();
        if stored_version != version {
            return Err(StoreError::version_conflict(id, version, Some(stored_version)));
        }
        if !current.acl.can_write(&self.principal) {
            return Err(StoreError::rejected(
                403,
                format!("{} may not write {}", self.principal, id),
            ));
        }

        let next_version = stored_version + 1;
        let now = Utc::now();
        let created = current.created;

        *current = doc.clone();
        current.id = Some(id.to_string());
        current.ver = Some(next_version);
        current.created = created;
        current.modified = Some(now);

        Ok(UpdateReceipt {
            ver: next_version,
            modified: Some(now),
        })
    }

    async fn remove(&self, id: &str, version: u64) -> Result<(), StoreError> {
        self.shared.counters.removes.fetch_add(1, Ordering::SeqCst);
        self.take_injected().await?;

        let mut state = self.shared.state.write().await;
        let seq = *state
            .sequence_by_id
            .get(id)
            .ok_or_else(|| StoreError::not_found(id))?;

        let current = state
            .documents
            .get(&seq)
            .ok_or_else(|| StoreError::not_found(id))?;

        let stored_version = current.ver.unwrap_or_default();
        if stored_version != version {
            return Err(StoreError::version_conflict(id, version, Some(stored_version)));
        }
        if !current.acl.can_write(&self.principal) {
            return Err(StoreError::rejected(
                403,
                format!("{} may not delete {}", self.principal, id),
            ));
        }

        state.documents.remove(&seq);
        state.sequence_by_id.remove(id);
        Ok(())
    }

    async fn query(&self, query: &StoreQuery, page: usize) -> Result<QueryPage, StoreError> {
        self.shared.counters.queries.fetch_add(1, Ordering::SeqCst);
        self.take_injected().await?;

        if query.raw.is_some() {
            return Err(StoreError::rejected(
                400,
                "raw OQL is not evaluated by the in-memory store",
            ));
        }
        if page == 0 {
            return Err(StoreError::rejected(400, "pages are numbered from 1"));
        }

        let state = self.shared.state.read().await;
        let matches: Vec<&NodeDocument> = state
            .documents
            .values()
            .filter(|doc| doc.ns == query.ns)
            .filter(|doc| doc.acl.can_read(&self.principal))
            .filter(|doc| query.criteria.matches(doc))
            .collect();

        let page_size = self.shared.page_size;
        let results = matches
            .iter()
            .skip((page - 1) * page_size)
            .take(page_size)
            .map(|doc| self.visible(doc))
            .collect();

        Ok(QueryPage {
            results,
            page_size,
            result_count: matches.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Acl, QueryCriteria};
    use serde_json::{json, Map};
    use std::collections::BTreeMap as Links;

    fn doc(node_type: &str) -> NodeDocument {
        NodeDocument {
            id: None,
            ver: None,
            ns: "ihmp".to_string(),
            node_type: node_type.to_string(),
            meta: Map::new(),
            linkages: Links::new(),
            acl: Acl::for_namespace("ihmp"),
            private: None,
            created: None,
            modified: None,
        }
    }

    #[tokio::test]
    async fn test_insert_assigns_id_and_version() {
        let store = MemoryStore::new("ihmp");
        let receipt = store.insert(&doc("project")).await.unwrap();

        assert_eq!(receipt.ver, 1);
        assert_eq!(receipt.id.len(), 32);

        let fetched = store.get(&receipt.id).await.unwrap();
        assert_eq!(fetched.id.as_deref(), Some(receipt.id.as_str()));
        assert_eq!(fetched.ver, Some(1));
        assert!(fetched.created.is_some());
    }

    #[tokio::test]
    async fn test_update_checks_version() {
        let store = MemoryStore::new("ihmp");
        let receipt = store.insert(&doc("project")).await.unwrap();

        let updated = store.update(&receipt.id, 1, &doc("project")).await.unwrap();
        assert_eq!(updated.ver, 2);

        let stale = store.update(&receipt.id, 1, &doc("project")).await;
        assert!(matches!(
            stale,
            Err(StoreError::VersionConflict { expected: 1, actual: Some(2), .. })
        ));
        assert_eq!(store.stored_version(&receipt.id).await, Some(2));
    }

    #[tokio::test]
    async fn test_remove_checks_version_and_existence() {
        let store = MemoryStore::new("ihmp");
        let receipt = store.insert(&doc("project")).await.unwrap();

        assert!(matches!(
            store.remove(&receipt.id, 7).await,
            Err(StoreError::VersionConflict { .. })
        ));
        store.remove(&receipt.id, 1).await.unwrap();
        assert!(matches!(
            store.remove(&receipt.id, 1).await,
            Err(StoreError::NotFound { .. })
        ));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_remove_requires_write_access() {
        let store = MemoryStore::new("ihmp");
        let receipt = store.insert(&doc("project")).await.unwrap();

        let guest = store.as_principal("guest");
        assert!(matches!(
            guest.remove(&receipt.id, 1).await,
            Err(StoreError::Rejected { status: 403, .. })
        ));
        assert_eq!(store.stored_version(&receipt.id).await, Some(1));

        store.remove(&receipt.id, 1).await.unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_private_hidden_from_other_principals() {
        let store = MemoryStore::new("ihmp");
        let mut with_private = doc("subject");
        let mut private = Map::new();
        private.insert("dob".to_string(), json!("1980-01-01"));
        with_private.private = Some(private);

        let receipt = store.insert(&with_private).await.unwrap();

        assert!(store.get(&receipt.id).await.unwrap().private.is_some());
        let guest = store.as_principal("guest");
        let seen = guest.get(&receipt.id).await.unwrap();
        assert!(seen.private.is_none());
        assert!(!seen.meta.contains_key("dob"));
    }

    #[tokio::test]
    async fn test_query_pages_in_insertion_order() {
        let store = MemoryStore::with_page_size("ihmp", 2);
        let mut ids = Vec::new();
        for _ in 0..5 {
            ids.push(store.insert(&doc("visit")).await.unwrap().id);
        }
        store.insert(&doc("project")).await.unwrap();

        let query = StoreQuery::new(
            "ihmp",
            QueryCriteria {
                node_type: Some("visit".to_string()),
                ..Default::default()
            },
        );

        let first = store.query(&query, 1).await.unwrap();
        let third = store.query(&query, 3).await.unwrap();
        assert_eq!(first.result_count, 5);
        assert_eq!(first.results.len(), 2);
        assert_eq!(first.results[0].id.as_deref(), Some(ids[0].as_str()));
        assert_eq!(third.results.len(), 1);
        assert_eq!(third.results[0].id.as_deref(), Some(ids[4].as_str()));
        assert_eq!(store.counters().queries, 2);
    }

    #[tokio::test]
    async fn test_injected_failure_applies_once() {
        let store = MemoryStore::new("ihmp");
        store
            .fail_next(StoreError::ambiguous("insert", None, "connection reset"))
            .await;

        assert!(matches!(
            store.insert(&doc("project")).await,
            Err(StoreError::AmbiguousWrite { .. })
        ));
        assert!(store.insert(&doc("project")).await.is_ok());
        assert_eq!(store.counters().inserts, 2);
        assert_eq!(store.len().await, 1);
    }
}

//! Linkage Target Type Cache
//!
//! Remembers the node type behind every id resolved during linkage
//! validation, so repeated saves that link to the same parents do not repeat
//! the lookup round trip.
//!
//! # Architecture
//!
//! The cache maintains a `node id → node type` map behind a `tokio` RwLock.
//! A node's type never changes once it is stored, but the node may be
//! deleted by another client at any time. Cached answers are therefore only
//! good enough for advisory checks; writes go through [`TypeCache::fresh`],
//! which always asks the inner resolver and drops entries for nodes that no
//! longer exist. Misses are never cached, which keeps a not-yet-created
//! target resolvable later.

use crate::transport::TransportError;
use crate::validation::TypeResolver;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Read-through cache in front of another resolver
pub struct TypeCache {
    inner: Arc<dyn TypeResolver>,
    types: RwLock<HashMap<String, String>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl TypeCache {
    pub fn new(inner: Arc<dyn TypeResolver>) -> Self {
        Self {
            inner,
            types: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Record a type learned elsewhere (after a save or load)
    pub async fn remember(&self, id: impl Into<String>, node_type: impl Into<String>) {
        self.types.write().await.insert(id.into(), node_type.into());
    }

    pub async fn forget(&self, id: &str) {
        self.types.write().await.remove(id);
    }

    /// Resolver that bypasses cached answers but keeps the cache current
    pub fn fresh(&self) -> FreshLookup<'_> {
        FreshLookup { cache: self }
    }

    pub async fn len(&self) -> usize {
        self.types.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Lookups answered from the cache and lookups passed through
    pub fn stats(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }
}

#[async_trait]
impl TypeResolver for TypeCache {
    async fn resolve_type(&self, id: &str) -> Result<Option<String>, TransportError> {
        if let Some(node_type) = self.types.read().await.get(id) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Some(node_type.clone()));
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let resolved = self.inner.resolve_type(id).await?;
        if let Some(node_type) = &resolved {
            self.remember(id, node_type.clone()).await;
        }
        Ok(resolved)
    }
}

/// Store-authoritative lookups through a [`TypeCache`]
pub struct FreshLookup<'a> {
    cache: &'a TypeCache,
}

#[async_trait]
impl TypeResolver for FreshLookup<'_> {
    async fn resolve_type(&self, id: &str) -> Result<Option<String>, TransportError> {
        self.cache.misses.fetch_add(1, Ordering::Relaxed);
        let resolved = self.cache.inner.resolve_type(id).await?;
        match &resolved {
            Some(node_type) => self.cache.remember(id, node_type.clone()).await,
            None => {
                if self.cache.types.write().await.remove(id).is_some() {
                    tracing::debug!(%id, "Dropped cached type for a vanished node");
                }
            }
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingResolver {
        calls: AtomicUsize,
        known: HashMap<String, String>,
    }

    #[async_trait]
    impl TypeResolver for CountingResolver {
        async fn resolve_type(&self, id: &str) -> Result<Option<String>, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.known.get(id).cloned())
        }
    }

    fn counting() -> Arc<CountingResolver> {
        Arc::new(CountingResolver {
            calls: AtomicUsize::new(0),
            known: HashMap::from([("v1".to_string(), "visit".to_string())]),
        })
    }

    #[tokio::test]
    async fn test_hits_avoid_inner_lookup() {
        let inner = counting();
        let cache = TypeCache::new(inner.clone());

        assert_eq!(cache.resolve_type("v1").await.unwrap().as_deref(), Some("visit"));
        assert_eq!(cache.resolve_type("v1").await.unwrap().as_deref(), Some("visit"));

        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats(), (1, 1));
    }

    #[tokio::test]
    async fn test_misses_are_not_cached() {
        let inner = counting();
        let cache = TypeCache::new(inner.clone());

        assert!(cache.resolve_type("ghost").await.unwrap().is_none());
        assert!(cache.resolve_type("ghost").await.unwrap().is_none());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_fresh_lookup_drops_vanished_entries() {
        let inner = counting();
        let cache = TypeCache::new(inner.clone());

        cache.remember("gone", "project").await;
        assert_eq!(cache.resolve_type("gone").await.unwrap().as_deref(), Some("project"));
        assert!(cache.fresh().resolve_type("gone").await.unwrap().is_none());
        assert!(cache.is_empty().await);

        assert_eq!(cache.fresh().resolve_type("v1").await.unwrap().as_deref(), Some("visit"));
        assert_eq!(cache.fresh().resolve_type("v1").await.unwrap().as_deref(), Some("visit"));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_remember_and_forget() {
        let inner = counting();
        let cache = TypeCache::new(inner.clone());

        cache.remember("s1", "subject").await;
        assert_eq!(cache.resolve_type("s1").await.unwrap().as_deref(), Some("subject"));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 0);

        cache.forget("s1").await;
        assert!(cache.resolve_type("s1").await.unwrap().is_none());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }
}

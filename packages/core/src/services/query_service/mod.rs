//! Query Service - Search over the Document Store
//!
//! This module turns [`NodeQuery`] criteria into store queries and exposes the
//! results as lazily paged [`Node`] sequences.
//!
//! # Architecture
//!
//! - **Checked criteria**: a query naming a node type is checked against the
//!   schema before any request, so a misspelt attribute or linkage fails fast
//! - **Lazy paging**: [`NodePager`] fetches a page only when its buffer runs dry
//! - **Inbound traversal**: [`QueryService::children`] finds every node linking
//!   to a parent using the registry's inbound linkage index
//!
//! # Query Pattern Examples
//!
//! - Type filter: `"visit"[node_type]`
//! - Attribute filter: `"subject"[node_type] && "female"[meta.gender]`
//! - Children: `("v1"[linkage.collected_during] || "v1"[linkage.computed_from])`
//!
//! # Examples
//!
//! ```rust,no_run
//! use ihmp_core::schema::SchemaRegistry;
//! use ihmp_core::services::{NodeQuery, QueryService};
//! use ihmp_core::transport::MemoryStore;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Arc::new(SchemaRegistry::builtin()?);
//! let queries = QueryService::new(Arc::new(MemoryStore::new("ihmp")), registry);
//!
//! let mut visits = queries.search(NodeQuery::of_type("visit").linked_to("by", "s1"))?;
//! while let Some(visit) = visits.next().await {
//!     println!("{:?}", visit?.id());
//! }
//! # Ok(())
//! # }
//! ```

mod builder;
mod pager;

pub use builder::NodeQuery;
pub use pager::NodePager;

use crate::models::{Node, StoreQuery};
use crate::schema::SchemaRegistry;
use crate::services::error::NodeServiceError;
use crate::transport::NodeStore;
use crate::validation::{LinkageViolation, LinkageViolationKind, Violation, ViolationKind};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Runs searches against a [`NodeStore`]
pub struct QueryService {
    store: Arc<dyn NodeStore>,
    registry: Arc<SchemaRegistry>,
}

impl QueryService {
    pub fn new(store: Arc<dyn NodeStore>, registry: Arc<SchemaRegistry>) -> Self {
        Self { store, registry }
    }

    pub fn store(&self) -> &Arc<dyn NodeStore> {
        &self.store
    }

    /// Reject criteria that cannot match a node of the named type
    fn check(&self, query: &NodeQuery) -> Result<(), NodeServiceError> {
        let criteria = query.criteria();
        let Some(type_name) = criteria.node_type.as_deref() else {
            return Ok(());
        };
        let node_type = self
            .registry
            .get(type_name)
            .map_err(|_| NodeServiceError::unknown_node_type(type_name))?;

        let violations: Vec<Violation> = criteria
            .attributes
            .keys()
            .filter(|name| name.as_str() != "subtype" && node_type.get_attribute(name).is_none())
            .map(|name| Violation::new(name.as_str(), ViolationKind::UnknownAttribute))
            .collect();

        let linkages: Vec<LinkageViolation> = criteria
            .linked_to
            .iter()
            .chain(criteria.linked_to_any.iter())
            .filter(|filter| node_type.get_linkage(&filter.linkage).is_none())
            .map(|filter| {
                LinkageViolation::for_target(
                    filter.linkage.as_str(),
                    filter.target.as_str(),
                    LinkageViolationKind::NotPermitted,
                )
            })
            .collect();

        if violations.is_empty() && linkages.is_empty() {
            Ok(())
        } else {
            Err(NodeServiceError::SchemaViolation {
                node_type: node_type.name.clone(),
                violations,
                linkages,
            })
        }
    }

    /// Lazily page through every node matching `query`
    ///
    /// No request is made until the pager is first advanced.
    pub fn search(&self, query: NodeQuery) -> Result<NodePager, NodeServiceError> {
        self.check(&query)?;
        let store_query = query.to_store_query(self.store.namespace());
        tracing::debug!(oql = %store_query.to_oql(), "Search prepared");
        Ok(NodePager::new(Arc::clone(&self.store), store_query))
    }

    /// Nodes of one type matching a store-native OQL expression
    ///
    /// The expression is combined with the type constraint as
    /// `(<raw>) && "<type>"[node_type]`.
    pub fn search_type(&self, node_type: &str, raw: &str) -> Result<NodePager, NodeServiceError> {
        let mut query = NodeQuery::of_type(node_type);
        if !raw.trim().is_empty() {
            query = query.raw(raw);
        }
        self.search(query)
    }

    /// Nodes that link to `parent` through any linkage able to target its type
    pub fn children(&self, parent: &Node) -> Result<NodePager, NodeServiceError> {
        let Some(id) = parent.id() else {
            return Err(NodeServiceError::invalid_state(
                "cannot list children of a node that has not been saved",
            ));
        };
        self.registry
            .get(parent.node_type())
            .map_err(|_| NodeServiceError::unknown_node_type(parent.node_type()))?;

        let names: BTreeSet<&str> = self
            .registry
            .inbound_linkages(parent.node_type())
            .iter()
            .map(|inbound| inbound.linkage.as_str())
            .collect();

        if names.is_empty() {
            let query = StoreQuery::new(self.store.namespace(), Default::default());
            return Ok(NodePager::empty(Arc::clone(&self.store), query));
        }

        let query = NodeQuery::new().linked_via_any(names, id);
        Ok(NodePager::new(
            Arc::clone(&self.store),
            query.to_store_query(self.store.namespace()),
        ))
    }
}

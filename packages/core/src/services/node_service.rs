//! Node Service - Persistence Coordination
//!
//! This module orchestrates saving, loading and deleting nodes:
//!
//! - Local validation (attributes, subtype, linkage shape) before any I/O
//! - Linkage target resolution: cached for `validate`, re-checked against
//!   the store for `save`
//! - Insert vs. update dispatch keyed on whether the node has an id
//! - Mapping store outcomes to [`NodeServiceError`]
//!
//! # Atomicity
//!
//! Every operation either leaves the caller's node reflecting the store's
//! new state or leaves it exactly as it was. The node is only touched after
//! the store has confirmed the write.
//!
//! # Examples
//!
//! ```rust,no_run
//! use ihmp_core::models::Node;
//! use ihmp_core::schema::SchemaRegistry;
//! use ihmp_core::services::NodeService;
//! use ihmp_core::transport::MemoryStore;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Arc::new(SchemaRegistry::builtin()?);
//! let service = NodeService::new(Arc::new(MemoryStore::new("ihmp")), registry);
//!
//! let mut project = Node::new("project")
//!     .with_attribute("name", "iHMP")
//!     .with_attribute("description", "Integrative Human Microbiome Project");
//! project.add_tag("hmp2");
//!
//! service.save(&mut project).await?;
//! assert_eq!(project.version(), Some(1));
//! # Ok(())
//! # }
//! ```

use crate::models::Node;
use crate::schema::{NodeType, SchemaRegistry, SubtypeRule};
use crate::services::error::NodeServiceError;
use crate::services::type_cache::TypeCache;
use crate::transport::{NodeStore, StoreTypeResolver};
use crate::validation::{
    check_linkage_shape, resolve_linkage_targets, resolve_subtype, validate_attributes,
    LinkageViolation, TypeResolver, ValidationReport, Violation, ViolationKind,
};
use std::sync::Arc;

/// Result of the checks that need nothing but the schema
struct LocalCheck {
    subtype: Option<String>,
    violations: Vec<Violation>,
    linkages: Vec<LinkageViolation>,
}

impl LocalCheck {
    fn is_clean(&self) -> bool {
        self.violations.is_empty() && self.linkages.is_empty()
    }
}

/// Saves, loads and deletes nodes through a [`NodeStore`]
///
/// Cheap to share: wrap in an `Arc` and call from any number of tasks. The
/// service keeps no reference to the nodes it is handed.
pub struct NodeService {
    store: Arc<dyn NodeStore>,
    registry: Arc<SchemaRegistry>,
    types: Arc<TypeCache>,
}

impl NodeService {
    /// Service resolving linkage targets through the same store
    pub fn new(store: Arc<dyn NodeStore>, registry: Arc<SchemaRegistry>) -> Self {
        let resolver = Arc::new(StoreTypeResolver::new(Arc::clone(&store)));
        Self {
            store,
            registry,
            types: Arc::new(TypeCache::new(resolver)),
        }
    }

    /// Replace the resolver used for linkage targets; results stay cached
    pub fn with_resolver(mut self, resolver: Arc<dyn TypeResolver>) -> Self {
        self.types = Arc::new(TypeCache::new(resolver));
        self
    }

    pub fn store(&self) -> &Arc<dyn NodeStore> {
        &self.store
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn type_cache(&self) -> &TypeCache {
        &self.types
    }

    pub fn namespace(&self) -> &str {
        self.store.namespace()
    }

    /// Create an unsaved node, checking that the type exists
    pub fn create(&self, node_type: &str) -> Result<Node, NodeServiceError> {
        self.node_type(node_type)?;
        Ok(Node::new(node_type))
    }

    fn node_type(&self, name: &str) -> Result<&NodeType, NodeServiceError> {
        self.registry
            .get(name)
            .map_err(|_| NodeServiceError::unknown_node_type(name))
    }

    fn check_locally(&self, node_type: &NodeType, node: &Node) -> LocalCheck {
        let mut violations = validate_attributes(node_type, &node.attributes)
            .err()
            .unwrap_or_default();

        if node.private.is_some() && !node_type.private_data {
            violations.push(Violation::new("private", ViolationKind::PrivateDataNotAllowed));
        }

        let subtype = match resolve_subtype(
            node_type,
            &node.attributes,
            node.subtype(),
            node.saved_subtype(),
        ) {
            Ok(subtype) => subtype,
            Err(violation) => {
                violations.push(violation);
                None
            }
        };

        LocalCheck {
            subtype,
            violations,
            linkages: check_linkage_shape(node_type, &node.linkages),
        }
    }

    /// Run every check `save` would run and report all problems
    ///
    /// Linkage targets are resolved only when the local checks pass. Only a
    /// transport failure during resolution is returned as an error.
    pub async fn validate(&self, node: &Node) -> Result<ValidationReport, NodeServiceError> {
        let node_type = self.node_type(node.node_type())?;
        let local = self.check_locally(node_type, node);

        let mut report = ValidationReport {
            attributes: local.violations,
            linkages: local.linkages,
        };
        if report.is_valid() {
            report.linkages =
                resolve_linkage_targets(node_type, &node.linkages, self.types.as_ref()).await?;
        }
        Ok(report)
    }

    /// Whether `save` would pass validation
    pub async fn is_valid(&self, node: &Node) -> Result<bool, NodeServiceError> {
        Ok(self.validate(node).await?.is_valid())
    }

    /// Insert a new node or update a saved one
    ///
    /// # Errors
    ///
    /// - `SchemaViolation` - local checks failed; no request was made
    /// - `LinkageViolation` - a target is missing or has a disallowed type
    /// - `StaleNode` - the store holds a newer version
    /// - `AmbiguousWriteOutcome` - the write may or may not have been applied
    /// - `InvalidState` - the node was deleted
    pub async fn save(&self, node: &mut Node) -> Result<(), NodeServiceError> {
        if node.is_deleted() {
            return Err(NodeServiceError::invalid_state(
                "cannot save a node that has been deleted",
            ));
        }

        let node_type = self.node_type(node.node_type())?;
        let local = self.check_locally(node_type, node);
        if !local.is_clean() {
            tracing::debug!(
                node_type = %node_type.name,
                attribute_violations = local.violations.len(),
                linkage_violations = local.linkages.len(),
                "Save refused by local validation"
            );
            return Err(NodeServiceError::SchemaViolation {
                node_type: node_type.name.clone(),
                violations: local.violations,
                linkages: local.linkages,
            });
        }

        // Targets may have been deleted by another client since they were cached
        let unresolved =
            resolve_linkage_targets(node_type, &node.linkages, &self.types.fresh()).await?;
        if !unresolved.is_empty() {
            return Err(NodeServiceError::LinkageViolation {
                node_type: node_type.name.clone(),
                violations: unresolved,
            });
        }

        let doc = node.document_with_subtype(self.namespace(), local.subtype.as_deref());

        match (node.id().map(str::to_string), node.version()) {
            (None, _) => {
                tracing::debug!(node_type = %doc.node_type, "Inserting node");
                let receipt = self.store.insert(&doc).await?;
                self.types.remember(&receipt.id, &doc.node_type).await;
                node.mark_inserted(receipt, local.subtype);
            }
            (Some(id), Some(version)) => {
                tracing::debug!(%id, version, "Updating node");
                let receipt = self.store.update(&id, version, &doc).await?;
                node.mark_updated(receipt, local.subtype);
            }
            (Some(id), None) => {
                return Err(NodeServiceError::invalid_state(format!(
                    "node {id} has an id but no version"
                )));
            }
        }

        Ok(())
    }

    /// Delete a saved node and invalidate the local entity
    pub async fn delete(&self, node: &mut Node) -> Result<(), NodeServiceError> {
        if node.is_deleted() {
            return Err(NodeServiceError::invalid_state("node has already been deleted"));
        }
        let (Some(id), Some(version)) = (node.id().map(str::to_string), node.version()) else {
            return Err(NodeServiceError::invalid_state(
                "cannot delete a node that has not been saved",
            ));
        };

        self.store.remove(&id, version).await?;
        self.types.forget(&id).await;
        node.mark_deleted();

        tracing::debug!(%id, "Node deleted and invalidated");
        Ok(())
    }

    /// Fetch a node by id
    pub async fn load(&self, id: &str) -> Result<Node, NodeServiceError> {
        let doc = self.store.get(id).await?;
        let node_type = self.node_type(&doc.node_type)?;
        self.types.remember(id, doc.node_type.as_str()).await;

        let mut node = Node::from_document(doc)?;
        if node_type.subtype == SubtypeRule::None && node.saved_subtype().is_some() {
            tracing::debug!(%id, node_type = %node_type.name, "Ignoring stored subtype");
            node.clear_subtype();
        }
        Ok(node)
    }
}

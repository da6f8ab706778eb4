//! Node Entity
//!
//! This module defines the in-memory `Node` used for every document type in
//! the metadata store.
//!
//! # Architecture
//!
//! - **Universal Node**: one struct represents all node types
//! - **Schema-driven**: attribute and linkage rules live in [`crate::schema`]
//!   and are enforced by the persistence layer, not by setters
//! - **Store-assigned identity**: `id` and `version` are set only from store
//!   receipts and never change afterwards except for the version advancing
//! - **Private data**: an optional private sub-document is kept apart from
//!   the public attributes all the way to the wire
//!
//! # Examples
//!
//! ```rust
//! use ihmp_core::models::Node;
//! use serde_json::json;
//!
//! let mut visit = Node::new("visit")
//!     .with_attribute("visit_id", "V-001")
//!     .with_attribute("visit_number", 1)
//!     .with_attribute("interval", 0);
//! visit.add_tag("baseline");
//! visit.link("by", "subject-id");
//!
//! assert!(!visit.is_saved());
//! assert_eq!(visit.attribute("visit_number"), Some(&json!(1)));
//! ```

use super::{Acl, InsertReceipt, NodeDocument, UpdateReceipt};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Linkage name to the set of target node ids
pub type Linkages = BTreeMap<String, BTreeSet<String>>;

const TAGS: &str = "tags";
const SUBTYPE: &str = "subtype";

/// Errors converting a stored document into a node
#[derive(Error, Debug)]
pub enum NodeError {
    #[error("Stored document is missing '{0}'")]
    MissingField(&'static str),
}

/// Lifecycle of a node relative to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Never saved; has no id
    New,
    /// Saved at least once; id and version are set
    Persisted,
    /// Deleted from the store; every further operation is refused
    Deleted,
}

/// A typed metadata record in the store
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    id: Option<String>,
    version: Option<u64>,
    node_type: String,
    subtype: Option<String>,
    saved_subtype: Option<String>,

    /// Public attributes, validated against the node type on save
    pub attributes: Map<String, Value>,

    /// Outgoing linkages to other nodes
    pub linkages: Linkages,

    /// Private sub-document, visible only to principals with write access
    pub private: Option<Map<String, Value>>,

    pub acl: Acl,

    created_at: Option<DateTime<Utc>>,
    modified_at: Option<DateTime<Utc>>,
    state: NodeState,
}

impl Node {
    /// Create an unsaved node of the given type
    ///
    /// The type name is checked against the schema registry when the node is
    /// validated or saved.
    pub fn new(node_type: impl Into<String>) -> Self {
        Self {
            id: None,
            version: None,
            node_type: node_type.into(),
            subtype: None,
            saved_subtype: None,
            attributes: Map::new(),
            linkages: Linkages::new(),
            private: None,
            acl: Acl::default(),
            created_at: None,
            modified_at: None,
            state: NodeState::New,
        }
    }

    /// Rebuild a node from a document returned by the store
    pub fn from_document(doc: NodeDocument) -> Result<Self, NodeError> {
        let id = doc.id.ok_or(NodeError::MissingField("id"))?;
        let version = doc.ver.ok_or(NodeError::MissingField("ver"))?;

        let mut attributes = doc.meta;
        let subtype = match attributes.remove(SUBTYPE) {
            Some(Value::String(s)) => Some(s),
            _ => None,
        };

        let linkages = doc
            .linkages
            .into_iter()
            .map(|(name, targets)| (name, targets.into_iter().collect()))
            .collect();

        Ok(Self {
            id: Some(id),
            version: Some(version),
            node_type: doc.node_type,
            subtype: subtype.clone(),
            saved_subtype: subtype,
            attributes,
            linkages,
            private: doc.private,
            acl: doc.acl,
            created_at: doc.created,
            modified_at: doc.modified,
            state: NodeState::Persisted,
        })
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn version(&self) -> Option<u64> {
        self.version
    }

    pub fn node_type(&self) -> &str {
        &self.node_type
    }

    pub fn subtype(&self) -> Option<&str> {
        self.subtype.as_deref()
    }

    /// Subtype recorded by the last successful save or load
    pub fn saved_subtype(&self) -> Option<&str> {
        self.saved_subtype.as_deref()
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn modified_at(&self) -> Option<DateTime<Utc>> {
        self.modified_at
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn is_saved(&self) -> bool {
        self.state == NodeState::Persisted
    }

    pub fn is_deleted(&self) -> bool {
        self.state == NodeState::Deleted
    }

    /// Drop any subtype; used for types that do not carry one
    pub(crate) fn clear_subtype(&mut self) {
        self.subtype = None;
        self.saved_subtype = None;
    }

    /// Choose the subtype for types with a controlled vocabulary
    pub fn set_subtype(&mut self, subtype: impl Into<String>) {
        self.subtype = Some(subtype.into());
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(name.into(), value.into());
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_attribute(name, value);
        self
    }

    pub fn remove_attribute(&mut self, name: &str) -> Option<Value> {
        self.attributes.remove(name)
    }

    /// Add a tag unless it is already present; returns whether it was added
    pub fn add_tag(&mut self, tag: impl Into<String>) -> bool {
        let tag = Value::String(tag.into());
        let entry = self
            .attributes
            .entry(TAGS)
            .or_insert_with(|| Value::Array(Vec::new()));

        if !entry.is_array() {
            *entry = Value::Array(Vec::new());
        }
        match entry {
            Value::Array(tags) if !tags.contains(&tag) => {
                tags.push(tag);
                true
            }
            _ => false,
        }
    }

    pub fn tags(&self) -> Vec<&str> {
        self.attributes
            .get(TAGS)
            .and_then(Value::as_array)
            .map(|tags| tags.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    /// Add a target to a linkage; returns whether it was new
    pub fn link(&mut self, linkage: impl Into<String>, target_id: impl Into<String>) -> bool {
        self.linkages
            .entry(linkage.into())
            .or_default()
            .insert(target_id.into())
    }

    /// Remove a target from a linkage, dropping the linkage once empty
    pub fn unlink(&mut self, linkage: &str, target_id: &str) -> bool {
        let Some(targets) = self.linkages.get_mut(linkage) else {
            return false;
        };
        let removed = targets.remove(target_id);
        if targets.is_empty() {
            self.linkages.remove(linkage);
        }
        removed
    }

    pub fn linked(&self, linkage: &str) -> impl Iterator<Item = &str> {
        self.linkages
            .get(linkage)
            .into_iter()
            .flat_map(|targets| targets.iter().map(String::as_str))
    }

    pub fn set_private(&mut self, private: Map<String, Value>) {
        self.private = Some(private);
    }

    /// Serialize the node for the store, using the node's current subtype
    pub fn to_document(&self, namespace: &str) -> NodeDocument {
        self.document_with_subtype(namespace, self.subtype.as_deref())
    }

    /// Serialize the node with an explicitly resolved subtype
    ///
    /// An empty write ACL is filled with the namespace.
    pub(crate) fn document_with_subtype(
        &self,
        namespace: &str,
        subtype: Option<&str>,
    ) -> NodeDocument {
        let mut meta = self.attributes.clone();
        meta.remove(SUBTYPE);
        if let Some(subtype) = subtype {
            meta.insert(SUBTYPE.to_string(), Value::String(subtype.to_string()));
        }

        let mut acl = self.acl.clone();
        if acl.write.is_empty() {
            acl.write.push(namespace.to_string());
        }

        NodeDocument {
            id: self.id.clone(),
            ver: self.version,
            ns: namespace.to_string(),
            node_type: self.node_type.clone(),
            meta,
            linkages: self
                .linkages
                .iter()
                .map(|(name, targets)| (name.clone(), targets.iter().cloned().collect()))
                .collect(),
            acl,
            private: self.private.clone(),
            created: self.created_at,
            modified: self.modified_at,
        }
    }

    pub(crate) fn mark_inserted(&mut self, receipt: InsertReceipt, subtype: Option<String>) {
        let now = Utc::now();
        self.id = Some(receipt.id);
        self.version = Some(receipt.ver);
        self.created_at = Some(receipt.created.unwrap_or(now));
        self.modified_at = Some(receipt.modified.unwrap_or(now));
        self.subtype = subtype.clone();
        self.saved_subtype = subtype;
        self.state = NodeState::Persisted;
    }

    pub(crate) fn mark_updated(&mut self, receipt: UpdateReceipt, subtype: Option<String>) {
        self.version = Some(receipt.ver);
        self.modified_at = Some(receipt.modified.unwrap_or_else(Utc::now));
        self.subtype = subtype.clone();
        self.saved_subtype = subtype;
    }

    pub(crate) fn mark_deleted(&mut self) {
        self.state = NodeState::Deleted;
    }
}

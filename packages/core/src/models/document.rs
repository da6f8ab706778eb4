//! Wire Documents
//!
//! Serializable shapes exchanged with the metadata store. A [`NodeDocument`]
//! is the full record for one node; the receipt types carry what the store
//! hands back after a write.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Principal that grants read access to everyone
pub const PUBLIC_READ: &str = "all";

/// Access control lists attached to every document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acl {
    #[serde(default)]
    pub read: Vec<String>,
    #[serde(default)]
    pub write: Vec<String>,
}

impl Default for Acl {
    fn default() -> Self {
        Self {
            read: vec![PUBLIC_READ.to_string()],
            write: Vec::new(),
        }
    }
}

impl Acl {
    /// World-readable, writable by the namespace
    pub fn for_namespace(namespace: &str) -> Self {
        Self {
            read: vec![PUBLIC_READ.to_string()],
            write: vec![namespace.to_string()],
        }
    }

    pub fn can_read(&self, principal: &str) -> bool {
        self.read.iter().any(|p| p == PUBLIC_READ || p == principal)
    }

    pub fn can_write(&self, principal: &str) -> bool {
        self.write.iter().any(|p| p == principal)
    }
}

/// One node as stored by the metadata store
///
/// `meta` holds the public attributes plus the resolved `subtype`. The
/// private sub-document travels under its own top-level key and is never
/// merged into `meta`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ver: Option<u64>,

    pub ns: String,

    pub node_type: String,

    #[serde(default)]
    pub meta: Map<String, Value>,

    /// Older store versions emit the singular key
    #[serde(default, alias = "linkage")]
    pub linkages: BTreeMap<String, Vec<String>>,

    #[serde(default)]
    pub acl: Acl,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private: Option<Map<String, Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
}

impl NodeDocument {
    pub fn subtype(&self) -> Option<&str> {
        self.meta.get("subtype").and_then(Value::as_str)
    }

    /// Ids this document links to under `linkage`
    pub fn linked_ids(&self, linkage: &str) -> &[String] {
        self.linkages
            .get(linkage)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Returned by the store after a successful insert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertReceipt {
    pub id: String,
    pub ver: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
}

/// Returned by the store after a successful update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateReceipt {
    pub ver: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
}

/// One page of query results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPage {
    #[serde(default)]
    pub results: Vec<NodeDocument>,
    #[serde(default)]
    pub page_size: usize,
    /// Total number of matches across all pages
    pub result_count: usize,
}

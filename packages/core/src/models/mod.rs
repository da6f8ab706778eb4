//! Data Models
//!
//! This module contains the core data structures used throughout the crate:
//!
//! - `Node` - the in-memory entity for every node type
//! - `NodeDocument` and receipts - wire shapes exchanged with the store
//! - `StoreQuery` - structured query criteria and their OQL rendering

mod document;
mod node;
mod query;

pub use document::{Acl, InsertReceipt, NodeDocument, QueryPage, UpdateReceipt, PUBLIC_READ};
pub use node::{Linkages, Node, NodeError, NodeState};
pub use query::{LinkageFilter, QueryCriteria, StoreQuery};

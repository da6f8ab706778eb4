//! Business Services
//!
//! This module contains the services callers work with:
//!
//! - `NodeService` - Validated save, load and delete of nodes
//! - `QueryService` - Lazily paged search and child traversal
//! - `TypeCache` - Cached node type lookups for linkage validation
//! - `TransferService` - Raw file upload and download via an external tool
//!
//! Services coordinate between the transport layer and the schema, enforcing
//! validation before anything is written.

pub mod error;
pub mod node_service;
pub mod query_service;
pub mod transfer_service;
pub mod type_cache;

pub use error::{NodeServiceError, TransferError};
pub use node_service::NodeService;
pub use query_service::{NodePager, NodeQuery, QueryService};
pub use transfer_service::{
    Checksum, ExpectedFile, ToolReport, TransferReceipt, TransferService, PRIVATE_URL,
};
pub use type_cache::{FreshLookup, TypeCache};

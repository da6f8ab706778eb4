//! iHMP Core - Typed Access Layer for the iHMP Node Store
//!
//! This crate validates, persists and searches the metadata documents of the
//! Integrative Human Microbiome Project store (OSDF), and moves the raw data
//! files those documents describe.
//!
//! # Architecture
//!
//! - **Schema-driven**: every node type is a data record in the
//!   [`schema::SchemaRegistry`], checked by one generic validation engine
//! - **Explicit session**: store access goes through a [`transport::NodeStore`]
//!   passed to each service, never through global state
//! - **Optimistic concurrency**: updates and deletes carry the node version;
//!   a mismatch surfaces as a stale node, never as a silent overwrite
//! - **At-most-once writes**: a write whose outcome is unknown is reported as
//!   such and left to the caller to reconcile
//!
//! # Modules
//!
//! - [`models`] - Node entity and wire documents
//! - [`schema`] - Node type definitions and the built-in catalog
//! - [`validation`] - Attribute, subtype and linkage checks
//! - [`transport`] - Store contract, HTTP session and in-memory store
//! - [`services`] - Persistence, search, type cache and file transfer
//! - [`config`] - Session, retry and transfer configuration
//! - [`logging`] - Tracing subscriber setup

pub mod config;
pub mod logging;
pub mod models;
pub mod schema;
pub mod services;
pub mod transport;
pub mod validation;

// Re-export commonly used types
pub use config::{ConfigError, RetryConfig, SessionConfig, TransferConfig};
pub use models::{Acl, Node, NodeDocument, NodeState};
pub use schema::{NodeType, SchemaRegistry};
pub use services::{
    NodePager, NodeQuery, NodeService, NodeServiceError, QueryService, TransferError,
    TransferService,
};
pub use transport::{HttpSession, MemoryStore, NodeStore, StoreError, TransportError};

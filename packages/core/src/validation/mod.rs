//! Validation Engine
//!
//! Checks a node's attributes, subtype and linkages against its
//! [`NodeType`](crate::schema::NodeType). One generic engine interprets the
//! declarative schema, so adding a node type never adds validation code.
//!
//! # Architecture
//!
//! - **Local checks** (`validate_attributes`, `resolve_subtype`,
//!   `check_linkage_shape`) are pure and never touch the network
//! - **Target resolution** (`resolve_linkage_targets`) looks up linked
//!   nodes through a [`TypeResolver`]
//! - Every check returns the full list of problems found

mod attributes;
mod linkage;
mod subtype;
mod violation;

pub use attributes::validate_attributes;
pub use linkage::{
    check_linkage_shape, resolve_linkage_targets, validate_linkages, LinkageError, TypeResolver,
};
pub use subtype::resolve_subtype;
pub use violation::{
    LinkageViolation, LinkageViolationKind, ValidationReport, Violation, ViolationKind,
};

pub(crate) use violation::join_messages;

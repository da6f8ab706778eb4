//! Node Type Schemas
//!
//! This module defines the declarative description of every node type the
//! store accepts. Each type is a data record rather than its own Rust type:
//! attribute specs, linkage specs and a subtype rule are interpreted by the
//! generic validation engine in [`crate::validation`].
//!
//! ## Building Blocks
//!
//! - [`AttributeSpec`] - one named attribute: presence, value kind, constraints
//! - [`LinkageSpec`] - one named linkage and the node types it may point at
//! - [`SubtypeRule`] - how a node's `subtype` is determined
//! - [`NodeType`] - the full schema for one type
//! - [`SchemaRegistry`] - read-only catalog of node types
//!
//! ## Example
//!
//! ```rust
//! use ihmp_core::schema::{AttributeSpec, LinkageSpec, NodeType, SubtypeRule, ValueKind};
//!
//! let visit = NodeType::new("visit", "A clinical visit")
//!     .attribute(AttributeSpec::required("visit_id", ValueKind::String))
//!     .attribute(AttributeSpec::required("interval", ValueKind::Integer).non_negative())
//!     .linkage(LinkageSpec::required("by", &["subject"]))
//!     .subtype(SubtypeRule::None);
//!
//! assert_eq!(visit.required_fields(), vec!["visit_id", "interval"]);
//! ```

pub mod catalog;
mod registry;

pub use registry::{InboundLinkage, SchemaError, SchemaRegistry};

use regex::Regex;
use std::fmt;

/// The JSON shape an attribute value must have
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    String,
    Integer,
    Number,
    Boolean,
    /// Calendar date encoded as a `YYYY-MM-DD` string
    Date,
    StringList,
    Object,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::String => "string",
            ValueKind::Integer => "integer",
            ValueKind::Number => "number",
            ValueKind::Boolean => "boolean",
            ValueKind::Date => "date (YYYY-MM-DD)",
            ValueKind::StringList => "list of strings",
            ValueKind::Object => "object",
        };
        f.write_str(name)
    }
}

/// Whether an attribute must be present before a save
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Required,
    Optional,
}

/// A value constraint checked after the value kind matches
#[derive(Debug, Clone)]
pub enum Constraint {
    /// Minimum string length in characters
    MinLength(usize),

    /// Maximum string length in characters
    MaxLength(usize),

    /// Inclusive numeric bounds
    Range { min: Option<f64>, max: Option<f64> },

    /// Controlled vocabulary; applies to strings and to every list item
    OneOf(Vec<String>),

    /// Dates must be today or earlier
    NotInFuture,

    /// Strings must match the expression
    Pattern(Regex),

    /// Objects must contain every listed key
    RequiredKeys(Vec<String>),
}

/// Definition of a single attribute in a node type
#[derive(Debug, Clone)]
pub struct AttributeSpec {
    pub name: String,
    pub presence: Presence,
    pub kind: ValueKind,
    pub constraints: Vec<Constraint>,
    pub description: Option<String>,
}

impl AttributeSpec {
    pub fn required(name: &str, kind: ValueKind) -> Self {
        Self::with_presence(name, kind, Presence::Required)
    }

    pub fn optional(name: &str, kind: ValueKind) -> Self {
        Self::with_presence(name, kind, Presence::Optional)
    }

    fn with_presence(name: &str, kind: ValueKind, presence: Presence) -> Self {
        Self {
            name: name.to_string(),
            presence,
            kind,
            constraints: Vec::new(),
            description: None,
        }
    }

    pub fn is_required(&self) -> bool {
        self.presence == Presence::Required
    }

    pub fn constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn min_len(self, min: usize) -> Self {
        self.constraint(Constraint::MinLength(min))
    }

    pub fn max_len(self, max: usize) -> Self {
        self.constraint(Constraint::MaxLength(max))
    }

    pub fn range(self, min: Option<f64>, max: Option<f64>) -> Self {
        self.constraint(Constraint::Range { min, max })
    }

    pub fn non_negative(self) -> Self {
        self.range(Some(0.0), None)
    }

    pub fn one_of(self, values: &[&str]) -> Self {
        self.constraint(Constraint::OneOf(
            values.iter().map(|v| v.to_string()).collect(),
        ))
    }

    pub fn not_in_future(self) -> Self {
        self.constraint(Constraint::NotInFuture)
    }

    pub fn matching(self, pattern: Regex) -> Self {
        self.constraint(Constraint::Pattern(pattern))
    }

    pub fn with_keys(self, keys: &[&str]) -> Self {
        self.constraint(Constraint::RequiredKeys(
            keys.iter().map(|k| k.to_string()).collect(),
        ))
    }

    pub fn describe(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }
}

/// Definition of a named linkage and its permitted target types
#[derive(Debug, Clone)]
pub struct LinkageSpec {
    pub name: String,
    pub targets: Vec<String>,
    pub required: bool,
}

impl LinkageSpec {
    pub fn required(name: &str, targets: &[&str]) -> Self {
        Self::new(name, targets, true)
    }

    pub fn optional(name: &str, targets: &[&str]) -> Self {
        Self::new(name, targets, false)
    }

    fn new(name: &str, targets: &[&str], required: bool) -> Self {
        Self {
            name: name.to_string(),
            targets: targets.iter().map(|t| t.to_string()).collect(),
            required,
        }
    }

    pub fn permits(&self, target_type: &str) -> bool {
        self.targets.iter().any(|t| t == target_type)
    }
}

/// How the `subtype` of a node is determined
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubtypeRule {
    /// The type has no subtype
    None,

    /// Every node of the type carries the same subtype
    Fixed(String),

    /// The caller must choose a subtype from the vocabulary
    Controlled { vocabulary: Vec<String> },

    /// The subtype is copied from another attribute of the node
    Inferred { attribute: String },
}

impl SubtypeRule {
    pub fn fixed(value: &str) -> Self {
        SubtypeRule::Fixed(value.to_string())
    }

    pub fn controlled(vocabulary: &[&str]) -> Self {
        SubtypeRule::Controlled {
            vocabulary: vocabulary.iter().map(|v| v.to_string()).collect(),
        }
    }

    pub fn inferred(attribute: &str) -> Self {
        SubtypeRule::Inferred {
            attribute: attribute.to_string(),
        }
    }
}

/// Complete schema for one node type
#[derive(Debug, Clone)]
pub struct NodeType {
    pub name: String,
    pub description: String,
    pub subtype: SubtypeRule,
    pub attributes: Vec<AttributeSpec>,
    pub linkages: Vec<LinkageSpec>,

    /// At least one of these linkages must be present and non-empty
    pub required_any_linkage: Vec<String>,

    /// Nodes of this type may carry a private sub-document
    pub private_data: bool,

    /// Nodes of this type document a raw data file
    pub raw_file: bool,
}

impl NodeType {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            subtype: SubtypeRule::None,
            attributes: Vec::new(),
            linkages: Vec::new(),
            required_any_linkage: Vec::new(),
            private_data: false,
            raw_file: false,
        }
    }

    pub fn attribute(mut self, spec: AttributeSpec) -> Self {
        self.attributes.push(spec);
        self
    }

    pub fn attributes(mut self, specs: impl IntoIterator<Item = AttributeSpec>) -> Self {
        self.attributes.extend(specs);
        self
    }

    pub fn linkage(mut self, spec: LinkageSpec) -> Self {
        self.linkages.push(spec);
        self
    }

    pub fn require_any_linkage(mut self, names: &[&str]) -> Self {
        self.required_any_linkage = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn subtype(mut self, rule: SubtypeRule) -> Self {
        self.subtype = rule;
        self
    }

    pub fn with_private_data(mut self) -> Self {
        self.private_data = true;
        self
    }

    pub fn with_raw_file(mut self) -> Self {
        self.raw_file = true;
        self
    }

    pub fn get_attribute(&self, name: &str) -> Option<&AttributeSpec> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn get_linkage(&self, name: &str) -> Option<&LinkageSpec> {
        self.linkages.iter().find(|l| l.name == name)
    }

    /// Names of the attributes that must be set before a save
    pub fn required_fields(&self) -> Vec<&str> {
        self.attributes
            .iter()
            .filter(|a| a.is_required())
            .map(|a| a.name.as_str())
            .collect()
    }

    /// Names of the linkages that must be non-empty before a save
    pub fn required_linkages(&self) -> Vec<&str> {
        self.linkages
            .iter()
            .filter(|l| l.required)
            .map(|l| l.name.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_type() -> NodeType {
        NodeType::new("sample", "Test sample")
            .attribute(AttributeSpec::required("fma_body_site", ValueKind::String))
            .attribute(AttributeSpec::optional("body_site", ValueKind::String))
            .attribute(AttributeSpec::required("tags", ValueKind::StringList))
            .linkage(LinkageSpec::required("collected_during", &["visit"]))
            .linkage(LinkageSpec::optional("derived_from", &["sample"]))
    }

    #[test]
    fn test_required_fields_preserve_declaration_order() {
        let node_type = sample_type();
        assert_eq!(node_type.required_fields(), vec!["fma_body_site", "tags"]);
        assert_eq!(node_type.required_linkages(), vec!["collected_during"]);
    }

    #[test]
    fn test_linkage_permits_only_declared_targets() {
        let node_type = sample_type();
        let linkage = node_type.get_linkage("collected_during").unwrap();

        assert!(linkage.permits("visit"));
        assert!(!linkage.permits("subject"));
        assert!(node_type.get_linkage("sequenced_from").is_none());
    }

    #[test]
    fn test_builder_accumulates_constraints() {
        let spec = AttributeSpec::required("contact", ValueKind::String)
            .min_len(3)
            .max_len(128)
            .describe("Primary contact");

        assert_eq!(spec.constraints.len(), 2);
        assert_eq!(spec.description.as_deref(), Some("Primary contact"));
        assert!(spec.is_required());
    }

    #[test]
    fn test_value_kind_display() {
        assert_eq!(ValueKind::StringList.to_string(), "list of strings");
        assert_eq!(ValueKind::Date.to_string(), "date (YYYY-MM-DD)");
    }
}

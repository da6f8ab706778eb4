//! Schema Registry
//!
//! Read-only catalog of node types, built once at startup and shared
//! behind an `Arc`. Construction checks the catalog for internal
//! consistency so that validation can treat every lookup result as sound.
//!
//! # Architecture
//!
//! Besides the `name → NodeType` table, the registry keeps an inbound index
//! of `target_type → Vec<InboundLinkage>`. It answers "which linkages point
//! at this type" without scanning every schema, which is what child
//! discovery in the query layer needs.

use super::{catalog, NodeType, SubtypeRule};
use std::collections::HashMap;
use thiserror::Error;

/// A linkage declared on `source_type` that may point at a given type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundLinkage {
    pub source_type: String,
    pub linkage: String,
}

/// Errors raised while assembling a registry
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    #[error("Node type '{0}' is declared more than once")]
    DuplicateType(String),

    #[error("Node type '{node_type}' declares attribute '{attribute}' more than once")]
    DuplicateAttribute { node_type: String, attribute: String },

    #[error("Linkage '{linkage}' on '{node_type}' targets unknown type '{target}'")]
    UnknownLinkageTarget {
        node_type: String,
        linkage: String,
        target: String,
    },

    #[error("Node type '{node_type}' references undeclared {what} '{name}'")]
    UndeclaredReference {
        node_type: String,
        what: &'static str,
        name: String,
    },

    #[error("Invalid pattern in catalog: {0}")]
    Pattern(#[from] regex::Error),
}

impl SchemaError {
    pub fn unknown_type(name: impl Into<String>) -> Self {
        Self::UnknownNodeType(name.into())
    }
}

/// Catalog of node types keyed by name
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    types: HashMap<String, NodeType>,
    inbound: HashMap<String, Vec<InboundLinkage>>,
}

impl SchemaRegistry {
    /// Registry holding the built-in iHMP catalog
    pub fn builtin() -> Result<Self, SchemaError> {
        Self::from_types(catalog::builtin_types()?)
    }

    /// Build a registry from an explicit list of node types
    ///
    /// Fails if a type name repeats, an attribute name repeats within a type,
    /// or a linkage, `one_of` group or inferred subtype refers to something
    /// that is not declared.
    pub fn from_types(node_types: Vec<NodeType>) -> Result<Self, SchemaError> {
        let mut types = HashMap::with_capacity(node_types.len());
        for node_type in node_types {
            let name = node_type.name.clone();
            if types.insert(name.clone(), node_type).is_some() {
                return Err(SchemaError::DuplicateType(name));
            }
        }

        let mut inbound: HashMap<String, Vec<InboundLinkage>> = HashMap::new();
        for node_type in types.values() {
            check_type(node_type, &types)?;

            for linkage in &node_type.linkages {
                for target in &linkage.targets {
                    inbound
                        .entry(target.clone())
                        .or_default()
                        .push(InboundLinkage {
                            source_type: node_type.name.clone(),
                            linkage: linkage.name.clone(),
                        });
                }
            }
        }

        for entries in inbound.values_mut() {
            entries.sort_by(|a, b| {
                (a.source_type.as_str(), a.linkage.as_str())
                    .cmp(&(b.source_type.as_str(), b.linkage.as_str()))
            });
        }

        tracing::debug!(types = types.len(), "Schema registry assembled");

        Ok(Self { types, inbound })
    }

    pub fn get(&self, name: &str) -> Result<&NodeType, SchemaError> {
        self.types
            .get(name)
            .ok_or_else(|| SchemaError::unknown_type(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Sorted names of every registered type
    pub fn type_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.types.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Linkages on other types that may point at `target_type`
    pub fn inbound_linkages(&self, target_type: &str) -> &[InboundLinkage] {
        self.inbound
            .get(target_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

fn check_type(node_type: &NodeType, types: &HashMap<String, NodeType>) -> Result<(), SchemaError> {
    let mut seen = std::collections::HashSet::new();
    for attribute in &node_type.attributes {
        if !seen.insert(attribute.name.as_str()) {
            return Err(SchemaError::DuplicateAttribute {
                node_type: node_type.name.clone(),
                attribute: attribute.name.clone(),
            });
        }
    }

    for linkage in &node_type.linkages {
        if let Some(target) = linkage.targets.iter().find(|t| !types.contains_key(*t)) {
            return Err(SchemaError::UnknownLinkageTarget {
                node_type: node_type.name.clone(),
                linkage: linkage.name.clone(),
                target: target.clone(),
            });
        }
    }

    if let Some(name) = node_type
        .required_any_linkage
        .iter()
        .find(|name| node_type.get_linkage(name).is_none())
    {
        return Err(SchemaError::UndeclaredReference {
            node_type: node_type.name.clone(),
            what: "linkage",
            name: name.clone(),
        });
    }

    if let SubtypeRule::Inferred { attribute } = &node_type.subtype {
        if node_type.get_attribute(attribute).is_none() {
            return Err(SchemaError::UndeclaredReference {
                node_type: node_type.name.clone(),
                what: "attribute",
                name: attribute.clone(),
            });
        }
    }

    Ok(())
}

//! Linkage validation
//!
//! Two stages: a local shape check that needs nothing but the schema, and a
//! resolution stage that looks up the type of every target through a
//! [`TypeResolver`]. A target that does not exist is a violation, never a
//! transport error.

use super::{LinkageViolation, LinkageViolationKind};
use crate::models::Linkages;
use crate::schema::NodeType;
use crate::transport::TransportError;
use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

/// Looks up the node type of an existing node by id
#[async_trait]
pub trait TypeResolver: Send + Sync {
    /// `Ok(None)` when no node has this id
    async fn resolve_type(&self, id: &str) -> Result<Option<String>, TransportError>;
}

/// Fixed id → type table
#[async_trait]
impl TypeResolver for HashMap<String, String> {
    async fn resolve_type(&self, id: &str) -> Result<Option<String>, TransportError> {
        Ok(self.get(id).cloned())
    }
}

/// Failure of the full linkage check
#[derive(Error, Debug)]
pub enum LinkageError {
    #[error("{} linkage violation(s)", .0.len())]
    Violations(Vec<LinkageViolation>),

    #[error("Failed to resolve linkage targets: {0}")]
    Resolution(#[from] TransportError),
}

/// Check linkage names and presence without consulting the store
pub fn check_linkage_shape(node_type: &NodeType, linkages: &Linkages) -> Vec<LinkageViolation> {
    let mut violations = Vec::new();

    for spec in node_type.linkages.iter().filter(|l| l.required) {
        match linkages.get(&spec.name) {
            None => violations.push(LinkageViolation::new(
                &spec.name,
                LinkageViolationKind::Missing,
            )),
            Some(targets) if targets.is_empty() => violations.push(LinkageViolation::new(
                &spec.name,
                LinkageViolationKind::Empty,
            )),
            Some(_) => {}
        }
    }

    for name in linkages.keys() {
        if node_type.get_linkage(name).is_none() {
            violations.push(LinkageViolation::new(
                name.as_str(),
                LinkageViolationKind::NotPermitted,
            ));
        }
    }

    let alternatives = &node_type.required_any_linkage;
    if !alternatives.is_empty() {
        let satisfied = alternatives.iter().any(|name| {
            linkages
                .get(name)
                .map(|targets| !targets.is_empty())
                .unwrap_or(false)
        });
        if !satisfied {
            violations.push(LinkageViolation::new(
                alternatives.join("|"),
                LinkageViolationKind::MissingAlternative {
                    options: alternatives.clone(),
                },
            ));
        }
    }

    violations
}

/// Resolve every target of every declared linkage and check its type
///
/// Each distinct id is resolved once per call. Undeclared linkages are
/// skipped; the shape check reports them.
pub async fn resolve_linkage_targets(
    node_type: &NodeType,
    linkages: &Linkages,
    resolver: &dyn TypeResolver,
) -> Result<Vec<LinkageViolation>, TransportError> {
    let mut resolved: HashMap<&str, Option<String>> = HashMap::new();
    let mut violations = Vec::new();

    for (name, targets) in linkages {
        let Some(spec) = node_type.get_linkage(name) else {
            continue;
        };

        for target in targets {
            if !resolved.contains_key(target.as_str()) {
                let target_type = resolver.resolve_type(target).await?;
                resolved.insert(target.as_str(), target_type);
            }

            match resolved.get(target.as_str()).and_then(Option::as_ref) {
                None => violations.push(LinkageViolation::for_target(
                    name.as_str(),
                    target.as_str(),
                    LinkageViolationKind::TargetNotFound,
                )),
                Some(actual) if !spec.permits(actual) => {
                    violations.push(LinkageViolation::for_target(
                        name.as_str(),
                        target.as_str(),
                        LinkageViolationKind::WrongTargetType {
                            actual: actual.clone(),
                            allowed: spec.targets.clone(),
                        },
                    ))
                }
                Some(_) => {}
            }
        }
    }

    if !violations.is_empty() {
        tracing::debug!(
            node_type = %node_type.name,
            count = violations.len(),
            "Linkage targets failed resolution"
        );
    }

    Ok(violations)
}

/// Shape check followed by target resolution
///
/// Resolution only runs when the shape is sound.
pub async fn validate_linkages(
    node_type: &NodeType,
    linkages: &Linkages,
    resolver: &dyn TypeResolver,
) -> Result<(), LinkageError> {
    let shape = check_linkage_shape(node_type, linkages);
    if !shape.is_empty() {
        return Err(LinkageError::Violations(shape));
    }

    let violations = resolve_linkage_targets(node_type, linkages, resolver).await?;
    if violations.is_empty() {
        Ok(())
    } else {
        Err(LinkageError::Violations(violations))
    }
}

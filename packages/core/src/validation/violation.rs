//! Violation Types
//!
//! Every rule failure found while checking a node. Validation always
//! collects the complete list rather than stopping at the first problem.

use crate::schema::ValueKind;
use std::fmt;

/// What was wrong with one attribute (or the subtype)
#[derive(Debug, Clone, PartialEq)]
pub enum ViolationKind {
    Missing,
    UnknownAttribute,
    WrongKind { expected: ValueKind },
    TooShort { min: usize, actual: usize },
    TooLong { max: usize, actual: usize },
    OutOfRange { min: Option<f64>, max: Option<f64>, actual: f64 },
    NotInVocabulary { value: String, allowed: Vec<String> },
    InvalidDate { value: String },
    FutureDate { value: String },
    PatternMismatch { pattern: String, value: String },
    MissingKey { key: String },
    SubtypeChanged { from: String, to: Option<String> },
    PrivateDataNotAllowed,
}

/// A single attribute rule failure
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    pub field: String,
    pub kind: ViolationKind,
}

impl Violation {
    pub fn new(field: impl Into<String>, kind: ViolationKind) -> Self {
        Self {
            field: field.into(),
            kind,
        }
    }

    pub fn missing(field: impl Into<String>) -> Self {
        Self::new(field, ViolationKind::Missing)
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let field = &self.field;
        match &self.kind {
            ViolationKind::Missing => write!(f, "'{field}' is required"),
            ViolationKind::UnknownAttribute => write!(f, "'{field}' is not a known attribute"),
            ViolationKind::WrongKind { expected } => {
                write!(f, "'{field}' must be a {expected}")
            }
            ViolationKind::TooShort { min, actual } => {
                write!(f, "'{field}' must be at least {min} characters (got {actual})")
            }
            ViolationKind::TooLong { max, actual } => {
                write!(f, "'{field}' must be at most {max} characters (got {actual})")
            }
            ViolationKind::OutOfRange { min, max, actual } => {
                write!(f, "'{field}' value {actual} is out of range")?;
                if let Some(min) = min {
                    write!(f, " (min {min})")?;
                }
                if let Some(max) = max {
                    write!(f, " (max {max})")?;
                }
                Ok(())
            }
            ViolationKind::NotInVocabulary { value, allowed } => {
                write!(f, "'{field}' value '{value}' is not one of: {}", allowed.join(", "))
            }
            ViolationKind::InvalidDate { value } => {
                write!(f, "'{field}' value '{value}' is not a YYYY-MM-DD date")
            }
            ViolationKind::FutureDate { value } => {
                write!(f, "'{field}' date {value} is in the future")
            }
            ViolationKind::PatternMismatch { pattern, value } => {
                write!(f, "'{field}' value '{value}' does not match {pattern}")
            }
            ViolationKind::MissingKey { key } => write!(f, "'{field}' must contain '{key}'"),
            ViolationKind::SubtypeChanged { from, to } => match to {
                Some(to) => write!(f, "subtype cannot change from '{from}' to '{to}'"),
                None => write!(f, "subtype '{from}' cannot be cleared"),
            },
            ViolationKind::PrivateDataNotAllowed => {
                write!(f, "'{field}' is not permitted on this node type")
            }
        }
    }
}

/// What was wrong with one linkage
#[derive(Debug, Clone, PartialEq)]
pub enum LinkageViolationKind {
    /// A required linkage is absent
    Missing,
    /// A linkage is present but has no targets
    Empty,
    /// The node type does not declare this linkage
    NotPermitted,
    /// None of the alternative linkages is present
    MissingAlternative { options: Vec<String> },
    /// The target exists but has a type the linkage does not accept
    WrongTargetType { actual: String, allowed: Vec<String> },
    /// The target id does not resolve to a node
    TargetNotFound,
}

/// A single linkage rule failure
#[derive(Debug, Clone, PartialEq)]
pub struct LinkageViolation {
    pub linkage: String,
    pub target_id: Option<String>,
    pub kind: LinkageViolationKind,
}

impl LinkageViolation {
    pub fn new(linkage: impl Into<String>, kind: LinkageViolationKind) -> Self {
        Self {
            linkage: linkage.into(),
            target_id: None,
            kind,
        }
    }

    pub fn for_target(
        linkage: impl Into<String>,
        target_id: impl Into<String>,
        kind: LinkageViolationKind,
    ) -> Self {
        Self {
            linkage: linkage.into(),
            target_id: Some(target_id.into()),
            kind,
        }
    }
}

impl fmt::Display for LinkageViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let linkage = &self.linkage;
        let target = self.target_id.as_deref().unwrap_or("?");
        match &self.kind {
            LinkageViolationKind::Missing => write!(f, "linkage '{linkage}' is required"),
            LinkageViolationKind::Empty => write!(f, "linkage '{linkage}' has no targets"),
            LinkageViolationKind::NotPermitted => {
                write!(f, "linkage '{linkage}' is not permitted on this node type")
            }
            LinkageViolationKind::MissingAlternative { options } => {
                write!(f, "one of the linkages {} is required", options.join(", "))
            }
            LinkageViolationKind::WrongTargetType { actual, allowed } => write!(
                f,
                "linkage '{linkage}' target {target} is a '{actual}', expected one of: {}",
                allowed.join(", ")
            ),
            LinkageViolationKind::TargetNotFound => {
                write!(f, "linkage '{linkage}' target {target} does not exist")
            }
        }
    }
}

/// Full result of checking a node without saving it
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub attributes: Vec<Violation>,
    pub linkages: Vec<LinkageViolation>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.attributes.is_empty() && self.linkages.is_empty()
    }

    /// Human-readable messages for every problem found
    pub fn messages(&self) -> Vec<String> {
        self.attributes
            .iter()
            .map(ToString::to_string)
            .chain(self.linkages.iter().map(ToString::to_string))
            .collect()
    }
}

pub(crate) fn join_messages<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

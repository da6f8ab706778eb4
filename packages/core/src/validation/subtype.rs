//! Subtype resolution

use super::{Violation, ViolationKind};
use crate::schema::{NodeType, SubtypeRule};
use serde_json::{Map, Value};

const FIELD: &str = "subtype";

/// Determine the subtype a node will be saved with
///
/// `requested` is the caller's choice (only meaningful for controlled
/// vocabularies). `saved` is the subtype recorded by the last save; once a
/// node has one, any resolution that differs is a violation.
pub fn resolve_subtype(
    node_type: &NodeType,
    attributes: &Map<String, Value>,
    requested: Option<&str>,
    saved: Option<&str>,
) -> Result<Option<String>, Violation> {
    let resolved = match &node_type.subtype {
        // A stray stored subtype on an untyped node is ignored, not pinned
        SubtypeRule::None => return Ok(None),
        SubtypeRule::Fixed(value) => {
            if let Some(requested) = requested.filter(|r| *r != value.as_str()) {
                return Err(not_in(requested, std::slice::from_ref(value)));
            }
            Some(value.clone())
        }
        SubtypeRule::Controlled { vocabulary } => {
            let requested = requested.ok_or_else(|| Violation::missing(FIELD))?;
            if !vocabulary.iter().any(|v| v == requested) {
                return Err(not_in(requested, vocabulary));
            }
            Some(requested.to_string())
        }
        SubtypeRule::Inferred { attribute } => attributes
            .get(attribute)
            .and_then(Value::as_str)
            .map(str::to_string),
    };

    match saved {
        Some(from) if resolved.as_deref() != Some(from) => Err(Violation::new(
            FIELD,
            ViolationKind::SubtypeChanged {
                from: from.to_string(),
                to: resolved,
            },
        )),
        _ => Ok(resolved),
    }
}

fn not_in(value: &str, allowed: &[String]) -> Violation {
    Violation::new(
        FIELD,
        ViolationKind::NotInVocabulary {
            value: value.to_string(),
            allowed: allowed.to_vec(),
        },
    )
}

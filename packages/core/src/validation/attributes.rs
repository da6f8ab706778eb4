//! Attribute checks against a node type's attribute specs

use super::{Violation, ViolationKind};
use crate::schema::{AttributeSpec, Constraint, NodeType, ValueKind};
use chrono::{NaiveDate, Utc};
use serde_json::{Map, Value};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Check every attribute of a node against its type
///
/// Returns the complete list of violations. Null values count as absent;
/// attributes the type does not declare are rejected.
pub fn validate_attributes(
    node_type: &NodeType,
    attributes: &Map<String, Value>,
) -> Result<(), Vec<Violation>> {
    let mut violations = Vec::new();

    for spec in &node_type.attributes {
        match attributes.get(&spec.name) {
            None | Some(Value::Null) => {
                if spec.is_required() {
                    violations.push(Violation::missing(&spec.name));
                }
            }
            Some(value) => check_value(spec, value, &mut violations),
        }
    }

    let mut unknown: Vec<&String> = attributes
        .keys()
        .filter(|name| node_type.get_attribute(name).is_none())
        .collect();
    unknown.sort();
    violations.extend(
        unknown
            .into_iter()
            .map(|name| Violation::new(name.as_str(), ViolationKind::UnknownAttribute)),
    );

    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}

fn check_value(spec: &AttributeSpec, value: &Value, violations: &mut Vec<Violation>) {
    let field = spec.name.as_str();
    let wrong_kind = || Violation::new(field, ViolationKind::WrongKind { expected: spec.kind });

    let kind_ok = match spec.kind {
        ValueKind::String | ValueKind::Date => value.is_string(),
        ValueKind::Integer => value.is_i64() || value.is_u64(),
        ValueKind::Number => value.is_number(),
        ValueKind::Boolean => value.is_boolean(),
        ValueKind::StringList => value
            .as_array()
            .map(|items| items.iter().all(Value::is_string))
            .unwrap_or(false),
        ValueKind::Object => value.is_object(),
    };
    if !kind_ok {
        violations.push(wrong_kind());
        return;
    }

    let date = if spec.kind == ValueKind::Date {
        let text = value.as_str().unwrap_or_default();
        match NaiveDate::parse_from_str(text, DATE_FORMAT) {
            Ok(date) => Some(date),
            Err(_) => {
                violations.push(Violation::new(
                    field,
                    ViolationKind::InvalidDate {
                        value: text.to_string(),
                    },
                ));
                return;
            }
        }
    } else {
        None
    };

    for constraint in &spec.constraints {
        if let Some(kind) = check_constraint(constraint, value, date) {
            violations.push(Violation::new(field, kind));
        }
    }
}

fn check_constraint(
    constraint: &Constraint,
    value: &Value,
    date: Option<NaiveDate>,
) -> Option<ViolationKind> {
    match constraint {
        Constraint::MinLength(min) => {
            let actual = value.as_str()?.chars().count();
            (actual < *min).then_some(ViolationKind::TooShort { min: *min, actual })
        }
        Constraint::MaxLength(max) => {
            let actual = value.as_str()?.chars().count();
            (actual > *max).then_some(ViolationKind::TooLong { max: *max, actual })
        }
        Constraint::Range { min, max } => {
            let actual = value.as_f64()?;
            let below = min.map(|m| actual < m).unwrap_or(false);
            let above = max.map(|m| actual > m).unwrap_or(false);
            (below || above).then_some(ViolationKind::OutOfRange {
                min: *min,
                max: *max,
                actual,
            })
        }
        Constraint::OneOf(allowed) => {
            let outside = |s: &str| !allowed.iter().any(|a| a == s);
            let offending = match value {
                Value::String(s) => outside(s.as_str()).then(|| s.clone()),
                Value::Array(items) => items
                    .iter()
                    .filter_map(Value::as_str)
                    .find(|s| outside(*s))
                    .map(str::to_string),
                _ => None,
            }?;
            Some(ViolationKind::NotInVocabulary {
                value: offending,
                allowed: allowed.clone(),
            })
        }
        Constraint::NotInFuture => {
            let date = date?;
            (date > Utc::now().date_naive()).then(|| ViolationKind::FutureDate {
                value: date.format(DATE_FORMAT).to_string(),
            })
        }
        Constraint::Pattern(regex) => {
            let text = value.as_str()?;
            (!regex.is_match(text)).then(|| ViolationKind::PatternMismatch {
                pattern: regex.as_str().to_string(),
                value: text.to_string(),
            })
        }
        Constraint::RequiredKeys(keys) => {
            let object = value.as_object()?;
            keys.iter()
                .find(|key| !object.contains_key(key.as_str()))
                .map(|key| ViolationKind::MissingKey { key: key.clone() })
        }
    }
}

//! Store Queries
//!
//! Structured criteria sent to the store alongside their rendering in the
//! store's textual query language (OQL). Terms take the form
//! `"<value>"[<field path>]` and are combined with `&&` and `||`.

use super::NodeDocument;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Match nodes that link to `target` through `linkage`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkageFilter {
    pub linkage: String,
    pub target: String,
}

impl LinkageFilter {
    pub fn new(linkage: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            linkage: linkage.into(),
            target: target.into(),
        }
    }

    fn to_oql(&self) -> String {
        format!("{}[linkage.{}]", quote(&self.target), self.linkage)
    }

    fn matches(&self, doc: &NodeDocument) -> bool {
        doc.linked_ids(&self.linkage).contains(&self.target)
    }
}

/// Conjunction of structured match conditions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryCriteria {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_type: Option<String>,

    /// Attribute equality; a scalar also matches a list containing it
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Value>,

    /// Every filter must match
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub linked_to: Vec<LinkageFilter>,

    /// At least one filter must match, when any are given
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub linked_to_any: Vec<LinkageFilter>,

    /// Case-insensitive substrings that must appear in some attribute
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub text: Vec<String>,
}

impl QueryCriteria {
    pub fn is_empty(&self) -> bool {
        self.node_type.is_none()
            && self.attributes.is_empty()
            && self.linked_to.is_empty()
            && self.linked_to_any.is_empty()
            && self.text.is_empty()
    }

    /// Evaluate the criteria against a stored document
    pub fn matches(&self, doc: &NodeDocument) -> bool {
        if let Some(node_type) = &self.node_type {
            if &doc.node_type != node_type {
                return false;
            }
        }

        let attributes_match = self.attributes.iter().all(|(name, expected)| {
            match doc.meta.get(name) {
                Some(Value::Array(items)) if !expected.is_array() => items.contains(expected),
                Some(actual) => actual == expected,
                None => false,
            }
        });
        if !attributes_match {
            return false;
        }

        if !self.linked_to.iter().all(|f| f.matches(doc)) {
            return false;
        }

        if !self.linked_to_any.is_empty() && !self.linked_to_any.iter().any(|f| f.matches(doc)) {
            return false;
        }

        self.text.iter().all(|term| {
            let needle = term.to_lowercase();
            doc.meta.values().any(|value| contains_text(value, &needle))
        })
    }
}

fn contains_text(value: &Value, needle: &str) -> bool {
    match value {
        Value::String(s) => s.to_lowercase().contains(needle),
        Value::Array(items) => items.iter().any(|item| contains_text(item, needle)),
        _ => false,
    }
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// A namespaced query as dispatched to the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreQuery {
    pub ns: String,

    #[serde(default)]
    pub criteria: QueryCriteria,

    /// Caller-supplied OQL, combined with the criteria by conjunction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

impl StoreQuery {
    pub fn new(ns: impl Into<String>, criteria: QueryCriteria) -> Self {
        Self {
            ns: ns.into(),
            criteria,
            raw: None,
        }
    }

    /// Render the query as OQL text
    ///
    /// A query without any condition matches the whole namespace.
    pub fn to_oql(&self) -> String {
        let criteria = &self.criteria;
        let mut terms = Vec::new();

        if let Some(raw) = &self.raw {
            terms.push(format!("({})", raw));
        }
        if let Some(node_type) = &criteria.node_type {
            terms.push(format!("{}[node_type]", quote(node_type)));
        }
        for (name, value) in &criteria.attributes {
            let term = match value {
                Value::String(s) => format!("{}[meta.{}]", quote(s), name),
                other => format!("[meta.{}] == {}", name, other),
            };
            terms.push(term);
        }
        for filter in &criteria.linked_to {
            terms.push(filter.to_oql());
        }
        match criteria.linked_to_any.len() {
            0 => {}
            1 => terms.push(criteria.linked_to_any[0].to_oql()),
            _ => {
                let alternatives: Vec<String> =
                    criteria.linked_to_any.iter().map(LinkageFilter::to_oql).collect();
                terms.push(format!("({})", alternatives.join(" || ")));
            }
        }
        for text in &criteria.text {
            terms.push(format!("{}[meta]", quote(text)));
        }

        if terms.is_empty() {
            return format!("{}[ns]", quote(&self.ns));
        }
        terms.join(" && ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Acl;
    use serde_json::{json, Map};

    fn doc(node_type: &str, meta: Value, linkages: &[(&str, &str)]) -> NodeDocument {
        let mut links: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, target) in linkages {
            links
                .entry(name.to_string())
                .or_default()
                .push(target.to_string());
        }
        NodeDocument {
            id: Some("n1".to_string()),
            ver: Some(1),
            ns: "ihmp".to_string(),
            node_type: node_type.to_string(),
            meta: meta.as_object().cloned().unwrap_or_else(Map::new),
            linkages: links,
            acl: Acl::for_namespace("ihmp"),
            private: None,
            created: None,
            modified: None,
        }
    }

    #[test]
    fn test_raw_query_is_wrapped_before_type_term() {
        let query = StoreQuery {
            ns: "ihmp".to_string(),
            criteria: QueryCriteria {
                node_type: Some("sample".to_string()),
                ..Default::default()
            },
            raw: Some("\"stool\"[meta.body_site]".to_string()),
        };

        assert_eq!(
            query.to_oql(),
            "(\"stool\"[meta.body_site]) && \"sample\"[node_type]"
        );
    }

    #[test]
    fn test_renders_attribute_linkage_and_text_terms() {
        let mut criteria = QueryCriteria {
            node_type: Some("visit".to_string()),
            ..Default::default()
        };
        criteria
            .attributes
            .insert("visit_number".to_string(), json!(2));
        criteria.linked_to.push(LinkageFilter::new("by", "s1"));
        criteria.text.push("clinic".to_string());

        let oql = StoreQuery::new("ihmp", criteria).to_oql();
        assert_eq!(
            oql,
            "\"visit\"[node_type] && [meta.visit_number] == 2 && \"s1\"[linkage.by] && \"clinic\"[meta]"
        );
    }

    #[test]
    fn test_alternative_linkages_are_grouped() {
        let criteria = QueryCriteria {
            linked_to_any: vec![
                LinkageFilter::new("computed_from", "x"),
                LinkageFilter::new("sequenced_from", "x"),
            ],
            ..Default::default()
        };
        assert_eq!(
            StoreQuery::new("ihmp", criteria).to_oql(),
            "(\"x\"[linkage.computed_from] || \"x\"[linkage.sequenced_from])"
        );
    }

    #[test]
    fn test_empty_query_matches_namespace() {
        let query = StoreQuery::new("ihmp", QueryCriteria::default());
        assert!(query.criteria.is_empty());
        assert_eq!(query.to_oql(), "\"ihmp\"[ns]");
    }

    #[test]
    fn test_quotes_are_escaped() {
        let criteria = QueryCriteria {
            text: vec!["say \"hi\"".to_string()],
            ..Default::default()
        };
        assert_eq!(
            StoreQuery::new("ihmp", criteria).to_oql(),
            "\"say \\\"hi\\\"\"[meta]"
        );
    }

    #[test]
    fn test_matches_list_membership_and_linkages() {
        let document = doc(
            "sample",
            json!({"tags": ["stool", "baseline"], "body_site": "Feces"}),
            &[("collected_during", "v1")],
        );

        let mut criteria = QueryCriteria::default();
        criteria.attributes.insert("tags".to_string(), json!("stool"));
        criteria
            .linked_to
            .push(LinkageFilter::new("collected_during", "v1"));
        criteria.text.push("feces".to_string());
        assert!(criteria.matches(&document));

        criteria
            .linked_to_any
            .push(LinkageFilter::new("collected_during", "v2"));
        assert!(!criteria.matches(&document));
    }
}

//! Fluent construction of node queries

use crate::models::{LinkageFilter, QueryCriteria, StoreQuery};
use serde_json::Value;

/// Criteria for finding nodes, independent of namespace
///
/// # Examples
///
/// ```rust
/// use ihmp_core::services::NodeQuery;
///
/// let query = NodeQuery::of_type("sample")
///     .attribute("fma_body_site", "UBERON:feces")
///     .linked_to("collected_during", "visit-1")
///     .text("baseline");
///
/// assert_eq!(
///     query.to_store_query("ihmp").to_oql(),
///     "\"sample\"[node_type] && \"UBERON:feces\"[meta.fma_body_site] \
///      && \"visit-1\"[linkage.collected_during] && \"baseline\"[meta]"
/// );
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeQuery {
    criteria: QueryCriteria,
    raw: Option<String>,
}

impl NodeQuery {
    /// Query matching every node in the namespace
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of_type(node_type: impl Into<String>) -> Self {
        Self::new().node_type(node_type)
    }

    pub fn node_type(mut self, node_type: impl Into<String>) -> Self {
        self.criteria.node_type = Some(node_type.into());
        self
    }

    /// Exact match on an attribute; a scalar also matches list membership
    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.criteria.attributes.insert(name.into(), value.into());
        self
    }

    /// Nodes whose `linkage` includes `target_id`
    pub fn linked_to(mut self, linkage: impl Into<String>, target_id: impl Into<String>) -> Self {
        self.criteria
            .linked_to
            .push(LinkageFilter::new(linkage, target_id));
        self
    }

    /// Nodes linking to `target_id` through any of the given linkages
    pub fn linked_via_any<I, S>(mut self, linkages: I, target_id: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.criteria.linked_to_any.extend(
            linkages
                .into_iter()
                .map(|linkage| LinkageFilter::new(linkage, target_id)),
        );
        self
    }

    pub fn text(mut self, term: impl Into<String>) -> Self {
        self.criteria.text.push(term.into());
        self
    }

    /// Store-native OQL combined with the other criteria
    pub fn raw(mut self, oql: impl Into<String>) -> Self {
        self.raw = Some(oql.into());
        self
    }

    pub fn criteria(&self) -> &QueryCriteria {
        &self.criteria
    }

    pub fn raw_query(&self) -> Option<&str> {
        self.raw.as_deref()
    }

    pub fn to_store_query(&self, namespace: &str) -> StoreQuery {
        StoreQuery {
            ns: namespace.to_string(),
            criteria: self.criteria.clone(),
            raw: self.raw.clone(),
        }
    }
}

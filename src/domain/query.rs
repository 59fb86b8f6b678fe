// Query domain model - queries are immutable, a rewrite creates a new one
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A single structured result row as returned by the run-query endpoint.
pub type ResultRow = serde_json::Map<String, Value>;

/// A stored query as the BI platform returns it. Attributes the service does
/// not interpret are carried verbatim in `extra` so a rewrite preserves them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Query {
    pub id: String,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub view: Option<String>,
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub filters: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub sorts: Vec<String>,
    #[serde(default)]
    pub limit: Option<String>,
    #[serde(default)]
    pub column_limit: Option<String>,
    #[serde(default)]
    pub pivots: Vec<String>,
    #[serde(default)]
    pub total: Option<bool>,
    #[serde(default)]
    pub row_total: Option<String>,
    #[serde(default)]
    pub dynamic_fields: Option<String>,
    #[serde(default)]
    pub filter_expression: Option<String>,
    #[serde(default)]
    pub vis_config: Option<Value>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Body of a create-query call. Never carries the identity fields of a stored
/// query (`id`, `client_id` unless freshly generated, `slug`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view: Option<String>,
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sorts: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_limit: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pivots: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_total: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dynamic_fields: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_expression: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vis_config: Option<Value>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl QueryConfig {
    /// Copy of a stored query without its identity fields.
    pub fn from_query(query: &Query) -> Self {
        Self {
            model: query.model.clone(),
            view: query.view.clone(),
            fields: query.fields.clone(),
            filters: query.filters.clone(),
            sorts: query.sorts.clone(),
            limit: query.limit.clone(),
            column_limit: query.column_limit.clone(),
            pivots: query.pivots.clone(),
            total: query.total,
            row_total: query.row_total.clone(),
            dynamic_fields: query.dynamic_fields.clone(),
            filter_expression: query.filter_expression.clone(),
            client_id: None,
            vis_config: query.vis_config.clone(),
            extra: query.extra.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_query_strips_identity_and_keeps_the_rest() {
        let query: Query = serde_json::from_value(json!({
            "id": "q1",
            "client_id": "abc",
            "slug": "xyz",
            "model": "orders",
            "view": "orders_explore",
            "fields": ["orders.id"],
            "query_timezone": "UTC"
        }))
        .expect("query should deserialize");

        let config = QueryConfig::from_query(&query);
        assert_eq!(config.model.as_deref(), Some("orders"));
        assert_eq!(config.fields, vec!["orders.id".to_string()]);
        assert!(config.client_id.is_none());
        assert_eq!(config.extra.get("query_timezone"), Some(&json!("UTC")));

        let body = serde_json::to_value(&config).expect("config should serialize");
        assert!(body.get("id").is_none());
        assert!(body.get("slug").is_none());
        assert_eq!(body.get("query_timezone"), Some(&json!("UTC")));
    }
}

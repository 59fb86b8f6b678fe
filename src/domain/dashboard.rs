// Dashboard domain models - dashboards, tiles, filters, and listeners
use super::query::Query;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Partial dashboard shape returned by search and list endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DashboardSummary {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub folder_id: Option<String>,
    #[serde(default)]
    pub deleted: bool,
}

/// Full dashboard shape with its elements and filters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dashboard {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub folder_id: Option<String>,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub dashboard_elements: Vec<DashboardElement>,
    #[serde(default)]
    pub dashboard_filters: Vec<DashboardFilter>,
}

/// A tile placed on a dashboard. Its query may be referenced directly or
/// through the result maker; the direct reference wins.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DashboardElement {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub query_id: Option<String>,
    #[serde(default)]
    pub query: Option<Query>,
    #[serde(default)]
    pub result_maker: Option<ResultMaker>,
}

impl DashboardElement {
    pub fn resolved_query_id(&self) -> Option<&str> {
        self.query_id.as_deref().or_else(|| {
            self.result_maker
                .as_ref()
                .and_then(|maker| maker.query_id.as_deref())
        })
    }

    /// Visualization type, read from the embedded query first and the result
    /// maker second.
    pub fn vis_type(&self) -> Option<&str> {
        self.query
            .as_ref()
            .and_then(|query| query.vis_config.as_ref())
            .and_then(|vis| vis.get("type"))
            .and_then(Value::as_str)
            .or_else(|| {
                self.result_maker
                    .as_ref()
                    .and_then(|maker| maker.vis_config.as_ref())
                    .and_then(|vis| vis.get("type"))
                    .and_then(Value::as_str)
            })
    }
}

/// Indirect query descriptor of a tile. Vendor-defined attributes the service
/// does not interpret round-trip through `extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultMaker {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vis_config: Option<Value>,
    #[serde(default)]
    pub filterables: Vec<Filterable>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// A tile's declared subscription surface to dashboard-level filters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Filterable {
    #[serde(default)]
    pub listen: Vec<FilterListener>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Identity is the `(dashboard_filter_name, field)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterListener {
    pub dashboard_filter_name: String,
    pub field: String,
}

/// A dashboard-level filter, keyed by `dimension` for reconciliation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DashboardFilter {
    pub id: String,
    #[serde(default)]
    pub dashboard_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub dimension: Option<String>,
    #[serde(default)]
    pub default_value: Option<String>,
    #[serde(default)]
    pub allow_multiple_values: bool,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub ui_config: Option<Value>,
    #[serde(default)]
    pub listens_to_filters: Vec<String>,
}

/// Body of a create/update dashboard-filter call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterPayload {
    pub dashboard_id: String,
    pub name: String,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explore: Option<String>,
    pub dimension: String,
    pub row: i32,
    pub allow_multiple_values: bool,
    pub required: bool,
    pub default_value: String,
    pub ui_config: Value,
    pub listens_to_filters: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DashboardPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ElementPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_maker: Option<ResultMaker>,
}

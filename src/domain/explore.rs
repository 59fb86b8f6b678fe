// Explore metadata and the exported field descriptors
use serde::{Deserialize, Serialize};

/// Description of a model explore as returned by the BI platform.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExploreDescription {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub fields: ExploreFields,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExploreFields {
    #[serde(default)]
    pub measures: Vec<ExploreFieldDef>,
    #[serde(default)]
    pub dimensions: Vec<ExploreFieldDef>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExploreFieldDef {
    #[serde(default)]
    pub suggest_dimension: Option<String>,
    #[serde(default)]
    pub measure: Option<bool>,
}

/// Simplified field descriptor written by the explore-measures export.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportField {
    pub name: Option<String>,
    pub is_grid_column: bool,
    pub is_filterable: bool,
    pub is_keyword_searchable: bool,
    pub measure: bool,
}

/// One dashboard entry in the grouped export document.
#[derive(Debug, Clone, Serialize)]
pub struct ExploreExportEntry {
    pub dashboard_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explore_name: Option<String>,
    pub fields: Vec<ExportField>,
}

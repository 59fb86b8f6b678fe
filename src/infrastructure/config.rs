use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub server: ServerSettings,
    pub bi: BiSettings,
    #[serde(default)]
    pub store: StoreSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BiSettings {
    pub base_url: String,
    pub api_token: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StoreSettings {
    #[serde(default)]
    pub base_url: Option<String>,
}

fn default_timeout_secs() -> u64 {
    60
}

/// Per-call configuration bag for the workflow service. Every field is
/// optional; request overrides arrive as camelCase JSON in the `config`
/// query parameter and win over the file defaults field by field. The file
/// defaults use snake_case keys (accepted through the aliases).
///
/// - `folderName`: name of the per-user folder created by get-or-create.
/// - `model` / `explore`: BI model and explore used when building queries
///   and dashboard filters.
/// - `tileTitle`: title of the tile targeted by the update/defaults paths.
/// - `limitResults`: max values returned per dimension by filter-values.
/// - `baseFilters`: extra filters applied to filter-value queries.
/// - `dateField`: field used for the latest-date lookup in date-range
///   counts; without it the counts come back empty.
/// - `exportMarker`: dashboard-id substring selecting the dashboards
///   grouped by the explore-measures export.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkflowConfig {
    #[serde(alias = "folder_name")]
    pub folder_name: Option<String>,
    pub model: Option<String>,
    pub explore: Option<String>,
    #[serde(alias = "tile_title")]
    pub tile_title: Option<String>,
    #[serde(alias = "limit_results")]
    pub limit_results: Option<usize>,
    #[serde(alias = "base_filters")]
    pub base_filters: Option<BTreeMap<String, String>>,
    #[serde(alias = "date_field")]
    pub date_field: Option<String>,
    #[serde(alias = "export_marker")]
    pub export_marker: Option<String>,
}

/// Field-by-field resolution: an override wins when present, otherwise the
/// default is kept.
pub fn resolve_workflow_config(
    defaults: &WorkflowConfig,
    overrides: WorkflowConfig,
) -> WorkflowConfig {
    WorkflowConfig {
        folder_name: overrides
            .folder_name
            .or_else(|| defaults.folder_name.clone()),
        model: overrides.model.or_else(|| defaults.model.clone()),
        explore: overrides.explore.or_else(|| defaults.explore.clone()),
        tile_title: overrides.tile_title.or_else(|| defaults.tile_title.clone()),
        limit_results: overrides.limit_results.or(defaults.limit_results),
        base_filters: overrides
            .base_filters
            .or_else(|| defaults.base_filters.clone()),
        date_field: overrides.date_field.or_else(|| defaults.date_field.clone()),
        export_marker: overrides
            .export_marker
            .or_else(|| defaults.export_marker.clone()),
    }
}

pub fn load_service_config() -> anyhow::Result<ServiceConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/service"))
        .build()?;

    Ok(settings.try_deserialize()?)
}

pub fn load_workflow_defaults() -> anyhow::Result<WorkflowConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/workflow").required(false))
        .build()?;

    Ok(settings.try_deserialize()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_win_field_by_field() {
        let defaults = WorkflowConfig {
            folder_name: Some("My Reports".to_string()),
            model: Some("orders".to_string()),
            limit_results: Some(5),
            ..WorkflowConfig::default()
        };
        let overrides = WorkflowConfig {
            model: Some("shipments".to_string()),
            limit_results: Some(10),
            ..WorkflowConfig::default()
        };

        let resolved = resolve_workflow_config(&defaults, overrides);
        assert_eq!(resolved.folder_name.as_deref(), Some("My Reports"));
        assert_eq!(resolved.model.as_deref(), Some("shipments"));
        assert_eq!(resolved.limit_results, Some(10));
        assert!(resolved.date_field.is_none());
    }

    #[test]
    fn request_overrides_parse_from_camel_case_json() {
        let overrides: WorkflowConfig = serde_json::from_str(
            r#"{ "tileTitle": "Data Tile", "limitResults": 3, "baseFilters": { "orders.state": "open" } }"#,
        )
        .expect("overrides should parse");

        assert_eq!(overrides.tile_title.as_deref(), Some("Data Tile"));
        assert_eq!(overrides.limit_results, Some(3));
        assert_eq!(
            overrides
                .base_filters
                .as_ref()
                .and_then(|filters| filters.get("orders.state"))
                .map(String::as_str),
            Some("open")
        );
    }
}

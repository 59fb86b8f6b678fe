// Dashboard workflow service - copy, customization, and query fan-out
use crate::application::bi_client::BiQueryClient;
use crate::application::document_store::{DocumentStoreWriter, StoreOutcome};
use crate::application::errors::ServiceError;
use crate::domain::dashboard::{
    DashboardElement, DashboardPatch, DashboardSummary, ElementPatch, FilterListener,
    FilterPayload,
};
use crate::domain::explore::{ExploreExportEntry, ExportField};
use crate::domain::query::{QueryConfig, ResultRow};
use crate::infrastructure::config::WorkflowConfig;
use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

const DEFAULT_MEASURE: &str = "count";
const DEFAULT_VALUE_LIMIT: usize = 5;
const FILTER_VALUE_ROW_LIMIT: &str = "300";
const DATE_RANGE_OPTIONS: [&str; 5] = [
    "last 1 month",
    "last 4 months",
    "last 1 year",
    "last 2 years",
    "last 5 years",
];
const EXPORT_ID_KEYWORD: &str = "voucher";
const EXPORT_DOC_REFERENCE: &str = "configs/explore-measures";

type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, Clone, Serialize)]
pub struct DashboardDefaults {
    pub default_columns: Vec<String>,
    pub filter_name_map: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DimensionValues {
    pub dimension: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DimensionCounts {
    pub dimension: String,
    pub counts: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FilterSummary {
    pub name: Option<String>,
    pub title: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub dimension: Option<String>,
    pub allow_multiple_values: bool,
    pub required: bool,
    pub default_value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardListEntry {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardHeader {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TileResult {
    pub title: String,
    pub query_id: String,
    pub data: Vec<ResultRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TilesWithResults {
    pub dashboard: DashboardHeader,
    pub tiles: Vec<TileResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExploreMeasuresExport {
    pub file_path: String,
    pub dashboard_ids: Vec<String>,
    pub store_outcome: StoreOutcome,
}

/// Stateless per-request workflow object. Holds the injected client and
/// store handles plus the resolved per-call configuration.
#[derive(Clone)]
pub struct DashboardService {
    client: Arc<dyn BiQueryClient>,
    store: Arc<dyn DocumentStoreWriter>,
    config: WorkflowConfig,
}

impl DashboardService {
    pub fn new(
        client: Arc<dyn BiQueryClient>,
        store: Arc<dyn DocumentStoreWriter>,
        config: WorkflowConfig,
    ) -> Self {
        Self {
            client,
            store,
            config,
        }
    }

    /// The current user's personal folder id, falling back to the home
    /// folder id.
    pub async fn personal_folder_id(&self) -> ServiceResult<String> {
        let user = self.client.current_user().await?;
        if let Some(id) = user.personal_folder_id.filter(|id| !id.is_empty()) {
            return Ok(id);
        }
        if let Some(id) = user.home_folder_id.filter(|id| !id.is_empty()) {
            return Ok(id);
        }
        Err(ServiceError::NotFound(
            "could not determine a personal or home folder for the current user".into(),
        ))
    }

    /// Idempotent find-or-create copy. An existing non-deleted dashboard in
    /// the target folder with a case-insensitively matching trimmed title is
    /// reused; its title is rewritten only when it differs byte-for-byte.
    /// Not guarded against concurrent callers racing to create duplicates.
    pub async fn ensure_dashboard_copy_in_folder(
        &self,
        original_dashboard_id: &str,
        folder_id: &str,
        copy_title: &str,
    ) -> ServiceResult<String> {
        let in_folder = self.client.search_dashboards(Some(folder_id), None).await?;
        let wanted = copy_title.trim().to_lowercase();

        let existing = in_folder.iter().find_map(|dashboard| {
            let id = dashboard.id.as_deref()?;
            if dashboard.deleted || dashboard.folder_id.as_deref() != Some(folder_id) {
                return None;
            }
            let title = dashboard.title.as_deref()?;
            (title.trim().to_lowercase() == wanted).then(|| (id.to_string(), title.to_string()))
        });

        if let Some((id, title)) = existing {
            if title != copy_title {
                self.client
                    .update_dashboard(&id, &title_patch(copy_title))
                    .await?;
            }
            return Ok(id);
        }

        let copied = self
            .client
            .copy_dashboard(original_dashboard_id, folder_id)
            .await?;
        let copied_id = copied.id.filter(|id| !id.is_empty()).ok_or_else(|| {
            ServiceError::Upstream("failed to copy dashboard: response is missing an id".into())
        })?;
        self.client
            .update_dashboard(&copied_id, &title_patch(copy_title))
            .await?;
        Ok(copied_id)
    }

    /// Resolve a folder path segment-by-segment and locate a dashboard by
    /// title in the terminal folder. A leading `shared` segment means the
    /// current user's home folder.
    pub async fn find_dashboard_in_nested_path(
        &self,
        path_segments: &[String],
        dashboard_title: &str,
    ) -> ServiceResult<String> {
        self.resolve_dashboard_in_path(path_segments, dashboard_title)
            .await
            .map_err(|err| {
                err.with_context(&format!("failed to locate dashboard \"{dashboard_title}\""))
            })
    }

    async fn resolve_dashboard_in_path(
        &self,
        path_segments: &[String],
        dashboard_title: &str,
    ) -> ServiceResult<String> {
        let segments: Vec<String> = path_segments
            .iter()
            .map(|segment| segment.trim().to_lowercase())
            .collect();
        if segments.is_empty() {
            return Err(ServiceError::Validation("folder path is empty".into()));
        }

        let mut current_folder_id: Option<String> = None;
        for (index, segment) in segments.iter().enumerate() {
            if index == 0 && segment == "shared" {
                let user = self.client.current_user().await?;
                let home = user
                    .home_folder_id
                    .filter(|id| !id.is_empty())
                    .ok_or_else(|| {
                        ServiceError::NotFound(
                            "home folder not found for the current user".into(),
                        )
                    })?;
                current_folder_id = Some(home);
                continue;
            }

            let parent_id = current_folder_id.as_deref();
            let folders = self.client.search_folders(parent_id, Some(segment)).await?;
            let matched = folders
                .iter()
                .find(|folder| folder.name.trim().to_lowercase() == *segment);

            let Some(matched) = matched else {
                let siblings = self.client.search_folders(parent_id, None).await?;
                let names: Vec<&str> =
                    siblings.iter().map(|folder| folder.name.as_str()).collect();
                return Err(ServiceError::NotFound(format!(
                    "folder \"{segment}\" not found; available: {}",
                    join_or_none(&names)
                )));
            };
            current_folder_id = Some(matched.id.clone());
        }

        let folder_id = current_folder_id
            .ok_or_else(|| ServiceError::NotFound("failed to resolve the folder path".into()))?;

        let found = self
            .client
            .search_dashboards(Some(&folder_id), Some(dashboard_title.trim()))
            .await?;
        let in_folder: Vec<&DashboardSummary> = found
            .iter()
            .filter(|d| d.folder_id.as_deref() == Some(folder_id.as_str()) && !d.deleted)
            .collect();

        if in_folder.is_empty() {
            let all_in_folder = self
                .client
                .search_dashboards(Some(&folder_id), None)
                .await?;
            let titles: Vec<&str> = all_in_folder
                .iter()
                .filter(|d| !d.deleted)
                .filter_map(|d| d.title.as_deref())
                .collect();
            return Err(ServiceError::NotFound(format!(
                "dashboard titled \"{dashboard_title}\" not found in folder \"{folder_id}\"; available: {}",
                join_or_none(&titles)
            )));
        }

        let wanted = dashboard_title.trim().to_lowercase();
        let exact = in_folder.iter().find(|d| {
            d.title
                .as_deref()
                .is_some_and(|title| title.trim().to_lowercase() == wanted)
        });
        let dashboard = exact.unwrap_or(&in_folder[0]);
        dashboard
            .id
            .clone()
            .ok_or_else(|| ServiceError::NotFound("matched dashboard has no id".into()))
    }

    /// Find the configured folder under the parent, creating it when absent.
    /// Not guarded against races.
    pub async fn get_or_create_dashboard_folder(
        &self,
        parent_folder_id: &str,
    ) -> ServiceResult<String> {
        let folder_name = self
            .config
            .folder_name
            .as_deref()
            .ok_or_else(|| ServiceError::Validation("folderName is not configured".into()))?;

        let existing = self
            .client
            .search_folders(Some(parent_folder_id), Some(folder_name))
            .await?;
        if let Some(folder) = existing.first() {
            return Ok(folder.id.clone());
        }

        let created = self
            .client
            .create_folder(folder_name, parent_folder_id)
            .await?;
        Ok(created.id)
    }

    /// Bring every tile's filter listeners in line with the selected
    /// dimensions. The union keeps storage order first, then appends missing
    /// selections; the changed-check compares length and element-wise order,
    /// so an identical recomputation is a no-op while any difference
    /// rewrites.
    pub async fn ensure_tile_listeners(
        &self,
        dashboard_id: &str,
        selected_dimensions: &[String],
        filter_name_map: &BTreeMap<String, String>,
    ) -> ServiceResult<()> {
        let elements = self.client.dashboard_elements(dashboard_id).await?;

        for element in elements {
            let Some(maker) = element.result_maker else {
                continue;
            };
            let Some(filterable) = maker.filterables.first() else {
                continue;
            };

            let current = &filterable.listen;
            let mut updated: Vec<FilterListener> = Vec::new();
            for listen in current {
                if !updated.contains(listen) {
                    updated.push(listen.clone());
                }
            }
            for dimension in selected_dimensions {
                let filter_name = filter_name_map
                    .get(dimension)
                    .cloned()
                    .unwrap_or_else(|| dimension.clone());
                let candidate = FilterListener {
                    dashboard_filter_name: filter_name,
                    field: dimension.clone(),
                };
                if !updated.contains(&candidate) {
                    updated.push(candidate);
                }
            }

            let changed = updated.len() != current.len()
                || updated
                    .iter()
                    .zip(current.iter())
                    .any(|(new, old)| new != old);
            if !changed {
                continue;
            }

            let mut patched_filterable = filterable.clone();
            patched_filterable.listen = updated;
            let mut patched_maker = maker.clone();
            patched_maker.filterables = vec![patched_filterable];

            self.client
                .update_dashboard_element(
                    &element.id,
                    &ElementPatch {
                        query_id: None,
                        result_maker: Some(patched_maker),
                    },
                )
                .await?;
        }
        Ok(())
    }

    /// The central mutation: rewrite the target tile's query to the selected
    /// columns, reconcile dashboard filters with the selected dimensions,
    /// and sync tile listeners. The steps are independent remote calls with
    /// no rollback; a failure partway leaves the earlier steps committed.
    pub async fn update_dashboard(
        &self,
        current_dashboard_id: &str,
        original_dashboard_id: &str,
        selected_columns: &[String],
        selected_dimensions: &[String],
        filters_from_request: &BTreeMap<String, String>,
        filter_name_map: &BTreeMap<String, String>,
    ) -> ServiceResult<()> {
        if current_dashboard_id == original_dashboard_id {
            return Err(ServiceError::Validation(
                "the original dashboard cannot be updated; copy it first".into(),
            ));
        }

        let dashboard = self.client.dashboard(current_dashboard_id).await?;

        let tile = dashboard
            .dashboard_elements
            .iter()
            .find(|element| element.title.as_deref() == self.config.tile_title.as_deref())
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "tile titled \"{}\" not found in dashboard",
                    self.config.tile_title.as_deref().unwrap_or_default()
                ))
            })?;

        let query_id = tile.resolved_query_id().ok_or_else(|| {
            ServiceError::NotFound(
                "tile has neither a query id nor a result-maker query id".into(),
            )
        })?;

        let original_query = self.client.query(query_id).await?;

        let mut query_config = QueryConfig::from_query(&original_query);
        query_config.fields = selected_columns.to_vec();
        query_config.client_id = Some(generated_client_id());
        if self.config.tile_title.is_some() {
            query_config.vis_config = Some(table_vis_config(
                original_query.vis_config.as_ref(),
                selected_columns,
            ));
        }

        let new_query = self.client.create_query(&query_config).await?;
        self.client
            .update_dashboard_element(
                &tile.id,
                &ElementPatch {
                    query_id: Some(new_query.id),
                    result_maker: None,
                },
            )
            .await?;

        let existing_filters = &dashboard.dashboard_filters;
        for filter in existing_filters {
            if let Some(dimension) = filter.dimension.as_deref() {
                if !selected_dimensions.iter().any(|d| d == dimension) {
                    self.client.delete_dashboard_filter(&filter.id).await?;
                }
            }
        }

        for dimension in selected_dimensions {
            let title = filter_name_map
                .get(dimension)
                .cloned()
                .unwrap_or_else(|| dimension.clone());
            let default_value = filters_from_request
                .get(&title)
                .cloned()
                .unwrap_or_default();

            let payload = FilterPayload {
                dashboard_id: current_dashboard_id.to_string(),
                name: title.clone(),
                title,
                kind: "field_filter".to_string(),
                model: self.config.model.clone(),
                explore: self.config.explore.clone(),
                dimension: dimension.clone(),
                row: 0,
                allow_multiple_values: true,
                required: false,
                default_value,
                ui_config: serde_json::json!({ "display": "popover", "type": "advanced" }),
                listens_to_filters: Vec::new(),
            };

            let matched = existing_filters
                .iter()
                .find(|filter| filter.dimension.as_deref() == Some(dimension.as_str()));
            match matched {
                Some(existing) => {
                    self.client
                        .update_dashboard_filter(&existing.id, &payload)
                        .await?;
                }
                None => {
                    self.client.create_dashboard_filter(&payload).await?;
                }
            }
        }

        self.ensure_tile_listeners(current_dashboard_id, selected_dimensions, filter_name_map)
            .await
    }

    /// Inverse of the update path: the target tile's current field list and
    /// its listener-derived `field -> filter name` map.
    pub async fn default_columns_and_filter_name_map(
        &self,
        dashboard_id: &str,
        tile_title: Option<&str>,
    ) -> ServiceResult<DashboardDefaults> {
        let dashboard = self.client.dashboard(dashboard_id).await?;
        let target_title = tile_title.or(self.config.tile_title.as_deref());

        let tile = dashboard
            .dashboard_elements
            .iter()
            .find(|element| element.title.as_deref() == target_title)
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "tile titled \"{}\" not found in dashboard",
                    target_title.unwrap_or_default()
                ))
            })?;

        let query_id = tile.resolved_query_id().ok_or_else(|| {
            ServiceError::NotFound(format!(
                "no query id found for tile titled \"{}\"",
                target_title.unwrap_or_default()
            ))
        })?;

        let query = self.client.query(query_id).await?;

        let mut filter_name_map = BTreeMap::new();
        if let Some(filterable) = tile
            .result_maker
            .as_ref()
            .and_then(|maker| maker.filterables.first())
        {
            for listen in &filterable.listen {
                if !listen.field.is_empty() && !listen.dashboard_filter_name.is_empty() {
                    filter_name_map
                        .insert(listen.field.clone(), listen.dashboard_filter_name.clone());
                }
            }
        }

        // De-duplication only applies with a configured tile title, matching
        // the behavior this endpoint has always had.
        let default_columns = if self.config.tile_title.is_some() {
            let mut seen = HashSet::new();
            query
                .fields
                .iter()
                .filter(|field| seen.insert(field.as_str()))
                .cloned()
                .collect()
        } else {
            query.fields.clone()
        };

        Ok(DashboardDefaults {
            default_columns,
            filter_name_map,
        })
    }

    /// Top values per dimension, formatted as `"value (count)"`. Dimensions
    /// run concurrently; a failing dimension degrades to an empty list.
    pub async fn filter_values(
        &self,
        dimensions: &[String],
        selected_measure: Option<&str>,
    ) -> ServiceResult<Vec<DimensionValues>> {
        let tasks = dimensions
            .iter()
            .map(|dimension| self.dimension_values(dimension, selected_measure));
        Ok(join_all(tasks).await)
    }

    async fn dimension_values(
        &self,
        dimension: &str,
        selected_measure: Option<&str>,
    ) -> DimensionValues {
        if dimension.is_empty() {
            return DimensionValues {
                dimension: dimension.to_string(),
                values: Vec::new(),
            };
        }

        match self
            .query_dimension_values(dimension, selected_measure)
            .await
        {
            Ok(values) => DimensionValues {
                dimension: dimension.to_string(),
                values,
            },
            Err(err) => {
                tracing::error!("failed to fetch filter values for {dimension}: {err}");
                DimensionValues {
                    dimension: dimension.to_string(),
                    values: Vec::new(),
                }
            }
        }
    }

    async fn query_dimension_values(
        &self,
        dimension: &str,
        selected_measure: Option<&str>,
    ) -> ServiceResult<Vec<String>> {
        let measure = selected_measure.unwrap_or(DEFAULT_MEASURE);
        let config = QueryConfig {
            model: self.config.model.clone(),
            view: self.config.explore.clone(),
            fields: vec![dimension.to_string(), measure.to_string()],
            sorts: vec![format!("{measure} desc")],
            limit: Some(FILTER_VALUE_ROW_LIMIT.to_string()),
            filters: self.config.base_filters.clone(),
            ..QueryConfig::default()
        };

        let query = self.client.create_query(&config).await?;
        let rows = self.client.run_query(&query.id).await?;

        let limit = self.config.limit_results.unwrap_or(DEFAULT_VALUE_LIMIT);
        let values = rows
            .iter()
            .filter_map(|row| {
                let value = row.get(dimension)?;
                if value.is_null() {
                    return None;
                }
                let value = display_value(value);
                if value == "null" {
                    return None;
                }
                let count = numeric_cell(row.get(measure));
                if count == 0 {
                    return None;
                }
                Some(format!("{value} ({count})"))
            })
            .take(limit)
            .collect();
        Ok(values)
    }

    /// Counts for the five fixed relative date ranges, per date-named
    /// dimension. Without a configured date field nothing is queried and
    /// every dimension comes back with empty counts.
    pub async fn date_range_counts(
        &self,
        dimensions: &[String],
        selected_measure: Option<&str>,
    ) -> ServiceResult<Vec<DimensionCounts>> {
        let Some(date_field) = self.config.date_field.as_deref() else {
            tracing::warn!("no dateField configured; skipping date range counts");
            return Ok(dimensions
                .iter()
                .map(|dimension| DimensionCounts {
                    dimension: dimension.clone(),
                    counts: BTreeMap::new(),
                })
                .collect());
        };

        let latest_config = QueryConfig {
            model: self.config.model.clone(),
            view: self.config.explore.clone(),
            fields: vec![date_field.to_string()],
            sorts: vec![format!("{date_field} desc")],
            limit: Some("1".to_string()),
            ..QueryConfig::default()
        };
        let latest_query = self.client.create_query(&latest_config).await?;
        let latest_rows = self.client.run_query(&latest_query.id).await?;
        let latest_date = latest_rows
            .first()
            .and_then(|row| row.get(date_field))
            .filter(|value| !value.is_null())
            .map(display_value)
            .unwrap_or_else(|| Utc::now().date_naive().to_string());
        tracing::debug!("latest known {date_field}: {latest_date}");

        let tasks = dimensions
            .iter()
            .map(|dimension| self.dimension_range_counts(dimension, selected_measure));
        Ok(join_all(tasks).await)
    }

    async fn dimension_range_counts(
        &self,
        dimension: &str,
        selected_measure: Option<&str>,
    ) -> DimensionCounts {
        let mut counts = BTreeMap::new();
        if dimension.is_empty() || !dimension.to_lowercase().contains("date") {
            return DimensionCounts {
                dimension: dimension.to_string(),
                counts,
            };
        }

        let measure = selected_measure.unwrap_or(DEFAULT_MEASURE);
        for range in DATE_RANGE_OPTIONS {
            let count = match self.range_count(dimension, measure, range).await {
                Ok(count) => count,
                Err(err) => {
                    tracing::error!("failed to fetch {range} count for {dimension}: {err}");
                    0
                }
            };
            counts.insert(range.to_string(), count);
        }

        DimensionCounts {
            dimension: dimension.to_string(),
            counts,
        }
    }

    async fn range_count(
        &self,
        dimension: &str,
        measure: &str,
        range: &str,
    ) -> ServiceResult<i64> {
        let mut filters = BTreeMap::new();
        filters.insert(dimension.to_string(), range.to_string());

        let config = QueryConfig {
            model: self.config.model.clone(),
            view: self.config.explore.clone(),
            fields: vec![measure.to_string()],
            filters: Some(filters),
            limit: Some("1".to_string()),
            ..QueryConfig::default()
        };

        let query = self.client.create_query(&config).await?;
        let rows = self.client.run_query(&query.id).await?;
        Ok(numeric_cell(rows.first().and_then(|row| row.get(measure))))
    }

    /// Strict copy: fails when a dashboard with the custom name already
    /// exists in the folder. The idempotent variant is
    /// `ensure_dashboard_copy_in_folder`.
    pub async fn save_dashboard_copy(
        &self,
        current_dashboard_id: &str,
        folder_id: &str,
        custom_name: &str,
    ) -> ServiceResult<String> {
        let existing = self
            .client
            .search_dashboards(Some(folder_id), Some(custom_name))
            .await?;
        if !existing.is_empty() {
            return Err(ServiceError::Validation(format!(
                "a dashboard named \"{custom_name}\" already exists in the folder"
            )));
        }

        let copied = self
            .client
            .copy_dashboard(current_dashboard_id, folder_id)
            .await?;
        let copied_id = copied.id.filter(|id| !id.is_empty()).ok_or_else(|| {
            ServiceError::Upstream("failed to copy dashboard: response is missing an id".into())
        })?;
        self.client
            .update_dashboard(&copied_id, &title_patch(custom_name))
            .await?;
        Ok(copied_id)
    }

    /// Stable public projection of a dashboard's filters.
    pub async fn dashboard_filters(
        &self,
        dashboard_id: &str,
    ) -> ServiceResult<Vec<FilterSummary>> {
        let dashboard = self.client.dashboard(dashboard_id).await?;
        Ok(dashboard
            .dashboard_filters
            .into_iter()
            .map(|filter| FilterSummary {
                name: filter.name,
                title: filter.title,
                kind: filter.kind,
                dimension: filter.dimension,
                allow_multiple_values: filter.allow_multiple_values,
                required: filter.required,
                default_value: filter.default_value,
            })
            .collect())
    }

    /// Non-deleted dashboards in a folder; an original dashboard living
    /// elsewhere is appended so it is always visible in the listing.
    pub async fn dashboard_list_for_ui(
        &self,
        folder_id: &str,
        original_dashboard_id: Option<&str>,
    ) -> ServiceResult<Vec<DashboardListEntry>> {
        let in_folder = self.client.search_dashboards(Some(folder_id), None).await?;
        let mut dashboards: Vec<DashboardListEntry> = in_folder
            .into_iter()
            .filter(|dashboard| !dashboard.deleted)
            .filter_map(|dashboard| {
                dashboard.id.map(|id| DashboardListEntry {
                    id,
                    title: dashboard.title,
                })
            })
            .collect();

        let Some(original_id) = original_dashboard_id.filter(|id| !id.is_empty()) else {
            return Ok(dashboards);
        };
        if dashboards.iter().any(|dashboard| dashboard.id == original_id) {
            return Ok(dashboards);
        }

        let original = self.client.dashboard(original_id).await?;
        if let (Some(id), Some(title)) = (original.id, original.title) {
            dashboards.push(DashboardListEntry {
                id,
                title: Some(title),
            });
        }
        Ok(dashboards)
    }

    /// Re-run every data tile with the final filters merged over the tile
    /// query's own filters. Grid/table tiles are skipped; tiles run
    /// concurrently and a failing tile is logged and omitted.
    pub async fn dashboard_tiles_with_results(
        &self,
        dashboard_id: &str,
        final_filters: &BTreeMap<String, String>,
    ) -> ServiceResult<TilesWithResults> {
        let dashboard = self.client.dashboard(dashboard_id).await?;

        let tasks = dashboard
            .dashboard_elements
            .iter()
            .map(|tile| self.tile_result(tile, final_filters));
        let tiles = join_all(tasks).await.into_iter().flatten().collect();

        Ok(TilesWithResults {
            dashboard: DashboardHeader {
                id: dashboard.id.unwrap_or_else(|| dashboard_id.to_string()),
                title: dashboard.title.unwrap_or_default(),
                description: dashboard.description,
            },
            tiles,
        })
    }

    async fn tile_result(
        &self,
        tile: &DashboardElement,
        final_filters: &BTreeMap<String, String>,
    ) -> Option<TileResult> {
        let query_id = tile.resolved_query_id()?;
        if matches!(tile.vis_type(), Some("looker_grid") | Some("table")) {
            return None;
        }

        match self.rerun_tile_query(query_id, final_filters).await {
            Ok(data) => Some(TileResult {
                title: tile
                    .title
                    .clone()
                    .unwrap_or_else(|| format!("Tile {}", tile.id)),
                query_id: query_id.to_string(),
                data,
            }),
            Err(err) => {
                tracing::warn!(
                    "failed to fetch data for tile \"{}\": {err}",
                    tile.title.as_deref().unwrap_or(&tile.id)
                );
                None
            }
        }
    }

    async fn rerun_tile_query(
        &self,
        query_id: &str,
        final_filters: &BTreeMap<String, String>,
    ) -> ServiceResult<Vec<ResultRow>> {
        let original = self.client.query(query_id).await?;

        let mut filters = original.filters.clone().unwrap_or_default();
        for (key, value) in final_filters {
            filters.insert(key.clone(), value.clone());
        }

        let config = QueryConfig {
            model: original.model.clone(),
            view: original.view.clone(),
            fields: original.fields.clone(),
            filters: Some(filters),
            sorts: original.sorts.clone(),
            limit: original.limit.clone(),
            column_limit: original.column_limit.clone(),
            pivots: original.pivots.clone(),
            total: original.total,
            row_total: original.row_total.clone(),
            dynamic_fields: original.dynamic_fields.clone(),
            filter_expression: original.filter_expression.clone(),
            vis_config: original.vis_config.clone(),
            ..QueryConfig::default()
        };

        let query = self.client.create_query(&config).await?;
        Ok(self.client.run_query(&query.id).await?)
    }

    /// Project an explore's measures and dimensions into simplified field
    /// descriptors, group them under the dashboards matching the configured
    /// export marker, write the structure to a local file, and mirror it to
    /// the document store best-effort.
    pub async fn save_explore_measures(
        &self,
        model_name: &str,
        explore_name: &str,
    ) -> ServiceResult<ExploreMeasuresExport> {
        let explore = self.client.model_explore(model_name, explore_name).await?;

        let (model, explore_from_id) = match explore.id.as_deref() {
            Some(id) => {
                let mut parts = id.splitn(2, "::");
                (
                    parts.next().map(str::to_string),
                    parts.next().map(str::to_string),
                )
            }
            None => (None, None),
        };

        let mut fields: Vec<ExportField> = Vec::new();
        for measure in &explore.fields.measures {
            fields.push(ExportField {
                name: measure.suggest_dimension.clone(),
                is_grid_column: false,
                is_filterable: false,
                is_keyword_searchable: true,
                measure: measure.measure == Some(true),
            });
        }
        for dimension in &explore.fields.dimensions {
            fields.push(ExportField {
                name: dimension.suggest_dimension.clone(),
                is_grid_column: false,
                is_filterable: false,
                is_keyword_searchable: true,
                measure: false,
            });
        }

        let marker = self
            .config
            .export_marker
            .as_deref()
            .filter(|marker| !marker.is_empty())
            .ok_or_else(|| ServiceError::Validation("exportMarker is not configured".into()))?
            .to_lowercase();

        let all = self.client.all_dashboards().await?;
        let matching_ids: Vec<String> = all
            .into_iter()
            .filter_map(|dashboard| dashboard.id)
            .filter(|id| {
                let lower = id.to_lowercase();
                lower.contains(&marker) && lower.contains(EXPORT_ID_KEYWORD)
            })
            .collect();

        let first = matching_ids.first().ok_or_else(|| {
            ServiceError::NotFound(format!(
                "no dashboards matched marker \"{marker}\" for the explore export"
            ))
        })?;
        let folder_name = first.split("::").next().unwrap_or(first).to_string();

        let mut entries: BTreeMap<String, ExploreExportEntry> = BTreeMap::new();
        for (index, dashboard_id) in matching_ids.iter().enumerate() {
            entries.insert(
                format!("dashboard{}", index + 1),
                ExploreExportEntry {
                    dashboard_id: dashboard_id.clone(),
                    model_name: model.clone(),
                    explore_name: explore_from_id.clone(),
                    fields: fields.clone(),
                },
            );
        }
        let mut export: BTreeMap<String, BTreeMap<String, ExploreExportEntry>> = BTreeMap::new();
        export.insert(folder_name, entries);

        let payload = serde_json::to_value(&export).map_err(|err| {
            ServiceError::Upstream(format!("failed to serialize the explore export: {err}"))
        })?;

        let file_name = format!(
            "explore_measures_{}.json",
            explore_from_id.as_deref().unwrap_or(explore_name)
        );
        let file_path = std::env::current_dir()
            .map(|dir| dir.join(&file_name))
            .unwrap_or_else(|_| PathBuf::from(&file_name));
        let body = serde_json::to_string_pretty(&payload).map_err(|err| {
            ServiceError::Upstream(format!("failed to serialize the explore export: {err}"))
        })?;
        std::fs::write(&file_path, body).map_err(|err| {
            ServiceError::Upstream(format!("failed to write {}: {err}", file_path.display()))
        })?;

        let store_outcome = self
            .store
            .upsert_document(EXPORT_DOC_REFERENCE, &payload)
            .await;
        if store_outcome == StoreOutcome::Degraded {
            tracing::warn!("document store unavailable; explore export kept locally only");
        }

        Ok(ExploreMeasuresExport {
            file_path: file_path.display().to_string(),
            dashboard_ids: matching_ids,
            store_outcome,
        })
    }
}

fn title_patch(title: &str) -> DashboardPatch {
    DashboardPatch {
        title: Some(title.to_string()),
    }
}

fn generated_client_id() -> String {
    format!("custom_client_{}", Utc::now().timestamp_millis())
}

/// Forced table visualization merged over the original vis config.
fn table_vis_config(original: Option<&Value>, selected_columns: &[String]) -> Value {
    let mut vis = match original {
        Some(Value::Object(map)) => map.clone(),
        _ => serde_json::Map::new(),
    };
    vis.insert("type".into(), Value::String("table".into()));
    vis.insert(
        "column_order".into(),
        Value::Array(
            selected_columns
                .iter()
                .map(|column| Value::String(column.clone()))
                .collect(),
        ),
    );
    vis.insert("show_row_numbers".into(), Value::Bool(true));
    vis.insert("table_theme".into(), Value::String("editable".into()));
    Value::Object(vis)
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn numeric_cell(value: Option<&Value>) -> i64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0) as i64,
        Some(Value::String(s)) => s.parse::<f64>().map(|f| f as i64).unwrap_or(0),
        _ => 0,
    }
}

fn join_or_none(names: &[&str]) -> String {
    if names.is_empty() {
        "None".to_string()
    } else {
        names.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::bi_client::ClientResult;
    use crate::application::errors::ClientError;
    use crate::domain::dashboard::{Dashboard, DashboardFilter, Filterable, ResultMaker};
    use crate::domain::explore::{ExploreDescription, ExploreFieldDef, ExploreFields};
    use crate::domain::folder::Folder;
    use crate::domain::query::Query;
    use crate::domain::user::User;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::{Mutex, MutexGuard};

    #[derive(Default)]
    struct MockState {
        calls: usize,
        next_query: usize,
        created_query_configs: HashMap<String, QueryConfig>,
        created_queries: Vec<QueryConfig>,
        dashboard_updates: Vec<(String, Option<String>)>,
        element_updates: Vec<(String, ElementPatch)>,
        copies: Vec<(String, String)>,
        created_filters: Vec<FilterPayload>,
        updated_filters: Vec<(String, FilterPayload)>,
        deleted_filters: Vec<String>,
    }

    #[derive(Default)]
    struct MockClient {
        user: User,
        folders: Vec<Folder>,
        summaries: Vec<DashboardSummary>,
        all: Vec<DashboardSummary>,
        dashboards: HashMap<String, Dashboard>,
        elements: HashMap<String, Vec<DashboardElement>>,
        queries: HashMap<String, Query>,
        rows_by_field: HashMap<String, Vec<ResultRow>>,
        fail_create_for_field: Option<String>,
        explore: Option<ExploreDescription>,
        state: Mutex<MockState>,
    }

    impl MockClient {
        fn bump(&self) {
            self.state.lock().unwrap().calls += 1;
        }

        fn state(&self) -> MutexGuard<'_, MockState> {
            self.state.lock().unwrap()
        }
    }

    #[async_trait::async_trait]
    impl BiQueryClient for MockClient {
        async fn current_user(&self) -> ClientResult<User> {
            self.bump();
            Ok(self.user.clone())
        }

        async fn search_folders(
            &self,
            parent_id: Option<&str>,
            name: Option<&str>,
        ) -> ClientResult<Vec<Folder>> {
            self.bump();
            Ok(self
                .folders
                .iter()
                .filter(|folder| folder.parent_id.as_deref() == parent_id)
                .filter(|folder| {
                    name.is_none_or(|wanted| {
                        folder.name.trim().to_lowercase() == wanted.trim().to_lowercase()
                    })
                })
                .cloned()
                .collect())
        }

        async fn create_folder(&self, name: &str, parent_id: &str) -> ClientResult<Folder> {
            self.bump();
            Ok(Folder {
                id: format!("folder-{name}"),
                name: name.to_string(),
                parent_id: Some(parent_id.to_string()),
            })
        }

        async fn search_dashboards(
            &self,
            folder_id: Option<&str>,
            title: Option<&str>,
        ) -> ClientResult<Vec<DashboardSummary>> {
            self.bump();
            Ok(self
                .summaries
                .iter()
                .filter(|d| folder_id.is_none_or(|f| d.folder_id.as_deref() == Some(f)))
                .filter(|d| {
                    title.is_none_or(|wanted| {
                        d.title.as_deref().is_some_and(|t| {
                            t.trim().to_lowercase() == wanted.trim().to_lowercase()
                        })
                    })
                })
                .cloned()
                .collect())
        }

        async fn all_dashboards(&self) -> ClientResult<Vec<DashboardSummary>> {
            self.bump();
            Ok(self.all.clone())
        }

        async fn dashboard(&self, dashboard_id: &str) -> ClientResult<Dashboard> {
            self.bump();
            self.dashboards.get(dashboard_id).cloned().ok_or_else(|| ClientError::Api {
                status: 404,
                message: format!("dashboard {dashboard_id} not found"),
            })
        }

        async fn copy_dashboard(
            &self,
            dashboard_id: &str,
            folder_id: &str,
        ) -> ClientResult<Dashboard> {
            self.bump();
            self.state()
                .copies
                .push((dashboard_id.to_string(), folder_id.to_string()));
            Ok(Dashboard {
                id: Some("copy-1".to_string()),
                ..Dashboard::default()
            })
        }

        async fn update_dashboard(
            &self,
            dashboard_id: &str,
            patch: &DashboardPatch,
        ) -> ClientResult<Dashboard> {
            self.bump();
            self.state()
                .dashboard_updates
                .push((dashboard_id.to_string(), patch.title.clone()));
            Ok(Dashboard::default())
        }

        async fn dashboard_elements(
            &self,
            dashboard_id: &str,
        ) -> ClientResult<Vec<DashboardElement>> {
            self.bump();
            Ok(self.elements.get(dashboard_id).cloned().unwrap_or_default())
        }

        async fn update_dashboard_element(
            &self,
            element_id: &str,
            patch: &ElementPatch,
        ) -> ClientResult<DashboardElement> {
            self.bump();
            self.state()
                .element_updates
                .push((element_id.to_string(), patch.clone()));
            Ok(DashboardElement::default())
        }

        async fn query(&self, query_id: &str) -> ClientResult<Query> {
            self.bump();
            self.queries.get(query_id).cloned().ok_or_else(|| ClientError::Api {
                status: 404,
                message: format!("query {query_id} not found"),
            })
        }

        async fn create_query(&self, config: &QueryConfig) -> ClientResult<Query> {
            self.bump();
            if let Some(fail_field) = self.fail_create_for_field.as_deref() {
                if config.fields.first().map(String::as_str) == Some(fail_field) {
                    return Err(ClientError::Api {
                        status: 500,
                        message: "query rejected".to_string(),
                    });
                }
            }
            let mut state = self.state();
            state.next_query += 1;
            let id = format!("generated-{}", state.next_query);
            state.created_query_configs.insert(id.clone(), config.clone());
            state.created_queries.push(config.clone());
            Ok(Query {
                id,
                ..Query::default()
            })
        }

        async fn run_query(&self, query_id: &str) -> ClientResult<Vec<ResultRow>> {
            self.bump();
            let key = self
                .state()
                .created_query_configs
                .get(query_id)
                .and_then(|config| config.fields.first().cloned());
            Ok(key
                .and_then(|field| self.rows_by_field.get(&field).cloned())
                .unwrap_or_default())
        }

        async fn create_dashboard_filter(
            &self,
            payload: &FilterPayload,
        ) -> ClientResult<DashboardFilter> {
            self.bump();
            self.state().created_filters.push(payload.clone());
            Ok(DashboardFilter::default())
        }

        async fn update_dashboard_filter(
            &self,
            filter_id: &str,
            payload: &FilterPayload,
        ) -> ClientResult<DashboardFilter> {
            self.bump();
            self.state()
                .updated_filters
                .push((filter_id.to_string(), payload.clone()));
            Ok(DashboardFilter::default())
        }

        async fn delete_dashboard_filter(&self, filter_id: &str) -> ClientResult<()> {
            self.bump();
            self.state().deleted_filters.push(filter_id.to_string());
            Ok(())
        }

        async fn model_explore(
            &self,
            _model_name: &str,
            _explore_name: &str,
        ) -> ClientResult<ExploreDescription> {
            self.bump();
            self.explore.clone().ok_or_else(|| ClientError::Api {
                status: 404,
                message: "explore not found".to_string(),
            })
        }
    }

    #[derive(Default)]
    struct RecordingStore {
        degraded: bool,
        upserts: Mutex<Vec<(String, Value)>>,
    }

    #[async_trait::async_trait]
    impl DocumentStoreWriter for RecordingStore {
        async fn upsert_document(&self, reference: &str, payload: &Value) -> StoreOutcome {
            self.upserts
                .lock()
                .unwrap()
                .push((reference.to_string(), payload.clone()));
            if self.degraded {
                StoreOutcome::Degraded
            } else {
                StoreOutcome::Stored
            }
        }
    }

    fn service(client: Arc<MockClient>, config: WorkflowConfig) -> DashboardService {
        DashboardService::new(client, Arc::new(RecordingStore::default()), config)
    }

    fn summary(id: &str, title: &str, folder: &str, deleted: bool) -> DashboardSummary {
        DashboardSummary {
            id: Some(id.to_string()),
            title: Some(title.to_string()),
            folder_id: Some(folder.to_string()),
            deleted,
        }
    }

    fn row(pairs: &[(&str, Value)]) -> ResultRow {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect()
    }

    fn listener(name: &str, field: &str) -> FilterListener {
        FilterListener {
            dashboard_filter_name: name.to_string(),
            field: field.to_string(),
        }
    }

    #[tokio::test]
    async fn personal_folder_falls_back_to_home() {
        let client = Arc::new(MockClient {
            user: User {
                personal_folder_id: Some(String::new()),
                home_folder_id: Some("home-1".to_string()),
                ..User::default()
            },
            ..MockClient::default()
        });
        let svc = service(client, WorkflowConfig::default());
        assert_eq!(svc.personal_folder_id().await.unwrap(), "home-1");

        let empty = Arc::new(MockClient::default());
        let svc = service(empty, WorkflowConfig::default());
        assert!(matches!(
            svc.personal_folder_id().await.unwrap_err(),
            ServiceError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn copy_reuses_existing_dashboard_without_renaming() {
        let client = Arc::new(MockClient {
            summaries: vec![summary("d1", "My Copy", "f1", false)],
            ..MockClient::default()
        });
        let svc = service(client.clone(), WorkflowConfig::default());

        let id = svc
            .ensure_dashboard_copy_in_folder("orig", "f1", "My Copy")
            .await
            .unwrap();

        assert_eq!(id, "d1");
        let state = client.state();
        assert!(state.copies.is_empty());
        assert!(state.dashboard_updates.is_empty());
    }

    #[tokio::test]
    async fn copy_renames_existing_dashboard_when_title_differs() {
        let client = Arc::new(MockClient {
            summaries: vec![summary("d1", "  my copy ", "f1", false)],
            ..MockClient::default()
        });
        let svc = service(client.clone(), WorkflowConfig::default());

        let id = svc
            .ensure_dashboard_copy_in_folder("orig", "f1", "My Copy")
            .await
            .unwrap();

        assert_eq!(id, "d1");
        let state = client.state();
        assert!(state.copies.is_empty());
        assert_eq!(
            state.dashboard_updates,
            vec![("d1".to_string(), Some("My Copy".to_string()))]
        );
    }

    #[tokio::test]
    async fn copy_ignores_soft_deleted_dashboards() {
        let client = Arc::new(MockClient {
            summaries: vec![summary("d1", "My Copy", "f1", true)],
            ..MockClient::default()
        });
        let svc = service(client.clone(), WorkflowConfig::default());

        let id = svc
            .ensure_dashboard_copy_in_folder("orig", "f1", "My Copy")
            .await
            .unwrap();

        assert_eq!(id, "copy-1");
        let state = client.state();
        assert_eq!(state.copies, vec![("orig".to_string(), "f1".to_string())]);
        assert_eq!(
            state.dashboard_updates,
            vec![("copy-1".to_string(), Some("My Copy".to_string()))]
        );
    }

    #[tokio::test]
    async fn nested_path_resolves_through_the_home_folder() {
        let client = Arc::new(MockClient {
            user: User {
                home_folder_id: Some("home".to_string()),
                ..User::default()
            },
            folders: vec![
                Folder {
                    id: "a".to_string(),
                    name: "Alpha".to_string(),
                    parent_id: Some("home".to_string()),
                },
                Folder {
                    id: "b".to_string(),
                    name: "Beta".to_string(),
                    parent_id: Some("a".to_string()),
                },
            ],
            summaries: vec![summary("d9", "Report X", "b", false)],
            ..MockClient::default()
        });
        let svc = service(client, WorkflowConfig::default());

        let id = svc
            .find_dashboard_in_nested_path(
                &["Shared".to_string(), "ALPHA".to_string(), "beta".to_string()],
                "report x",
            )
            .await
            .unwrap();
        assert_eq!(id, "d9");
    }

    #[tokio::test]
    async fn nested_path_missing_segment_lists_siblings() {
        let client = Arc::new(MockClient {
            user: User {
                home_folder_id: Some("home".to_string()),
                ..User::default()
            },
            folders: vec![Folder {
                id: "a".to_string(),
                name: "Alpha".to_string(),
                parent_id: Some("home".to_string()),
            }],
            ..MockClient::default()
        });
        let svc = service(client, WorkflowConfig::default());

        let err = svc
            .find_dashboard_in_nested_path(
                &["shared".to_string(), "Gamma".to_string()],
                "Report X",
            )
            .await
            .unwrap_err();

        let ServiceError::NotFound(message) = err else {
            panic!("expected a not-found error");
        };
        assert!(message.contains("failed to locate dashboard \"Report X\""));
        assert!(message.contains("gamma"));
        assert!(message.contains("Alpha"));
    }

    #[tokio::test]
    async fn nested_path_missing_dashboard_lists_titles() {
        let client = Arc::new(MockClient {
            folders: vec![Folder {
                id: "a".to_string(),
                name: "Alpha".to_string(),
                parent_id: None,
            }],
            summaries: vec![
                summary("d1", "Other Report", "a", false),
                summary("d2", "Gone Report", "a", true),
            ],
            ..MockClient::default()
        });
        let svc = service(client, WorkflowConfig::default());

        let err = svc
            .find_dashboard_in_nested_path(&["Alpha".to_string()], "Report X")
            .await
            .unwrap_err();

        let ServiceError::NotFound(message) = err else {
            panic!("expected a not-found error");
        };
        assert!(message.contains("Other Report"));
        assert!(!message.contains("Gone Report"));
    }

    #[tokio::test]
    async fn update_refuses_the_original_dashboard_before_any_call() {
        let client = Arc::new(MockClient::default());
        let svc = service(client.clone(), WorkflowConfig::default());

        let err = svc
            .update_dashboard("d1", "d1", &[], &[], &BTreeMap::new(), &BTreeMap::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::Validation(_)));
        assert_eq!(client.state().calls, 0);
    }

    #[tokio::test]
    async fn update_rewrites_query_and_reconciles_filters() {
        let columns = vec!["orders.id".to_string(), "orders.region".to_string()];
        let dimensions = vec!["orders.region".to_string(), "orders.city".to_string()];
        let mut name_map = BTreeMap::new();
        name_map.insert("orders.region".to_string(), "Region".to_string());
        let mut request_filters = BTreeMap::new();
        request_filters.insert("Region".to_string(), "East".to_string());

        let dashboard = Dashboard {
            id: Some("cur".to_string()),
            dashboard_elements: vec![DashboardElement {
                id: "el1".to_string(),
                title: Some("Data Tile".to_string()),
                query_id: Some("q1".to_string()),
                ..DashboardElement::default()
            }],
            dashboard_filters: vec![
                DashboardFilter {
                    id: "fil-old".to_string(),
                    dimension: Some("old.dim".to_string()),
                    ..DashboardFilter::default()
                },
                DashboardFilter {
                    id: "fil-region".to_string(),
                    dimension: Some("orders.region".to_string()),
                    ..DashboardFilter::default()
                },
            ],
            ..Dashboard::default()
        };

        let mut queries = HashMap::new();
        queries.insert(
            "q1".to_string(),
            Query {
                id: "q1".to_string(),
                model: Some("orders".to_string()),
                view: Some("orders_explore".to_string()),
                fields: vec!["a".to_string(), "b".to_string()],
                vis_config: Some(json!({ "type": "looker_line", "colors": ["#fff"] })),
                ..Query::default()
            },
        );

        let client = Arc::new(MockClient {
            dashboards: HashMap::from([("cur".to_string(), dashboard)]),
            queries,
            ..MockClient::default()
        });
        let config = WorkflowConfig {
            tile_title: Some("Data Tile".to_string()),
            model: Some("orders".to_string()),
            explore: Some("orders_explore".to_string()),
            ..WorkflowConfig::default()
        };
        let svc = service(client.clone(), config);

        svc.update_dashboard("cur", "orig", &columns, &dimensions, &request_filters, &name_map)
            .await
            .unwrap();

        let state = client.state();

        let created = &state.created_queries[0];
        assert_eq!(created.fields, columns);
        assert!(created
            .client_id
            .as_deref()
            .is_some_and(|id| id.starts_with("custom_client_")));
        let vis = created.vis_config.as_ref().unwrap();
        assert_eq!(vis.get("type"), Some(&json!("table")));
        assert_eq!(vis.get("column_order"), Some(&json!(columns)));
        assert_eq!(vis.get("show_row_numbers"), Some(&json!(true)));
        assert_eq!(vis.get("table_theme"), Some(&json!("editable")));
        assert_eq!(vis.get("colors"), Some(&json!(["#fff"])));

        assert_eq!(state.element_updates.len(), 1);
        assert_eq!(state.element_updates[0].0, "el1");
        assert_eq!(
            state.element_updates[0].1.query_id.as_deref(),
            Some("generated-1")
        );

        assert_eq!(state.deleted_filters, vec!["fil-old".to_string()]);

        assert_eq!(state.updated_filters.len(), 1);
        assert_eq!(state.updated_filters[0].0, "fil-region");
        assert_eq!(state.updated_filters[0].1.title, "Region");
        assert_eq!(state.updated_filters[0].1.default_value, "East");

        assert_eq!(state.created_filters.len(), 1);
        assert_eq!(state.created_filters[0].dimension, "orders.city");
        assert_eq!(state.created_filters[0].title, "orders.city");
        assert_eq!(state.created_filters[0].default_value, "");
        assert_eq!(state.created_filters[0].kind, "field_filter");
    }

    #[tokio::test]
    async fn defaults_come_from_the_tile_query_and_listeners() {
        let dashboard = Dashboard {
            id: Some("d".to_string()),
            dashboard_elements: vec![DashboardElement {
                id: "el1".to_string(),
                title: Some("Data Tile".to_string()),
                result_maker: Some(ResultMaker {
                    query_id: Some("q2".to_string()),
                    filterables: vec![Filterable {
                        listen: vec![listener("Region", "orders.region")],
                        ..Filterable::default()
                    }],
                    ..ResultMaker::default()
                }),
                ..DashboardElement::default()
            }],
            ..Dashboard::default()
        };
        let mut queries = HashMap::new();
        queries.insert(
            "q2".to_string(),
            Query {
                id: "q2".to_string(),
                fields: vec!["a".to_string(), "b".to_string(), "a".to_string()],
                ..Query::default()
            },
        );

        let client = Arc::new(MockClient {
            dashboards: HashMap::from([("d".to_string(), dashboard)]),
            queries,
            ..MockClient::default()
        });
        let config = WorkflowConfig {
            tile_title: Some("Data Tile".to_string()),
            ..WorkflowConfig::default()
        };
        let svc = service(client, config);

        let defaults = svc
            .default_columns_and_filter_name_map("d", None)
            .await
            .unwrap();
        assert_eq!(defaults.default_columns, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(
            defaults.filter_name_map.get("orders.region"),
            Some(&"Region".to_string())
        );
    }

    #[tokio::test]
    async fn filter_values_excludes_null_and_zero_count_rows() {
        let client = Arc::new(MockClient {
            rows_by_field: HashMap::from([(
                "orders.region".to_string(),
                vec![
                    row(&[("orders.region", json!("East")), ("count", json!(10))]),
                    row(&[("orders.region", json!("West")), ("count", json!(0))]),
                    row(&[("orders.region", json!(null)), ("count", json!(4))]),
                    row(&[("orders.region", json!("null")), ("count", json!(3))]),
                    row(&[("orders.region", json!("South")), ("count", json!(2))]),
                ],
            )]),
            ..MockClient::default()
        });
        let config = WorkflowConfig {
            model: Some("orders".to_string()),
            explore: Some("orders_explore".to_string()),
            ..WorkflowConfig::default()
        };
        let svc = service(client.clone(), config);

        let results = svc
            .filter_values(&["orders.region".to_string()], None)
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].dimension, "orders.region");
        assert_eq!(
            results[0].values,
            vec!["East (10)".to_string(), "South (2)".to_string()]
        );

        let created = &client.state().created_queries[0];
        assert_eq!(created.sorts, vec!["count desc".to_string()]);
        assert_eq!(created.limit.as_deref(), Some("300"));
    }

    #[tokio::test]
    async fn filter_values_honors_the_configured_limit() {
        let client = Arc::new(MockClient {
            rows_by_field: HashMap::from([(
                "orders.region".to_string(),
                vec![
                    row(&[("orders.region", json!("East")), ("count", json!(10))]),
                    row(&[("orders.region", json!("South")), ("count", json!(2))]),
                ],
            )]),
            ..MockClient::default()
        });
        let config = WorkflowConfig {
            limit_results: Some(1),
            ..WorkflowConfig::default()
        };
        let svc = service(client, config);

        let results = svc
            .filter_values(&["orders.region".to_string()], None)
            .await
            .unwrap();
        assert_eq!(results[0].values, vec!["East (10)".to_string()]);
    }

    #[tokio::test]
    async fn filter_values_degrades_per_dimension() {
        let client = Arc::new(MockClient {
            fail_create_for_field: Some("bad.dim".to_string()),
            rows_by_field: HashMap::from([(
                "orders.region".to_string(),
                vec![row(&[("orders.region", json!("East")), ("count", json!(10))])],
            )]),
            ..MockClient::default()
        });
        let svc = service(client, WorkflowConfig::default());

        let results = svc
            .filter_values(
                &["bad.dim".to_string(), "orders.region".to_string()],
                None,
            )
            .await
            .unwrap();

        assert_eq!(results[0].dimension, "bad.dim");
        assert!(results[0].values.is_empty());
        assert_eq!(results[1].values, vec!["East (10)".to_string()]);
    }

    #[tokio::test]
    async fn date_range_counts_without_date_field_issues_no_queries() {
        let client = Arc::new(MockClient::default());
        let svc = service(client.clone(), WorkflowConfig::default());

        let results = svc
            .date_range_counts(&["orders.order_date".to_string()], None)
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert!(results[0].counts.is_empty());
        assert_eq!(client.state().calls, 0);
    }

    #[tokio::test]
    async fn date_range_counts_covers_the_fixed_ranges() {
        let client = Arc::new(MockClient {
            rows_by_field: HashMap::from([
                (
                    "orders.created_date".to_string(),
                    vec![row(&[("orders.created_date", json!("2024-05-01"))])],
                ),
                ("count".to_string(), vec![row(&[("count", json!(7))])]),
            ]),
            ..MockClient::default()
        });
        let config = WorkflowConfig {
            date_field: Some("orders.created_date".to_string()),
            ..WorkflowConfig::default()
        };
        let svc = service(client, config);

        let results = svc
            .date_range_counts(
                &["orders.order_date".to_string(), "orders.region".to_string()],
                None,
            )
            .await
            .unwrap();

        assert_eq!(results[0].counts.len(), 5);
        assert_eq!(results[0].counts.get("last 1 month"), Some(&7));
        assert_eq!(results[0].counts.get("last 5 years"), Some(&7));
        assert!(results[1].counts.is_empty());
    }

    #[tokio::test]
    async fn listeners_append_missing_selections() {
        let element = DashboardElement {
            id: "el1".to_string(),
            result_maker: Some(ResultMaker {
                filterables: vec![Filterable::default()],
                ..ResultMaker::default()
            }),
            ..DashboardElement::default()
        };
        let client = Arc::new(MockClient {
            elements: HashMap::from([("d".to_string(), vec![element])]),
            ..MockClient::default()
        });
        let svc = service(client.clone(), WorkflowConfig::default());

        let mut name_map = BTreeMap::new();
        name_map.insert("orders.region".to_string(), "Region".to_string());
        svc.ensure_tile_listeners("d", &["orders.region".to_string()], &name_map)
            .await
            .unwrap();

        let state = client.state();
        assert_eq!(state.element_updates.len(), 1);
        let maker = state.element_updates[0].1.result_maker.as_ref().unwrap();
        assert_eq!(
            maker.filterables[0].listen,
            vec![listener("Region", "orders.region")]
        );
    }

    #[tokio::test]
    async fn listeners_second_call_is_a_noop() {
        let element = DashboardElement {
            id: "el1".to_string(),
            result_maker: Some(ResultMaker {
                filterables: vec![Filterable {
                    listen: vec![listener("Region", "orders.region")],
                    ..Filterable::default()
                }],
                ..ResultMaker::default()
            }),
            ..DashboardElement::default()
        };
        let client = Arc::new(MockClient {
            elements: HashMap::from([("d".to_string(), vec![element])]),
            ..MockClient::default()
        });
        let svc = service(client.clone(), WorkflowConfig::default());

        let mut name_map = BTreeMap::new();
        name_map.insert("orders.region".to_string(), "Region".to_string());
        svc.ensure_tile_listeners("d", &["orders.region".to_string()], &name_map)
            .await
            .unwrap();

        assert!(client.state().element_updates.is_empty());
    }

    #[tokio::test]
    async fn save_copy_refuses_an_existing_name() {
        let client = Arc::new(MockClient {
            summaries: vec![summary("d1", "Saved", "f1", false)],
            ..MockClient::default()
        });
        let svc = service(client.clone(), WorkflowConfig::default());

        let err = svc
            .save_dashboard_copy("cur", "f1", "Saved")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        assert!(client.state().copies.is_empty());
    }

    #[tokio::test]
    async fn save_copy_copies_and_renames() {
        let client = Arc::new(MockClient::default());
        let svc = service(client.clone(), WorkflowConfig::default());

        let id = svc.save_dashboard_copy("cur", "f1", "Saved").await.unwrap();
        assert_eq!(id, "copy-1");
        let state = client.state();
        assert_eq!(state.copies, vec![("cur".to_string(), "f1".to_string())]);
        assert_eq!(
            state.dashboard_updates,
            vec![("copy-1".to_string(), Some("Saved".to_string()))]
        );
    }

    #[tokio::test]
    async fn list_for_ui_appends_the_original_and_skips_deleted() {
        let client = Arc::new(MockClient {
            summaries: vec![
                summary("d1", "First", "f", false),
                summary("d2", "Gone", "f", true),
            ],
            dashboards: HashMap::from([(
                "orig".to_string(),
                Dashboard {
                    id: Some("orig".to_string()),
                    title: Some("Original".to_string()),
                    ..Dashboard::default()
                },
            )]),
            ..MockClient::default()
        });
        let svc = service(client, WorkflowConfig::default());

        let dashboards = svc.dashboard_list_for_ui("f", Some("orig")).await.unwrap();
        assert_eq!(
            dashboards,
            vec![
                DashboardListEntry {
                    id: "d1".to_string(),
                    title: Some("First".to_string()),
                },
                DashboardListEntry {
                    id: "orig".to_string(),
                    title: Some("Original".to_string()),
                },
            ]
        );
    }

    #[tokio::test]
    async fn tiles_with_results_skips_grids_and_merges_filters() {
        let dashboard = Dashboard {
            id: Some("d".to_string()),
            title: Some("Dash".to_string()),
            dashboard_elements: vec![
                DashboardElement {
                    id: "el1".to_string(),
                    title: Some("Trend".to_string()),
                    query_id: Some("q1".to_string()),
                    ..DashboardElement::default()
                },
                DashboardElement {
                    id: "el2".to_string(),
                    title: Some("Grid".to_string()),
                    query_id: Some("q2".to_string()),
                    query: Some(Query {
                        id: "q2".to_string(),
                        vis_config: Some(json!({ "type": "table" })),
                        ..Query::default()
                    }),
                    ..DashboardElement::default()
                },
            ],
            ..Dashboard::default()
        };
        let mut queries = HashMap::new();
        queries.insert(
            "q1".to_string(),
            Query {
                id: "q1".to_string(),
                model: Some("orders".to_string()),
                view: Some("orders_explore".to_string()),
                fields: vec!["orders.region".to_string()],
                filters: Some(BTreeMap::from([
                    ("orders.region".to_string(), "old".to_string()),
                    ("orders.kept".to_string(), "yes".to_string()),
                ])),
                ..Query::default()
            },
        );

        let rows = vec![row(&[("orders.region", json!("East"))])];
        let client = Arc::new(MockClient {
            dashboards: HashMap::from([("d".to_string(), dashboard)]),
            queries,
            rows_by_field: HashMap::from([("orders.region".to_string(), rows.clone())]),
            ..MockClient::default()
        });
        let svc = service(client.clone(), WorkflowConfig::default());

        let final_filters = BTreeMap::from([("orders.region".to_string(), "new".to_string())]);
        let result = svc
            .dashboard_tiles_with_results("d", &final_filters)
            .await
            .unwrap();

        assert_eq!(result.dashboard.id, "d");
        assert_eq!(result.tiles.len(), 1);
        assert_eq!(result.tiles[0].title, "Trend");
        assert_eq!(result.tiles[0].query_id, "q1");
        assert_eq!(result.tiles[0].data, rows);

        let created = &client.state().created_queries[0];
        let filters = created.filters.as_ref().unwrap();
        assert_eq!(filters.get("orders.region"), Some(&"new".to_string()));
        assert_eq!(filters.get("orders.kept"), Some(&"yes".to_string()));
    }

    #[tokio::test]
    async fn explore_export_groups_matching_dashboards() {
        let client = Arc::new(MockClient {
            explore: Some(ExploreDescription {
                id: Some("orders::orders_export_a".to_string()),
                fields: ExploreFields {
                    measures: vec![ExploreFieldDef {
                        suggest_dimension: Some("orders.total".to_string()),
                        measure: Some(true),
                    }],
                    dimensions: vec![ExploreFieldDef {
                        suggest_dimension: Some("orders.region".to_string()),
                        measure: None,
                    }],
                },
            }),
            all: vec![
                summary("acme::voucher_1", "A", "f", false),
                summary("other::report", "B", "f", false),
            ],
            ..MockClient::default()
        });
        let store = Arc::new(RecordingStore::default());
        let config = WorkflowConfig {
            export_marker: Some("acme".to_string()),
            ..WorkflowConfig::default()
        };
        let svc = DashboardService::new(client, store.clone(), config);

        let export = svc
            .save_explore_measures("orders", "orders_export_a")
            .await
            .unwrap();

        assert_eq!(export.dashboard_ids, vec!["acme::voucher_1".to_string()]);
        assert_eq!(export.store_outcome, StoreOutcome::Stored);

        let upserts = store.upserts.lock().unwrap();
        assert_eq!(upserts.len(), 1);
        assert_eq!(upserts[0].0, "configs/explore-measures");
        let entry = &upserts[0].1["acme"]["dashboard1"];
        assert_eq!(entry["dashboard_id"], json!("acme::voucher_1"));
        assert_eq!(entry["model_name"], json!("orders"));
        assert_eq!(entry["explore_name"], json!("orders_export_a"));
        assert_eq!(entry["fields"].as_array().unwrap().len(), 2);

        std::fs::remove_file(&export.file_path).unwrap();
    }

    #[tokio::test]
    async fn explore_export_fails_without_matching_dashboards() {
        let client = Arc::new(MockClient {
            explore: Some(ExploreDescription {
                id: Some("orders::orders_export_b".to_string()),
                ..ExploreDescription::default()
            }),
            all: vec![summary("other::report", "B", "f", false)],
            ..MockClient::default()
        });
        let config = WorkflowConfig {
            export_marker: Some("acme".to_string()),
            ..WorkflowConfig::default()
        };
        let svc = service(client, config);

        let err = svc
            .save_explore_measures("orders", "orders_export_b")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }
}

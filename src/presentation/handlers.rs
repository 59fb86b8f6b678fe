// HTTP request handlers - thin adapters around the workflow service
use crate::application::dashboard_service::DashboardService;
use crate::application::errors::ServiceError;
use crate::infrastructure::config::{resolve_workflow_config, WorkflowConfig};
use crate::presentation::app_state::AppState;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (
            status,
            Json(json!({ "success": false, "error": self.to_string() })),
        )
            .into_response()
    }
}

type HandlerResult = Result<Json<Value>, ServiceError>;

#[derive(Debug, Default, Deserialize)]
pub struct ConfigQuery {
    pub config: Option<String>,
}

/// Parse the `config` query parameter into per-request overrides.
fn parse_overrides(raw: Option<&str>) -> Result<WorkflowConfig, ServiceError> {
    let Some(raw) = raw else {
        return Ok(WorkflowConfig::default());
    };
    serde_json::from_str(raw).map_err(|_| {
        ServiceError::Validation("invalid config value; expected a JSON string".into())
    })
}

fn service_for(state: &AppState, overrides: WorkflowConfig) -> DashboardService {
    let config = resolve_workflow_config(&state.workflow_defaults, overrides);
    DashboardService::new(state.client.clone(), state.store.clone(), config)
}

/// Liveness banner
pub async fn root() -> &'static str {
    "Dashboard workbench is up and running"
}

pub async fn health_check() -> Json<Value> {
    Json(json!({ "status": "OK", "timestamp": chrono::Utc::now().to_rfc3339() }))
}

pub async fn personal_folder(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConfigQuery>,
) -> HandlerResult {
    let service = service_for(&state, parse_overrides(query.config.as_deref())?);
    let folder_id = service.personal_folder_id().await?;
    Ok(Json(json!({ "success": true, "folderId": folder_id })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyDashboardRequest {
    pub original_dashboard_id: Option<String>,
    pub user_dashboard_folder_id: Option<String>,
    pub original_dashboard_copy_title: Option<String>,
}

pub async fn copy_dashboard(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CopyDashboardRequest>,
) -> HandlerResult {
    let (Some(original_id), Some(folder_id)) =
        (body.original_dashboard_id, body.user_dashboard_folder_id)
    else {
        return Err(ServiceError::Validation(
            "both originalDashboardId and userDashboardFolderId are required".into(),
        ));
    };
    let Some(copy_title) = body.original_dashboard_copy_title else {
        return Err(ServiceError::Validation(
            "originalDashboardCopyTitle is required".into(),
        ));
    };

    let service = service_for(&state, WorkflowConfig::default());
    let dashboard_id = service
        .ensure_dashboard_copy_in_folder(&original_id, &folder_id, &copy_title)
        .await?;
    Ok(Json(json!({ "success": true, "dashboardId": dashboard_id })))
}

/// A folder path arrives either pre-split or as a `/`-delimited string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum PathSegments {
    Joined(String),
    Segments(Vec<String>),
}

impl PathSegments {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::Joined(path) => path.split('/').map(str::to_string).collect(),
            Self::Segments(segments) => segments,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindDashboardRequest {
    pub path: Option<PathSegments>,
    pub original_dashboard_name: Option<String>,
}

pub async fn find_dashboard(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConfigQuery>,
    Json(body): Json<FindDashboardRequest>,
) -> HandlerResult {
    let (Some(path), Some(name)) = (body.path, body.original_dashboard_name) else {
        return Err(ServiceError::Validation(
            "both path and originalDashboardName are required".into(),
        ));
    };

    let service = service_for(&state, parse_overrides(query.config.as_deref())?);
    let dashboard_id = service
        .find_dashboard_in_nested_path(&path.into_vec(), &name)
        .await?;
    Ok(Json(json!({ "success": true, "dashboardId": dashboard_id })))
}

pub async fn get_or_create_folder(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConfigQuery>,
) -> HandlerResult {
    let service = service_for(&state, parse_overrides(query.config.as_deref())?);
    let personal_folder_id = service.personal_folder_id().await?;
    let folder_id = service
        .get_or_create_dashboard_folder(&personal_folder_id)
        .await?;
    Ok(Json(json!({ "success": true, "folderId": folder_id })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDashboardRequest {
    pub current_dashboard_id: Option<String>,
    pub original_dashboard_id: Option<String>,
    pub selected_columns: Option<Vec<String>>,
    pub selected_filter_dimensions: Option<Vec<String>>,
    #[serde(default)]
    pub filters_from_request: BTreeMap<String, String>,
    #[serde(default)]
    pub filter_name_map: BTreeMap<String, String>,
}

pub async fn update_dashboard(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConfigQuery>,
    Json(body): Json<UpdateDashboardRequest>,
) -> HandlerResult {
    let Some(current_id) = body.current_dashboard_id else {
        return Err(ServiceError::Validation(
            "currentDashboardId is required".into(),
        ));
    };
    let Some(selected_columns) = body.selected_columns else {
        return Err(ServiceError::Validation(
            "selectedColumns must be an array".into(),
        ));
    };
    let Some(selected_dimensions) = body.selected_filter_dimensions else {
        return Err(ServiceError::Validation(
            "selectedFilterDimensions must be an array".into(),
        ));
    };

    let service = service_for(&state, parse_overrides(query.config.as_deref())?);
    service
        .update_dashboard(
            &current_id,
            body.original_dashboard_id.as_deref().unwrap_or_default(),
            &selected_columns,
            &selected_dimensions,
            &body.filters_from_request,
            &body.filter_name_map,
        )
        .await?;
    Ok(Json(
        json!({ "success": true, "message": "Dashboard updated successfully" }),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardIdRequest {
    pub dashboard_id: Option<String>,
}

pub async fn dashboard_defaults(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConfigQuery>,
    Json(body): Json<DashboardIdRequest>,
) -> HandlerResult {
    let Some(dashboard_id) = body.dashboard_id else {
        return Err(ServiceError::Validation("dashboardId is required".into()));
    };

    let service = service_for(&state, parse_overrides(query.config.as_deref())?);
    let defaults = service
        .default_columns_and_filter_name_map(&dashboard_id, None)
        .await?;
    Ok(Json(json!({
        "success": true,
        "default_columns": defaults.default_columns,
        "filterNameMap": defaults.filter_name_map,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DimensionsRequest {
    #[serde(default)]
    pub dimensions: Vec<String>,
    pub selected_measure: Option<String>,
}

pub async fn filter_values(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConfigQuery>,
    Json(body): Json<DimensionsRequest>,
) -> HandlerResult {
    let service = service_for(&state, parse_overrides(query.config.as_deref())?);
    let values = service
        .filter_values(&body.dimensions, body.selected_measure.as_deref())
        .await?;
    Ok(Json(json!({ "success": true, "values": values })))
}

pub async fn date_range_counts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConfigQuery>,
    Json(body): Json<DimensionsRequest>,
) -> HandlerResult {
    let service = service_for(&state, parse_overrides(query.config.as_deref())?);
    let counts = service
        .date_range_counts(&body.dimensions, body.selected_measure.as_deref())
        .await?;
    Ok(Json(json!({ "success": true, "counts": counts })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveCopyRequest {
    pub current_dashboard_id: Option<String>,
    pub folder_id: Option<String>,
    pub custom_name: Option<String>,
}

pub async fn save_dashboard_copy(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConfigQuery>,
    Json(body): Json<SaveCopyRequest>,
) -> HandlerResult {
    let (Some(current_id), Some(folder_id), Some(custom_name)) =
        (body.current_dashboard_id, body.folder_id, body.custom_name)
    else {
        return Err(ServiceError::Validation(
            "currentDashboardId, folderId, and customName are required".into(),
        ));
    };

    let service = service_for(&state, parse_overrides(query.config.as_deref())?);
    let dashboard_id = service
        .save_dashboard_copy(&current_id, &folder_id, &custom_name)
        .await?;
    Ok(Json(json!({ "success": true, "dashboardId": dashboard_id })))
}

pub async fn dashboard_filters(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConfigQuery>,
    Json(body): Json<DashboardIdRequest>,
) -> HandlerResult {
    let Some(dashboard_id) = body.dashboard_id else {
        return Err(ServiceError::Validation("dashboardId is required".into()));
    };

    let service = service_for(&state, parse_overrides(query.config.as_deref())?);
    let filters = service.dashboard_filters(&dashboard_id).await?;
    Ok(Json(json!({ "success": true, "filters": filters })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderDashboardsQuery {
    pub config: Option<String>,
    pub original_dashboard_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderDashboardsRequest {
    pub folder_id: Option<String>,
}

pub async fn folder_dashboards(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FolderDashboardsQuery>,
    Json(body): Json<FolderDashboardsRequest>,
) -> HandlerResult {
    let Some(folder_id) = body.folder_id else {
        return Err(ServiceError::Validation("folderId is required".into()));
    };

    let service = service_for(&state, parse_overrides(query.config.as_deref())?);
    let dashboards = service
        .dashboard_list_for_ui(&folder_id, query.original_dashboard_id.as_deref())
        .await?;
    Ok(Json(json!({ "success": true, "dashboards": dashboards })))
}

pub async fn dashboard_tiles_with_results(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
    Json(body): Json<DashboardIdRequest>,
) -> HandlerResult {
    let Some(dashboard_id) = body.dashboard_id else {
        return Err(ServiceError::Validation("dashboardId is required".into()));
    };

    let service = service_for(&state, parse_overrides(params.get("config").map(String::as_str))?);

    // Filters come from a `filters` JSON parameter when present, otherwise
    // from the remaining query parameters.
    let final_filters: BTreeMap<String, String> = match params.get("filters") {
        Some(raw) => serde_json::from_str(raw).map_err(|_| {
            ServiceError::Validation("invalid filters format; must be a valid JSON string".into())
        })?,
        None => params
            .iter()
            .filter(|(key, _)| key.as_str() != "config")
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect(),
    };

    let result = service
        .dashboard_tiles_with_results(&dashboard_id, &final_filters)
        .await?;
    Ok(Json(json!({
        "success": true,
        "dashboard": result.dashboard,
        "tiles": result.tiles,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveMeasuresRequest {
    pub model_name: Option<String>,
    pub explore_name: Option<String>,
}

pub async fn save_explore_measures(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConfigQuery>,
    Json(body): Json<SaveMeasuresRequest>,
) -> HandlerResult {
    let (Some(model_name), Some(explore_name)) = (body.model_name, body.explore_name) else {
        return Err(ServiceError::Validation(
            "both modelName and exploreName are required".into(),
        ));
    };

    let service = service_for(&state, parse_overrides(query.config.as_deref())?);
    let export = service
        .save_explore_measures(&model_name, &explore_name)
        .await?;
    Ok(Json(json!({
        "success": true,
        "filePath": export.file_path,
        "dashboardIds": export.dashboard_ids,
        "storeOutcome": export.store_outcome,
    })))
}

// Main entry point - Dependency injection and server setup
mod domain;
mod application;
mod infrastructure;
mod presentation;

use std::{net::SocketAddr, sync::Arc};

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::application::bi_client::BiQueryClient;
use crate::application::document_store::DocumentStoreWriter;
use crate::infrastructure::bi_http_client::HttpBiClient;
use crate::infrastructure::config::{load_service_config, load_workflow_defaults};
use crate::infrastructure::document_writer::HttpDocumentWriter;
use crate::presentation::app_state::AppState;
use crate::presentation::handlers;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Load configuration
    let service_config = load_service_config()?;
    let workflow_defaults = load_workflow_defaults()?;

    // Create outbound adapters (infrastructure layer)
    let client: Arc<dyn BiQueryClient> = Arc::new(HttpBiClient::new(
        &service_config.bi.base_url,
        &service_config.bi.api_token,
        service_config.bi.timeout_secs,
    )?);
    let store: Arc<dyn DocumentStoreWriter> =
        Arc::new(HttpDocumentWriter::new(service_config.store.base_url.clone()));

    // Create application state
    let state = Arc::new(AppState {
        client,
        store,
        workflow_defaults,
    });

    // Build router (presentation layer)
    let router = Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health_check))
        .route("/api/personal-folder", get(handlers::personal_folder))
        .route("/api/dashboard/copy", post(handlers::copy_dashboard))
        .route("/api/dashboard/find", post(handlers::find_dashboard))
        .route("/api/folder/get-or-create", post(handlers::get_or_create_folder))
        .route("/api/dashboard/update", put(handlers::update_dashboard))
        .route("/api/dashboard/defaults", post(handlers::dashboard_defaults))
        .route("/api/filters/values", post(handlers::filter_values))
        .route("/api/filters/date-range-counts", post(handlers::date_range_counts))
        .route("/api/dashboard/save-copy", post(handlers::save_dashboard_copy))
        .route("/api/dashboard/filters", post(handlers::dashboard_filters))
        .route("/api/folder/dashboards", post(handlers::folder_dashboards))
        .route(
            "/api/dashboard/tiles-with-results",
            post(handlers::dashboard_tiles_with_results),
        )
        .route(
            "/api/explore/save-measures",
            post(handlers::save_explore_measures),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr: SocketAddr = SocketAddr::from(([0, 0, 0, 0], service_config.server.port));
    println!("Starting dashboard-workbench service on {}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, router).await?;

    Ok(())
}

// Application state for HTTP handlers
use crate::application::bi_client::BiQueryClient;
use crate::application::document_store::DocumentStoreWriter;
use crate::infrastructure::config::WorkflowConfig;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub client: Arc<dyn BiQueryClient>,
    pub store: Arc<dyn DocumentStoreWriter>,
    pub workflow_defaults: WorkflowConfig,
}

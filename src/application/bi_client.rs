// Capability boundary to the BI platform's query API
use crate::application::errors::ClientError;
use crate::domain::dashboard::{
    Dashboard, DashboardElement, DashboardFilter, DashboardPatch, DashboardSummary, ElementPatch,
    FilterPayload,
};
use crate::domain::explore::ExploreDescription;
use crate::domain::folder::Folder;
use crate::domain::query::{Query, QueryConfig, ResultRow};
use crate::domain::user::User;
use async_trait::async_trait;

pub type ClientResult<T> = Result<T, ClientError>;

#[async_trait]
pub trait BiQueryClient: Send + Sync {
    async fn current_user(&self) -> ClientResult<User>;

    async fn search_folders(
        &self,
        parent_id: Option<&str>,
        name: Option<&str>,
    ) -> ClientResult<Vec<Folder>>;
    async fn create_folder(&self, name: &str, parent_id: &str) -> ClientResult<Folder>;

    /// Partial dashboards; callers filter soft-deleted entries themselves.
    async fn search_dashboards(
        &self,
        folder_id: Option<&str>,
        title: Option<&str>,
    ) -> ClientResult<Vec<DashboardSummary>>;
    async fn all_dashboards(&self) -> ClientResult<Vec<DashboardSummary>>;
    async fn dashboard(&self, dashboard_id: &str) -> ClientResult<Dashboard>;
    async fn copy_dashboard(
        &self,
        dashboard_id: &str,
        folder_id: &str,
    ) -> ClientResult<Dashboard>;
    async fn update_dashboard(
        &self,
        dashboard_id: &str,
        patch: &DashboardPatch,
    ) -> ClientResult<Dashboard>;

    async fn dashboard_elements(&self, dashboard_id: &str)
        -> ClientResult<Vec<DashboardElement>>;
    async fn update_dashboard_element(
        &self,
        element_id: &str,
        patch: &ElementPatch,
    ) -> ClientResult<DashboardElement>;

    async fn query(&self, query_id: &str) -> ClientResult<Query>;
    async fn create_query(&self, config: &QueryConfig) -> ClientResult<Query>;
    /// Structured-result mode: one JSON object per row.
    async fn run_query(&self, query_id: &str) -> ClientResult<Vec<ResultRow>>;

    async fn create_dashboard_filter(
        &self,
        payload: &FilterPayload,
    ) -> ClientResult<DashboardFilter>;
    async fn update_dashboard_filter(
        &self,
        filter_id: &str,
        payload: &FilterPayload,
    ) -> ClientResult<DashboardFilter>;
    async fn delete_dashboard_filter(&self, filter_id: &str) -> ClientResult<()>;

    async fn model_explore(
        &self,
        model_name: &str,
        explore_name: &str,
    ) -> ClientResult<ExploreDescription>;
}

// HTTP adapter for the BI platform's REST API
use crate::application::bi_client::{BiQueryClient, ClientResult};
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
use reqwest::RequestBuilder;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;

const SEARCH_PAGE_SIZE: &str = "200";

#[derive(Debug, Clone)]
pub struct HttpBiClient {
    base_url: String,
    api_token: String,
    http: reqwest::Client,
}

impl HttpBiClient {
    pub fn new(base_url: &str, api_token: &str, timeout_secs: u64) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|err| ClientError::Transport(err.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token: api_token.to_string(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Build a `?key=value` query string from present parameters.
    fn query_string(params: &[(&str, Option<&str>)]) -> String {
        let mut parts: Vec<String> = Vec::new();
        for (key, value) in params {
            if let Some(value) = value {
                parts.push(format!("{key}={}", urlencoding::encode(value)));
            }
        }
        if parts.is_empty() {
            String::new()
        } else {
            format!("?{}", parts.join("&"))
        }
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> ClientResult<T> {
        let response = request
            .header("Authorization", format!("token {}", self.api_token))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|err| ClientError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|err| ClientError::Decode(err.to_string()))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        self.send(self.http.get(self.url(path))).await
    }

    async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> ClientResult<T> {
        self.send(self.http.post(self.url(path)).json(body)).await
    }

    async fn patch<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> ClientResult<T> {
        self.send(self.http.patch(self.url(path)).json(body)).await
    }

    async fn delete(&self, path: &str) -> ClientResult<()> {
        let response = self
            .http
            .delete(self.url(path))
            .header("Authorization", format!("token {}", self.api_token))
            .send()
            .await
            .map_err(|err| ClientError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Api {
                status: status.as_u16(),
                message: body,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl BiQueryClient for HttpBiClient {
    async fn current_user(&self) -> ClientResult<User> {
        self.get("/user").await
    }

    async fn search_folders(
        &self,
        parent_id: Option<&str>,
        name: Option<&str>,
    ) -> ClientResult<Vec<Folder>> {
        let query = Self::query_string(&[
            ("parent_id", parent_id),
            ("name", name),
            ("fields", Some("id,name,parent_id")),
            ("per_page", Some(SEARCH_PAGE_SIZE)),
        ]);
        self.get(&format!("/folders/search{query}")).await
    }

    async fn create_folder(&self, name: &str, parent_id: &str) -> ClientResult<Folder> {
        self.post("/folders", &json!({ "name": name, "parent_id": parent_id }))
            .await
    }

    async fn search_dashboards(
        &self,
        folder_id: Option<&str>,
        title: Option<&str>,
    ) -> ClientResult<Vec<DashboardSummary>> {
        let query = Self::query_string(&[
            ("folder_id", folder_id),
            ("title", title),
            ("fields", Some("id,title,folder_id,deleted")),
            ("per_page", Some(SEARCH_PAGE_SIZE)),
        ]);
        self.get(&format!("/dashboards/search{query}")).await
    }

    async fn all_dashboards(&self) -> ClientResult<Vec<DashboardSummary>> {
        self.get("/dashboards").await
    }

    async fn dashboard(&self, dashboard_id: &str) -> ClientResult<Dashboard> {
        self.get(&format!("/dashboards/{}", urlencoding::encode(dashboard_id)))
            .await
    }

    async fn copy_dashboard(
        &self,
        dashboard_id: &str,
        folder_id: &str,
    ) -> ClientResult<Dashboard> {
        let query = Self::query_string(&[("folder_id", Some(folder_id))]);
        self.post(
            &format!("/dashboards/{}/copy{query}", urlencoding::encode(dashboard_id)),
            &json!({}),
        )
        .await
    }

    async fn update_dashboard(
        &self,
        dashboard_id: &str,
        patch: &DashboardPatch,
    ) -> ClientResult<Dashboard> {
        self.patch(
            &format!("/dashboards/{}", urlencoding::encode(dashboard_id)),
            patch,
        )
        .await
    }

    async fn dashboard_elements(
        &self,
        dashboard_id: &str,
    ) -> ClientResult<Vec<DashboardElement>> {
        self.get(&format!(
            "/dashboards/{}/dashboard_elements",
            urlencoding::encode(dashboard_id)
        ))
        .await
    }

    async fn update_dashboard_element(
        &self,
        element_id: &str,
        patch: &ElementPatch,
    ) -> ClientResult<DashboardElement> {
        self.patch(
            &format!("/dashboard_elements/{}", urlencoding::encode(element_id)),
            patch,
        )
        .await
    }

    async fn query(&self, query_id: &str) -> ClientResult<Query> {
        self.get(&format!("/queries/{}", urlencoding::encode(query_id)))
            .await
    }

    async fn create_query(&self, config: &QueryConfig) -> ClientResult<Query> {
        self.post("/queries", config).await
    }

    async fn run_query(&self, query_id: &str) -> ClientResult<Vec<ResultRow>> {
        self.get(&format!("/queries/{}/run/json", urlencoding::encode(query_id)))
            .await
    }

    async fn create_dashboard_filter(
        &self,
        payload: &FilterPayload,
    ) -> ClientResult<DashboardFilter> {
        self.post("/dashboard_filters", payload).await
    }

    async fn update_dashboard_filter(
        &self,
        filter_id: &str,
        payload: &FilterPayload,
    ) -> ClientResult<DashboardFilter> {
        self.patch(
            &format!("/dashboard_filters/{}", urlencoding::encode(filter_id)),
            payload,
        )
        .await
    }

    async fn delete_dashboard_filter(&self, filter_id: &str) -> ClientResult<()> {
        self.delete(&format!(
            "/dashboard_filters/{}",
            urlencoding::encode(filter_id)
        ))
        .await
    }

    async fn model_explore(
        &self,
        model_name: &str,
        explore_name: &str,
    ) -> ClientResult<ExploreDescription> {
        self.get(&format!(
            "/models/{}/explores/{}",
            urlencoding::encode(model_name),
            urlencoding::encode(explore_name)
        ))
        .await
    }
}

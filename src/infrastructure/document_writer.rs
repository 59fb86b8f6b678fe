// Document store adapter - best-effort JSON upsert over HTTP
use crate::application::document_store::{DocumentStoreWriter, StoreOutcome};
use async_trait::async_trait;
use serde_json::Value;

/// Writes documents to a configured HTTP endpoint. Without a base URL, or
/// when the store is unreachable, every write degrades to a warned no-op.
pub struct HttpDocumentWriter {
    base_url: Option<String>,
    http: reqwest::Client,
}

impl HttpDocumentWriter {
    pub fn new(base_url: Option<String>) -> Self {
        Self {
            base_url: base_url.map(|url| url.trim_end_matches('/').to_string()),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl DocumentStoreWriter for HttpDocumentWriter {
    async fn upsert_document(&self, reference: &str, payload: &Value) -> StoreOutcome {
        let Some(base_url) = self.base_url.as_deref() else {
            tracing::warn!("document store is not configured; skipping write of {reference}");
            return StoreOutcome::Degraded;
        };

        let url = format!("{base_url}/{reference}");
        match self.http.patch(&url).json(payload).send().await {
            Ok(response) if response.status().is_success() => StoreOutcome::Stored,
            Ok(response) => {
                tracing::warn!(
                    "document store rejected {reference} with status {}",
                    response.status()
                );
                StoreOutcome::Degraded
            }
            Err(err) => {
                tracing::warn!("document store unreachable for {reference}: {err}");
                StoreOutcome::Degraded
            }
        }
    }
}

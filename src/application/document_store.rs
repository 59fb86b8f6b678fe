// Best-effort document store boundary
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

/// Mode in which an upsert completed. Unavailability is reported, never
/// silently swallowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreOutcome {
    Stored,
    Degraded,
}

#[async_trait]
pub trait DocumentStoreWriter: Send + Sync {
    /// Upsert a single document at `reference`. An unreachable or
    /// unconfigured store degrades to a warned no-op.
    async fn upsert_document(&self, reference: &str, payload: &Value) -> StoreOutcome;
}

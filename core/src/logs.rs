use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One observed action for an entity. Immutable once loaded; consumed only by
/// the signal extractor, which tolerates any text shape.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LogEvent {
    pub entity_id: String,
    /// Path-like or free-text token, e.g. "/pricing/enterprise".
    pub line: String,
    /// When the action happened, as reported by the loader. Optional: some
    /// sources only ship the path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_at: Option<DateTime<Utc>>,
}

/// One raw line in a bulk-load batch.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct LogLine {
    pub line: String,
    #[serde(default)]
    pub observed_at: Option<DateTime<Utc>>,
}

/// Bulk-load request: the ingestion loader's boundary with the core.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct LoadLogsRequest {
    pub entity_id: String,
    pub lines: Vec<LogLine>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoadLogsResponse {
    pub inserted: usize,
}

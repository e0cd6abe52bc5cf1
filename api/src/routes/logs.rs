use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use signaldesk_core::error::ApiError;
use signaldesk_core::logs::{LoadLogsRequest, LoadLogsResponse, LogEvent};

use crate::error::AppError;
use crate::state::AppState;

const MAX_BATCH_SIZE: usize = 500;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/logs", get(list_logs))
        .route("/v1/logs/batch", post(load_logs))
}

fn validate_entity_id(raw: &str) -> Result<String, AppError> {
    let entity_id = raw.trim();
    if entity_id.is_empty() {
        return Err(AppError::Validation {
            message: "entity_id must not be empty".to_string(),
            field: Some("entity_id".to_string()),
            received: Some(serde_json::Value::String(raw.to_string())),
            docs_hint: Some("Use the stable identifier of the organization.".to_string()),
        });
    }
    Ok(entity_id.to_string())
}

fn validate_batch(req: &LoadLogsRequest) -> Result<(), AppError> {
    if req.lines.is_empty() {
        return Err(AppError::Validation {
            message: "lines array must not be empty".to_string(),
            field: Some("lines".to_string()),
            received: None,
            docs_hint: Some("Provide at least one raw log line in the batch".to_string()),
        });
    }
    if req.lines.len() > MAX_BATCH_SIZE {
        return Err(AppError::Validation {
            message: format!(
                "Batch size {} exceeds maximum of {}",
                req.lines.len(),
                MAX_BATCH_SIZE
            ),
            field: Some("lines".to_string()),
            received: Some(serde_json::json!(req.lines.len())),
            docs_hint: Some(format!(
                "Split large batches into chunks of {MAX_BATCH_SIZE} or fewer"
            )),
        });
    }
    for (i, line) in req.lines.iter().enumerate() {
        if line.line.trim().is_empty() {
            return Err(AppError::Validation {
                message: format!("lines[{i}].line must not be empty"),
                field: Some(format!("lines[{i}].line")),
                received: None,
                docs_hint: None,
            });
        }
    }
    Ok(())
}

/// Bulk-load raw log lines for an entity
///
/// This is the ingestion loader's boundary: a scheduled job pages the source
/// API, then posts the collected lines here in batches. Lines are stored
/// as-is; signal extraction happens at decision time and tolerates any text.
#[utoipa::path(
    post,
    path = "/v1/logs/batch",
    request_body = LoadLogsRequest,
    responses(
        (status = 201, description = "Lines loaded", body = LoadLogsResponse),
        (status = 400, description = "Validation error", body = ApiError)
    ),
    tag = "logs"
)]
pub async fn load_logs(
    State(state): State<AppState>,
    Json(req): Json<LoadLogsRequest>,
) -> Result<impl IntoResponse, AppError> {
    let entity_id = validate_entity_id(&req.entity_id)?;
    validate_batch(&req)?;

    let mut tx = state.db.begin().await?;
    for line in &req.lines {
        sqlx::query(
            r#"
            INSERT INTO entity_logs (id, entity_id, line, observed_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(&entity_id)
        .bind(&line.line)
        .bind(line.observed_at)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    tracing::info!(entity_id = %entity_id, inserted = req.lines.len(), "log batch loaded");

    Ok((
        StatusCode::CREATED,
        Json(LoadLogsResponse {
            inserted: req.lines.len(),
        }),
    ))
}

/// Query parameters for listing raw log lines
#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct ListLogsParams {
    /// Entity whose lines to return
    pub entity_id: String,
    /// Maximum number of lines to return (default 100, max 1000)
    #[serde(default)]
    pub limit: Option<i64>,
}

/// List raw log lines for an entity, oldest first
#[utoipa::path(
    get,
    path = "/v1/logs",
    params(ListLogsParams),
    responses(
        (status = 200, description = "Raw log lines", body = Vec<LogEvent>),
        (status = 400, description = "Validation error", body = ApiError)
    ),
    tag = "logs"
)]
pub async fn list_logs(
    State(state): State<AppState>,
    Query(params): Query<ListLogsParams>,
) -> Result<Json<Vec<LogEvent>>, AppError> {
    let entity_id = validate_entity_id(&params.entity_id)?;
    let limit = params.limit.unwrap_or(100).clamp(1, 1000);

    let rows = sqlx::query_as::<_, EntityLogRow>(
        r#"
        SELECT entity_id, line, observed_at
        FROM entity_logs
        WHERE entity_id = $1
        ORDER BY created_at ASC, id ASC
        LIMIT $2
        "#,
    )
    .bind(&entity_id)
    .bind(limit)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(rows.into_iter().map(EntityLogRow::into_event).collect()))
}

/// Internal row type for sqlx mapping
#[derive(sqlx::FromRow)]
struct EntityLogRow {
    entity_id: String,
    line: String,
    observed_at: Option<DateTime<Utc>>,
}

impl EntityLogRow {
    fn into_event(self) -> LogEvent {
        LogEvent {
            entity_id: self.entity_id,
            line: self.line,
            observed_at: self.observed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AppError, MAX_BATCH_SIZE, validate_batch, validate_entity_id};
    use signaldesk_core::logs::{LoadLogsRequest, LogLine};

    fn request(lines: Vec<&str>) -> LoadLogsRequest {
        LoadLogsRequest {
            entity_id: "acme".to_string(),
            lines: lines
                .into_iter()
                .map(|line| LogLine {
                    line: line.to_string(),
                    observed_at: None,
                })
                .collect(),
        }
    }

    #[test]
    fn entity_id_must_not_be_blank() {
        let err = validate_entity_id("   ").expect_err("blank entity_id must fail");
        match err {
            AppError::Validation { field, .. } => assert_eq!(field.as_deref(), Some("entity_id")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn entity_id_is_trimmed() {
        assert_eq!(validate_entity_id("  acme  ").unwrap(), "acme");
    }

    #[test]
    fn batch_rejects_empty_and_oversized_input() {
        assert!(validate_batch(&request(vec![])).is_err());

        let oversized = request(vec!["/pricing"; MAX_BATCH_SIZE + 1]);
        assert!(validate_batch(&oversized).is_err());

        assert!(validate_batch(&request(vec!["/pricing"])).is_ok());
    }

    #[test]
    fn batch_rejects_blank_lines_with_their_index() {
        let err = validate_batch(&request(vec!["/pricing", "  "])).expect_err("blank line");
        match err {
            AppError::Validation { field, .. } => {
                assert_eq!(field.as_deref(), Some("lines[1].line"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}

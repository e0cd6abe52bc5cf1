use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use signaldesk_core::compose::compose_decision;
use signaldesk_core::decision::CreateDecisionRequest;
use signaldesk_core::error::ApiError;
use signaldesk_core::signals::extract_signals;
use signaldesk_core::store::{DecisionRecord, DraftStatus, DraftStore, NewDecisionRecord};

use crate::error::AppError;
use crate::state::AppState;
use crate::store::PgDraftStore;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/decisions", get(list_decisions).post(create_decision))
        .route("/v1/decisions/{decision_id}", get(get_decision))
}

fn require_non_empty(raw: &str, field: &'static str) -> Result<String, AppError> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(AppError::Validation {
            message: format!("{field} must not be empty"),
            field: Some(field.to_string()),
            received: Some(serde_json::Value::String(raw.to_string())),
            docs_hint: None,
        });
    }
    Ok(value.to_string())
}

fn validate_lead_email(raw: &str) -> Result<String, AppError> {
    let email = require_non_empty(raw, "lead_email")?;
    let valid = match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.'),
        None => false,
    };
    if !valid {
        return Err(AppError::Validation {
            message: "lead_email must be a valid email address".to_string(),
            field: Some("lead_email".to_string()),
            received: Some(serde_json::Value::String(raw.to_string())),
            docs_hint: Some("e.g. 'jane@example.com'".to_string()),
        });
    }
    Ok(email)
}

fn parse_status_filter(raw: Option<&str>) -> Result<Option<DraftStatus>, AppError> {
    match raw {
        None => Ok(None),
        Some(value) => value.parse().map(Some).map_err(|_| AppError::Validation {
            message: format!("unknown status '{value}'"),
            field: Some("status".to_string()),
            received: Some(serde_json::Value::String(value.to_string())),
            docs_hint: Some("Valid statuses: PENDING, DRAFT_CREATED, FAILED".to_string()),
        }),
    }
}

async fn stored_log_lines(pool: &sqlx::PgPool, entity_id: &str) -> Result<Vec<String>, AppError> {
    let lines = sqlx::query_scalar::<_, String>(
        r#"
        SELECT line
        FROM entity_logs
        WHERE entity_id = $1
        ORDER BY created_at ASC, id ASC
        "#,
    )
    .bind(entity_id)
    .fetch_all(pool)
    .await?;
    Ok(lines)
}

/// Derive and persist a decision for one entity
///
/// Extracts signal tags from the supplied (or stored) log lines, resolves
/// them to exactly one category with a bounded propensity score, generates
/// subject/body/reasoning copy, validates the result, and persists it as a
/// PENDING decision record. An empty log yields the neutral bucket rather
/// than an error; a copy-generation or validation failure persists nothing.
#[utoipa::path(
    post,
    path = "/v1/decisions",
    request_body = CreateDecisionRequest,
    responses(
        (status = 201, description = "Decision record created", body = DecisionRecord),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 409, description = "Record id collision", body = ApiError),
        (status = 422, description = "Composition failed", body = ApiError)
    ),
    tag = "decisions"
)]
pub async fn create_decision(
    State(state): State<AppState>,
    Json(req): Json<CreateDecisionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let entity_id = require_non_empty(&req.entity_id, "entity_id")?;
    let entity_name = require_non_empty(&req.entity_name, "entity_name")?;
    let lead_email = validate_lead_email(&req.lead_email)?;

    let lines = match req.log_lines {
        Some(lines) => lines,
        None => stored_log_lines(&state.db, &entity_id).await?,
    };

    let tags = extract_signals(&lines);
    let decision = compose_decision(state.generator.as_ref(), &entity_name, &tags).await?;

    tracing::info!(
        entity_id = %entity_id,
        category = %decision.category,
        propensity_score = decision.propensity_score,
        tag_count = tags.len(),
        "decision composed"
    );

    let store = PgDraftStore::new(state.db.clone());
    let record = store
        .create(NewDecisionRecord {
            entity_id,
            entity_name,
            lead_email,
            decision,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(record)))
}

/// Query parameters for listing decision records
#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct ListDecisionsParams {
    /// Filter by lifecycle status (PENDING, DRAFT_CREATED, FAILED)
    #[serde(default)]
    pub status: Option<String>,
    /// Maximum number of records to return (default 50, max 200)
    #[serde(default)]
    pub limit: Option<i64>,
}

/// List decision records, newest first
#[utoipa::path(
    get,
    path = "/v1/decisions",
    params(ListDecisionsParams),
    responses(
        (status = 200, description = "Decision records", body = Vec<DecisionRecord>),
        (status = 400, description = "Validation error", body = ApiError)
    ),
    tag = "decisions"
)]
pub async fn list_decisions(
    State(state): State<AppState>,
    Query(params): Query<ListDecisionsParams>,
) -> Result<Json<Vec<DecisionRecord>>, AppError> {
    let status = parse_status_filter(params.status.as_deref())?;
    let limit = params.limit.unwrap_or(50).clamp(1, 200);

    let store = PgDraftStore::new(state.db.clone());
    let records = store.list(status, limit).await?;
    Ok(Json(records))
}

/// Fetch one decision record by id
#[utoipa::path(
    get,
    path = "/v1/decisions/{decision_id}",
    params(
        ("decision_id" = Uuid, Path, description = "Decision record id")
    ),
    responses(
        (status = 200, description = "Decision record", body = DecisionRecord),
        (status = 404, description = "Record not found", body = ApiError)
    ),
    tag = "decisions"
)]
pub async fn get_decision(
    State(state): State<AppState>,
    Path(decision_id): Path<Uuid>,
) -> Result<Json<DecisionRecord>, AppError> {
    let store = PgDraftStore::new(state.db.clone());
    match store.get(decision_id).await? {
        Some(record) => Ok(Json(record)),
        None => Err(AppError::NotFound {
            resource: format!("decision record {decision_id}"),
        }),
    }
}

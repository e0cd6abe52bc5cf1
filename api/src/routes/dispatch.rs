use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};

use signaldesk_core::dispatch::{DispatchReport, run_dispatch};
use signaldesk_core::error::ApiError;

use crate::error::AppError;
use crate::state::AppState;
use crate::store::PgDraftStore;

pub fn router() -> Router<AppState> {
    Router::new().route("/v1/dispatch/run", post(run_dispatch_pass))
}

/// Run one dispatch pass over all PENDING decision records
///
/// Acquires the mail credential once, then claims and drafts each record
/// independently: a record another run already claimed is skipped, and one
/// record's failure never stops the rest. Safe to invoke concurrently or on
/// overlapping schedules; each record's external draft is created at most
/// once.
#[utoipa::path(
    post,
    path = "/v1/dispatch/run",
    responses(
        (status = 200, description = "Dispatch pass complete", body = DispatchReport),
        (status = 502, description = "Credential acquisition failed", body = ApiError)
    ),
    tag = "dispatch"
)]
pub async fn run_dispatch_pass(
    State(state): State<AppState>,
) -> Result<Json<DispatchReport>, AppError> {
    let store = PgDraftStore::new(state.db.clone());
    let report = run_dispatch(&store, state.mailer.as_ref()).await?;
    Ok(Json(report))
}

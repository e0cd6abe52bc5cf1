use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use signaldesk_core::compose::CompositionError;
use signaldesk_core::dispatch::DispatchError;
use signaldesk_core::error::{self, ApiError};
use signaldesk_core::store::StoreError;

/// Internal error type that converts to structured API responses
#[derive(Debug)]
pub enum AppError {
    /// Validation error (400)
    Validation {
        message: String,
        field: Option<String>,
        received: Option<serde_json::Value>,
        docs_hint: Option<String>,
    },
    /// Resource does not exist (404)
    NotFound { resource: String },
    /// Id collision on create (409)
    Conflict { message: String },
    /// Decision failed schema validation; nothing was persisted (422)
    Composition(CompositionError),
    /// Credential acquisition failed; the dispatch run never started (502)
    Credential(String),
    /// Database error (500)
    Database(sqlx::Error),
    /// Internal error (500)
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // TODO: extract request_id from extensions once middleware is wired
        let request_id = uuid::Uuid::now_v7().to_string();

        let (status, api_error) = match self {
            AppError::Validation {
                message,
                field,
                received,
                docs_hint,
            } => (
                StatusCode::BAD_REQUEST,
                ApiError {
                    error: error::codes::VALIDATION_FAILED.to_string(),
                    message,
                    field,
                    received,
                    request_id,
                    docs_hint,
                },
            ),
            AppError::NotFound { resource } => (
                StatusCode::NOT_FOUND,
                ApiError {
                    error: error::codes::NOT_FOUND.to_string(),
                    message: format!("{resource} not found"),
                    field: None,
                    received: None,
                    request_id,
                    docs_hint: None,
                },
            ),
            AppError::Conflict { message } => (
                StatusCode::CONFLICT,
                ApiError {
                    error: error::codes::CONFLICT.to_string(),
                    message,
                    field: None,
                    received: None,
                    request_id,
                    docs_hint: Some(
                        "Regenerate the record id and retry the create.".to_string(),
                    ),
                },
            ),
            AppError::Composition(err) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ApiError {
                    error: error::codes::COMPOSITION_FAILED.to_string(),
                    message: err.to_string(),
                    field: None,
                    received: None,
                    request_id,
                    docs_hint: Some(
                        "The generated decision violated the output contract; no record was persisted."
                            .to_string(),
                    ),
                },
            ),
            AppError::Credential(message) => (
                StatusCode::BAD_GATEWAY,
                ApiError {
                    error: error::codes::CREDENTIAL_FAILED.to_string(),
                    message,
                    field: None,
                    received: None,
                    request_id,
                    docs_hint: Some(
                        "The dispatch run aborted before touching any record; retry after fixing the mail credentials."
                            .to_string(),
                    ),
                },
            ),
            AppError::Database(err) => {
                tracing::error!("Database error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError {
                        error: error::codes::INTERNAL_ERROR.to_string(),
                        message: "An internal error occurred".to_string(),
                        field: None,
                        received: None,
                        request_id,
                        docs_hint: None,
                    },
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError {
                        error: error::codes::INTERNAL_ERROR.to_string(),
                        message: "An internal error occurred".to_string(),
                        field: None,
                        received: None,
                        request_id,
                        docs_hint: None,
                    },
                )
            }
        };

        (status, Json(api_error)).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err)
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateId(id) => AppError::Conflict {
                message: format!("decision record {id} already exists"),
            },
            StoreError::Backend(message) => AppError::Internal(message),
        }
    }
}

impl From<CompositionError> for AppError {
    fn from(err: CompositionError) -> Self {
        AppError::Composition(err)
    }
}

impl From<DispatchError> for AppError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Credential(source) => AppError::Credential(source.to_string()),
            DispatchError::Store(source) => source.into(),
        }
    }
}

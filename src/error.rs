//! Typed errors and HTTP mapping.

use axum::{
    extract::rejection::{FormRejection, JsonRejection, QueryRejection},
    http::{header::WWW_AUTHENTICATE, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing setting: {0}")]
    Missing(&'static str),
    #[error("invalid setting {key}: {message}")]
    Invalid { key: &'static str, message: String },
    #[error("duplicate path segment: {0}")]
    DuplicatePathSegment(String),
    #[error("path segment '{0}' is reserved")]
    ReservedPathSegment(String),
    #[error("invalid field path '{0}'")]
    InvalidFieldPath(String),
    #[error("catalog load: {0}")]
    Load(String),
}

/// Failures reported by a document store backend.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("duplicate key {key} in {collection}")]
    Duplicate { collection: String, key: String },
    #[error("unknown collection: {0}")]
    UnknownCollection(String),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("corrupt document in {collection}: {message}")]
    Corrupt { collection: String, message: String },
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("validation: {0}")]
    Validation(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("incorrect username or password")]
    InvalidCredentials,
    #[error("could not validate credentials: {0}")]
    Unauthorized(String),
    #[error("inactive account: {0}")]
    InactiveAccount(String),
    #[error("not enough permissions: requires scope {0}")]
    Forbidden(String),
    #[error("record was written but could not be read back from {0}")]
    AddFailed(String),
    #[error("store: {0}")]
    Store(StoreError),
    #[error("internal: {0}")]
    Internal(String),
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Duplicate { collection, key } => {
                AppError::Conflict(format!("{} already holds a record with the same {}", collection, key))
            }
            other => AppError::Store(other),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(e: JsonRejection) -> Self {
        AppError::Validation(e.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(e: QueryRejection) -> Self {
        AppError::Validation(e.body_text())
    }
}

impl From<FormRejection> for AppError {
    fn from(e: FormRejection) -> Self {
        AppError::Validation(e.body_text())
    }
}

impl AppError {
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            AppError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_error"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            AppError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "invalid_credentials"),
            AppError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            AppError::InactiveAccount(_) => (StatusCode::UNAUTHORIZED, "inactive_account"),
            AppError::Forbidden(_) => (StatusCode::UNAUTHORIZED, "forbidden"),
            AppError::AddFailed(_) => (StatusCode::INTERNAL_SERVER_ERROR, "add_failed"),
            AppError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "store_error"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(error = %self, code, "request failed");
        } else {
            tracing::debug!(error = %self, code, "request rejected");
        }
        let challenge = match &self {
            AppError::Forbidden(scope) => format!("Bearer scope=\"{}\"", scope),
            _ => "Bearer".to_string(),
        };
        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = (status, Json(body)).into_response();
        if status == StatusCode::UNAUTHORIZED {
            if let Ok(v) = HeaderValue::from_str(&challenge) {
                response.headers_mut().insert(WWW_AUTHENTICATE, v);
            }
        }
        response
    }
}

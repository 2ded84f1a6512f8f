//! Unified error handling for route handlers.
//!
//! Stock and search failures are absorbed into empty results further down
//! and never reach this type; what is left are client mistakes and the
//! category lookup that a page cannot render without.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::catalog::api::SearchError;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Catalog service failed while loading a category.
    #[error("Catalog error: {0}")]
    Catalog(#[from] SearchError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Catalog(_) => StatusCode::BAD_GATEWAY,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "Request error");
        } else {
            tracing::debug!(error = %self, "Request rejected");
        }

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

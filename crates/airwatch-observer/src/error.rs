//! Error types for the Observer API server.
//!
//! [`ObserverError`] unifies request failures into a single enum that is
//! converted into an Axum HTTP response via its
//! [`IntoResponse`](axum::response::IntoResponse) implementation. Every
//! error body has the shape `{"error": "...", "status": 400}`.

use airwatch_core::GatewayError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::debug;

/// Errors that can occur in the Observer API layer.
#[derive(Debug, thiserror::Error)]
pub enum ObserverError {
    /// A query parameter is missing or malformed.
    #[error("{0}")]
    InvalidQuery(String),

    /// The gateway rejected the query arguments.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// A serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ObserverError {
    /// HTTP status for this error.
    pub const fn status(&self) -> StatusCode {
        match self {
            // Every gateway error is a rejection of caller-supplied input.
            Self::InvalidQuery(_) | Self::Gateway(_) => StatusCode::BAD_REQUEST,
            Self::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ObserverError {
    fn into_response(self) -> Response {
        let status = self.status();
        debug!(status = status.as_u16(), error = %self, "request rejected");

        let body = serde_json::json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}

// =============================================================================
// API Errors — JSON error bodies for the HTTP endpoints
// =============================================================================

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Upstream answered, but had nothing for this ticker.
    #[error("no data found for ticker {ticker}")]
    NoData { ticker: String },

    /// Upstream unreachable or returned garbage.
    #[error("upstream request failed: {0:#}")]
    Upstream(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NoData { .. } => StatusCode::NOT_FOUND,
            Self::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        let body = serde_json::json!({
            "error": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

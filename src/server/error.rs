use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Errors surfaced by the operational routes.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The backend health check failed.
    #[error("Backend unhealthy: {0}")]
    Unhealthy(String),

    /// Bootstrap or tenant resolution has not finished.
    #[error("Not ready: {0}")]
    NotReady(&'static str),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, label) = match self {
            Self::Unhealthy(ref detail) => {
                tracing::warn!(error = %detail, "Health check failed");
                (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
            }
            Self::NotReady(_) => (StatusCode::SERVICE_UNAVAILABLE, "not_ready"),
        };
        let body = serde_json::json!({ "status": label, "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}

impl From<crate::error::Error> for ServerError {
    fn from(e: crate::error::Error) -> Self {
        Self::Unhealthy(e.to_string())
    }
}

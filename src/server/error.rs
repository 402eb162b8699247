// Error-to-HTTP response conversion

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::proxy::ProxyError;

/// Wrapper so handlers can return `Result<T, ApiError>` and use `?`
#[derive(Debug)]
pub struct ApiError(pub ProxyError);

impl From<ProxyError> for ApiError {
    fn from(e: ProxyError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            match self.0.blocking_reason() {
                Some(reason) => tracing::error!(
                    status = %status,
                    error = %self.0,
                    permanent = reason.is_permanent(),
                    proxy_might_help = reason.proxy_might_help(),
                    "Request failed: {}",
                    reason.description()
                ),
                None => tracing::error!(status = %status, error = %self.0, "Request failed"),
            }
        }

        let body = json!({
            "success": false,
            "error": self.0.to_string(),
        });

        (status, axum::Json(body)).into_response()
    }
}

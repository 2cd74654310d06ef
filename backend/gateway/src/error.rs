//! Maps `SandboxError` to the HTTP edge: status codes per
//! `SandboxError::http_status`, and the `511` transfer envelope body shape.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rockhold_core::SandboxError;
use serde_json::json;

pub struct ApiError(pub SandboxError);

impl From<SandboxError> for ApiError {
    fn from(err: SandboxError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let body = match &self.0 {
            SandboxError::Transfer(envelope) => json!({
                "rockletexception": {
                    "class_path": envelope.remote_class_path,
                    "message": envelope.message,
                    "traceback": envelope.traceback,
                    "extra_info": envelope.extra,
                }
            }),
            other => json!({
                "detail": other.to_string(),
                "kind": other.kind(),
                "traceback": format!("{other:?}"),
            }),
        };

        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

pub fn require_write(state: &crate::state::GatewayState) -> Result<(), ApiError> {
    if state.is_write() {
        Ok(())
    } else {
        Err(ApiError(SandboxError::InvalidArgument(
            "this endpoint requires the write-role control plane".to_string(),
        )))
    }
}

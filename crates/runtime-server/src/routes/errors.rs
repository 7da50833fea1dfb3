//! Maps [`RuntimeError`] (and a few route-local validation failures) onto
//! the `{"error": {"type", "message"}}` body shape (spec §7).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use runtime_core::error::RuntimeError;

pub struct ApiError {
    status: StatusCode,
    type_tag: String,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            type_tag: "bad_request".to_string(),
            message: message.into(),
        }
    }
}

impl From<RuntimeError> for ApiError {
    fn from(e: RuntimeError) -> Self {
        Self {
            status: StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            type_tag: e.type_tag().to_string(),
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({"error": {"type": self.type_tag, "message": self.message}});
        (self.status, Json(body)).into_response()
    }
}

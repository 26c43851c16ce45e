use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::{json, Value};

/// Uniform error body for everything the gateway reports itself:
/// `{"error": {"message", "type": "gateway_error", "code"}}`.
pub fn gateway_error_body(code: u16, message: &str) -> Value {
    json!({
        "error": {
            "message": message,
            "type": "gateway_error",
            "code": code,
        }
    })
}

pub fn gateway_error(status: StatusCode, message: &str) -> Response {
    (status, Json(gateway_error_body(status.as_u16(), message))).into_response()
}

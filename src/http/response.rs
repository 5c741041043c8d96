//! JSON responses for controllers.
//!
//! # Responsibilities
//! - `HttpError`: status code plus a `{"message": ...}` body
//! - `JsonBody`: serialized payload, optionally indented (`pretty_json`)
//! - Fallback handler for paths no controller claims

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;

/// Error answered to an HTTP client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpError {
    pub status: StatusCode,
    pub message: String,
}

impl HttpError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl std::fmt::Display for HttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.status, self.message)
    }
}

impl std::error::Error for HttpError {}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, message = %self.message, "Request failed");
        }
        (self.status, Json(json!({ "message": self.message }))).into_response()
    }
}

/// Serialized JSON payload.
#[derive(Debug, Clone)]
pub struct JsonBody {
    value: serde_json::Value,
    pretty: bool,
}

impl JsonBody {
    pub fn new<T: Serialize>(value: &T, pretty: bool) -> Result<Self, HttpError> {
        let value = serde_json::to_value(value)
            .map_err(|e| HttpError::internal(format!("unable to serialize response: {e}")))?;
        Ok(Self { value, pretty })
    }
}

impl IntoResponse for JsonBody {
    fn into_response(self) -> Response {
        if !self.pretty {
            return Json(self.value).into_response();
        }
        match serde_json::to_string_pretty(&self.value) {
            Ok(body) => ([(header::CONTENT_TYPE, "application/json")], body).into_response(),
            Err(e) => HttpError::internal(e.to_string()).into_response(),
        }
    }
}

/// Fallback for unmatched paths.
pub async fn not_found() -> HttpError {
    HttpError::not_found("resource not found")
}

//! HTTP error taxonomy shared by every handler.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Errors surfaced to API clients.
///
/// The body is always `{"status": <tag>, "error": <message>}`. The tag is
/// `"error"` unless the handler reports success as `"true"`/`"false"` or
/// `"success"`/`"failed"`, in which case it uses [`ApiError::tagged`].
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Missing or malformed input.
    #[error("{0}")]
    BadRequest(String),
    /// The requested entity does not exist.
    #[error("{0}")]
    NotFound(String),
    /// A backing service is not configured or not reachable.
    #[error("{0}")]
    Unavailable(String),
    /// A remote call failed; `detail` carries the full source chain.
    #[error("{context}: {detail}")]
    Upstream { context: String, detail: String },
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    /// Wrap a remote failure, logging it with its full cause chain.
    pub fn upstream(context: impl Into<String>, err: impl std::fmt::Display) -> Self {
        let context = context.into();
        let detail = format!("{err:#}");
        tracing::error!(error = %detail, "{context}");
        Self::Upstream { context, detail }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Upstream { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Attach the status tag the endpoint uses for failures.
    pub fn tagged(self, tag: &'static str) -> TaggedError {
        TaggedError { tag, error: self }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.tagged("error").into_response()
    }
}

/// An [`ApiError`] rendered with an endpoint-specific status tag.
#[derive(Debug)]
pub struct TaggedError {
    tag: &'static str,
    error: ApiError,
}

impl From<ApiError> for TaggedError {
    fn from(error: ApiError) -> Self {
        error.tagged("error")
    }
}

impl IntoResponse for TaggedError {
    fn into_response(self) -> Response {
        let body = json!({
            "status": self.tag,
            "error": self.error.to_string(),
        });
        (self.error.status_code(), Json(body)).into_response()
    }
}

/// Collect the names of required fields that are absent or blank.
pub fn missing_fields<'a>(fields: &[(&'a str, Option<&str>)]) -> Vec<&'a str> {
    fields
        .iter()
        .filter(|(_, value)| value.is_none_or(|v| v.trim().is_empty()))
        .map(|(name, _)| *name)
        .collect()
}

/// Reject the request when any required field is missing.
pub fn require_fields(fields: &[(&str, Option<&str>)]) -> Result<(), ApiError> {
    let missing = missing_fields(fields);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ApiError::bad_request(format!(
            "Missing required fields: {}",
            missing.join(", ")
        )))
    }
}

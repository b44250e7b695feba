//! Error-to-HTTP response conversion.
//!
//! Implements `IntoResponse` for [`af_core::Error`] so route handlers can
//! return `Result<T, AppError>` directly. Failure bodies are JSON of the
//! form `{error, detail?, request_id?}`; `detail` is only present for
//! transcoding failures, where it carries the bounded stderr excerpt.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Wrapper so we can implement `IntoResponse` for an external type.
pub struct AppError {
    inner: af_core::Error,
    request_id: Option<String>,
}

impl AppError {
    pub fn new(inner: af_core::Error) -> Self {
        Self {
            inner,
            request_id: None,
        }
    }

    pub fn with_request_id(mut self, id: String) -> Self {
        self.request_id = Some(id);
        self
    }
}

impl From<af_core::Error> for AppError {
    fn from(e: af_core::Error) -> Self {
        Self::new(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.inner.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            tracing::error!(
                status = %status,
                error = %self.inner,
                "Server error in conversion handler"
            );
        }

        let mut body = json!({
            "error": error_message(&self.inner),
        });
        if let af_core::Error::Transcode { detail } = &self.inner {
            body["detail"] = json!(detail);
        }
        if let Some(id) = self.request_id {
            body["request_id"] = json!(id);
        }

        (status, axum::Json(body)).into_response()
    }
}

/// Human-readable message for the `error` field, without the stderr excerpt
/// (that goes into `detail`).
fn error_message(err: &af_core::Error) -> String {
    match err {
        af_core::Error::Transcode { .. } => "Conversion failed".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_produces_400() {
        let err = AppError::new(af_core::Error::Validation("missing file".into()));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn overloaded_produces_503() {
        let err = AppError::new(af_core::Error::Overloaded("rss above ceiling".into()));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn transcode_failure_produces_500() {
        let err = AppError::new(af_core::Error::transcode("stream #0 corrupt"));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn with_request_id() {
        let err = AppError::new(af_core::Error::Internal("oops".into()))
            .with_request_id("req-123".into());
        assert_eq!(err.request_id.as_deref(), Some("req-123"));
    }

    #[test]
    fn error_message_hides_transcode_detail() {
        let msg = error_message(&af_core::Error::transcode("very long stderr dump"));
        assert_eq!(msg, "Conversion failed");
        assert!(!msg.contains("stderr"));
    }
}

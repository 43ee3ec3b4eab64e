//! Unified error handling with Sentry integration.
//!
//! Handlers return `Result<T, AppError>`. Server errors are captured to Sentry
//! before the response is produced; clients only ever see a generic message.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::service::ServiceError;

const NOT_FOUND_MESSAGE: &str = "order not found";
const INTERNAL_MESSAGE: &str = "something went wrong, try again later";

/// Application-level error type for the HTTP surface.
#[derive(Debug, Error)]
pub enum AppError {
    /// The order service failed.
    #[error("Service error: {0}")]
    Service(#[source] ServiceError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::NotFound => Self::NotFound("order".to_string()),
            other => Self::Service(other),
        }
    }
}

/// JSON body of every error response.
#[derive(Debug, Serialize)]
struct ErrorBody {
    status: &'static str,
    message: &'static str,
}

impl AppError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Service(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    // Details stay in logs and Sentry
    const fn public_message(&self) -> &'static str {
        match self {
            Self::NotFound(_) => NOT_FOUND_MESSAGE,
            Self::Service(_) => INTERNAL_MESSAGE,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        } else {
            tracing::debug!(error = %self, "Request rejected");
        }

        let body = ErrorBody {
            status: "error",
            message: self.public_message(),
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use http_body_util::BodyExt;

    use super::*;
    use crate::db::RepositoryError;

    async fn body_json(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("order".to_string());
        assert_eq!(err.to_string(), "Not found: order");

        let err = AppError::from(ServiceError::Store(RepositoryError::NotFound));
        assert!(err.to_string().starts_with("Service error: "));
    }

    #[test]
    fn test_service_not_found_maps_to_404() {
        let err = AppError::from(ServiceError::NotFound);
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let err = AppError::from(ServiceError::Store(RepositoryError::DataCorruption(
            "payment missing".to_string(),
        )));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_not_found_body() {
        let (status, body) = body_json(AppError::NotFound("order".to_string())).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["status"], "error");
        assert_eq!(body["message"], NOT_FOUND_MESSAGE);
    }

    #[tokio::test]
    async fn test_internal_body_hides_details() {
        let err = AppError::from(ServiceError::Store(RepositoryError::DataCorruption(
            "password=hunter2".to_string(),
        )));
        let (status, body) = body_json(err).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], INTERNAL_MESSAGE);
        assert!(!body.to_string().contains("hunter2"));
    }
}

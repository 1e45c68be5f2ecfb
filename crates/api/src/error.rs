//! JSON error responses.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::CONTENT_RANGE},
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::error;

use boxvault_core::artifact::ArtifactError;
use boxvault_shared::AppError;

/// Error returned by handlers, rendered as `{"error": CODE, "message": text}`.
#[derive(Debug)]
pub struct ApiError {
    error: AppError,
    unsatisfied_size: Option<u64>,
}

impl ApiError {
    /// The application error behind this response.
    #[must_use]
    pub fn app_error(&self) -> &AppError {
        &self.error
    }
}

impl From<AppError> for ApiError {
    fn from(error: AppError) -> Self {
        Self {
            error,
            unsatisfied_size: None,
        }
    }
}

impl From<ArtifactError> for ApiError {
    fn from(err: ArtifactError) -> Self {
        let unsatisfied_size = match &err {
            ArtifactError::RangeNotSatisfiable { total } => Some(*total),
            ArtifactError::Repository(_) | ArtifactError::Io(_) | ArtifactError::Signing(_) => {
                error!(error = %err, "Artifact operation failed");
                None
            }
            _ => None,
        };

        Self {
            error: err.into(),
            unsatisfied_size,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.error.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let mut response = (
            status,
            Json(json!({
                "error": self.error.error_code(),
                "message": self.error.public_message(),
            })),
        )
            .into_response();

        if let Some(total) = self.unsatisfied_size
            && let Ok(value) = HeaderValue::from_str(&format!("bytes */{total}"))
        {
            response.headers_mut().insert(CONTENT_RANGE, value);
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use uuid::Uuid;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_range_not_satisfiable_sets_content_range() {
        let response = ApiError::from(ArtifactError::RangeNotSatisfiable { total: 42 }).into_response();

        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(response.headers()[CONTENT_RANGE], "bytes */42");
        assert_eq!(body_json(response).await["error"], "RANGE_NOT_SATISFIABLE");
    }

    #[tokio::test]
    async fn test_internal_errors_hide_details() {
        let response =
            ApiError::from(ArtifactError::repository("password=hunter2 host=db")).into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"], "DATABASE_ERROR");
        assert!(!body["message"].as_str().unwrap().contains("hunter2"));
    }

    #[tokio::test]
    async fn test_integrity_is_not_found() {
        let response =
            ApiError::from(ArtifactError::integrity(Uuid::nil(), "/srv/iso/x.iso")).into_response();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert!(!body["message"].as_str().unwrap().contains("/srv"));
    }
}

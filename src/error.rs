//! Error Translation
//! Mission: Turn domain failures into one HTTP reply and one audit outcome

use crate::audit::event::QueryOutcome;
use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

const INTERNAL_ERROR_MESSAGE: &str = "internal error";

/// Domain failures that reach the HTTP boundary
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("validation: {0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("authentication required")]
    Unauthorized,

    #[error("invalid login or password")]
    InvalidCredentials,

    /// Real cause is logged, never returned
    #[error("internal error")]
    Internal(#[source] anyhow::Error),
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err)
    }
}

/// Extractor rejections are validation failures
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unauthorized | ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Caller-facing message. Internal causes collapse to a fixed string.
    pub fn public_message(&self) -> String {
        match self {
            ApiError::Internal(_) => INTERNAL_ERROR_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }

    /// The single translation point: HTTP status plus the audited outcome
    pub fn translate(&self) -> (StatusCode, QueryOutcome) {
        let outcome = match self {
            ApiError::NotFound(_) => QueryOutcome::NotFound,
            other => QueryOutcome::Error {
                message: other.public_message(),
            },
        };
        (self.status(), outcome)
    }

    /// Bind the error to the request path for the reply body
    pub fn at(self, path: impl Into<String>) -> ErrorReply {
        ErrorReply {
            error: self,
            path: path.into(),
        }
    }
}

/// Structured error body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub timestamp: String,
    pub status: u16,
    pub error: String,
    pub message: String,
    pub path: String,
}

/// An `ApiError` bound to the path it occurred on
#[derive(Debug)]
pub struct ErrorReply {
    pub error: ApiError,
    pub path: String,
}

impl IntoResponse for ErrorReply {
    fn into_response(self) -> Response {
        let status = self.error.status();

        match &self.error {
            ApiError::Internal(cause) => {
                error!(path = %self.path, error = ?cause, "Unexpected failure");
            }
            other => {
                warn!(path = %self.path, status = status.as_u16(), "{}", other);
            }
        }

        let body = ErrorBody {
            timestamp: Utc::now().to_rfc3339(),
            status: status.as_u16(),
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.error.public_message(),
            path: self.path,
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn test_translation_table() {
        let (status, outcome) = ApiError::not_found("No credit found for invoice: NOPE").translate();
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(outcome, QueryOutcome::NotFound);

        let (status, outcome) = ApiError::validation("invoice number is required").translate();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            outcome,
            QueryOutcome::Error {
                message: "validation: invoice number is required".to_string()
            }
        );

        let (status, outcome) = ApiError::conflict("login already in use").translate();
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(
            outcome,
            QueryOutcome::Error {
                message: "conflict: login already in use".to_string()
            }
        );
    }

    #[test]
    fn test_internal_error_is_genericized() {
        let err: ApiError = anyhow::anyhow!("disk I/O error at /var/lib/credits.db").into();

        let (status, outcome) = err.translate();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            outcome,
            QueryOutcome::Error {
                message: "internal error".to_string()
            }
        );
        assert!(!err.public_message().contains("disk"));
    }

    #[tokio::test]
    async fn test_json_rejection_becomes_validation() {
        use axum::{body::Body, extract::FromRequest, http::Request};

        #[derive(Debug, Deserialize)]
        struct Payload {
            #[allow(dead_code)]
            login: String,
        }

        let req = Request::builder()
            .method("POST")
            .uri("/users")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"name":"x"}"#))
            .unwrap();
        let rejection = axum::Json::<Payload>::from_request(req, &()).await.unwrap_err();

        let err = ApiError::from(rejection);
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(err.public_message().starts_with("validation: "));
        assert!(err.public_message().contains("login"));
    }

    #[tokio::test]
    async fn test_error_reply_body() {
        let response = ApiError::not_found("Credit not found with number: NOPE")
            .at("/credits/credit/NOPE")
            .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: ErrorBody = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.status, 404);
        assert_eq!(body.error, "Not Found");
        assert_eq!(body.message, "Credit not found with number: NOPE");
        assert_eq!(body.path, "/credits/credit/NOPE");
        assert!(!body.timestamp.is_empty());
    }

    #[tokio::test]
    async fn test_internal_reply_hides_cause() {
        let response = ApiError::Internal(anyhow::anyhow!("connection refused"))
            .at("/credits/123")
            .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("internal error"));
        assert!(!text.contains("connection refused"));
    }
}

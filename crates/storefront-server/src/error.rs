//! HTTP errors returned by the storefront handlers.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use storefront_auth::AuthError;
use storefront_storage::StorageError;

/// Errors surfaced to clients.
///
/// Cache failures never appear here; they degrade to origin reads.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The document store failed or timed out.
    #[error("origin query failed: {0}")]
    Origin(#[from] StorageError),

    #[error("{message}")]
    NotFound { message: String },

    #[error(transparent)]
    Unauthorized(#[from] AuthError),
}

impl ApiError {
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Origin(e) if e.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
            Self::Origin(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            Self::Unauthorized(auth) => return auth.into_response(),
            Self::NotFound { message } => message,
            // Store details stay in the logs.
            Self::Origin(e) if e.is_timeout() => "origin query timed out".to_string(),
            Self::Origin(_) => "origin query failed".to_string(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::from(StorageError::timeout(Duration::from_secs(1))).status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            ApiError::from(StorageError::connection_error("refused")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::not_found("user not found").status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(AuthError::MissingCredential).status(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[tokio::test]
    async fn test_origin_details_are_not_leaked() {
        let response =
            ApiError::from(StorageError::query_error("relation documents missing")).into_response();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body, json!({"error": "origin query failed"}));
    }
}

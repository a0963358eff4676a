//! HTTP rendering of [`AuthError`].

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::error::AuthError;

const REALM: &str = "storefront";

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = json!({ "error": self.public_message() });
        let mut response = (StatusCode::UNAUTHORIZED, Json(body)).into_response();

        if let Ok(value) = HeaderValue::from_str(&www_authenticate(&self)) {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, value);
        }
        response
    }
}

/// `Bearer realm="storefront"[, error="invalid_token"]`
fn www_authenticate(error: &AuthError) -> String {
    match error.bearer_error_code() {
        Some(code) => format!("Bearer realm=\"{REALM}\", error=\"{code}\""),
        None => format!("Bearer realm=\"{REALM}\""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unauthorized_status_and_header() {
        let response = AuthError::invalid_credential("token expired").into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            "Bearer realm=\"storefront\", error=\"invalid_token\""
        );
    }

    #[test]
    fn test_missing_credential_header_has_no_error_code() {
        let response = AuthError::MissingCredential.into_response();
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            "Bearer realm=\"storefront\""
        );
    }
}

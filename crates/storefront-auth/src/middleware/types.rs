//! Request-scoped identity.

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::error::AuthError;

/// The identity resolved by the gate for the current request.
///
/// Inserted into the request extensions by
/// [`require_auth`](super::auth::require_auth) and never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedIdentity {
    /// Subject id from the verified credential.
    pub subject_id: String,
}

impl AuthenticatedIdentity {
    pub fn new(subject_id: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
        }
    }
}

impl<S> FromRequestParts<S> for AuthenticatedIdentity
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Handlers outside the gate never see an identity.
        parts
            .extensions
            .get::<AuthenticatedIdentity>()
            .cloned()
            .ok_or(AuthError::MissingCredential)
    }
}

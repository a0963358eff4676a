//! Bearer credential extraction and the gate middleware.

use std::time::Duration;

use axum::{
    extract::{Request, State},
    http::{
        HeaderMap,
        header::{AUTHORIZATION, COOKIE},
    },
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::config::{AuthConfig, CookieConfig};
use crate::AuthResult;
use crate::error::AuthError;
use crate::verifier::{DynIdentityVerifier, VerifyError};

use super::types::AuthenticatedIdentity;

/// State for the authentication gate.
#[derive(Clone)]
pub struct AuthState {
    /// Verifier for bearer credentials.
    pub verifier: DynIdentityVerifier,

    /// Cookie fallback configuration.
    pub cookie_config: CookieConfig,

    /// Budget for one verification call.
    pub verify_timeout: Duration,
}

impl AuthState {
    /// Creates gate state with the default cookie and a 5 s verify budget.
    pub fn new(verifier: DynIdentityVerifier) -> Self {
        Self {
            verifier,
            cookie_config: CookieConfig::default(),
            verify_timeout: Duration::from_secs(5),
        }
    }

    /// Creates gate state from configuration.
    pub fn from_config(verifier: DynIdentityVerifier, config: &AuthConfig) -> Self {
        Self {
            verifier,
            cookie_config: config.cookie.clone(),
            verify_timeout: config.verify_timeout(),
        }
    }

    #[must_use]
    pub fn with_cookie_config(mut self, cookie_config: CookieConfig) -> Self {
        self.cookie_config = cookie_config;
        self
    }

    #[must_use]
    pub fn with_verify_timeout(mut self, timeout: Duration) -> Self {
        self.verify_timeout = timeout;
        self
    }
}

impl std::fmt::Debug for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthState")
            .field("cookie_config", &self.cookie_config)
            .field("verify_timeout", &self.verify_timeout)
            .finish_non_exhaustive()
    }
}

/// Extracts the bearer credential: the `Authorization: Bearer` header
/// first, then the configured cookie.
pub fn extract_token(headers: &HeaderMap, cookie_config: &CookieConfig) -> Option<String> {
    let from_header = headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());

    if let Some(token) = from_header {
        return Some(token.to_string());
    }

    extract_token_from_cookie(headers, cookie_config)
}

fn extract_token_from_cookie(headers: &HeaderMap, cookie_config: &CookieConfig) -> Option<String> {
    if !cookie_config.enabled {
        return None;
    }

    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|h| h.split(';'))
        .find_map(|cookie| {
            let (name, value) = cookie.trim().split_once('=')?;
            let value = value.trim();
            (name.trim() == cookie_config.name && !value.is_empty()).then(|| value.to_string())
        })
}

/// Resolves the identity for a request.
///
/// # Errors
///
/// `MissingCredential` when no token is present; `InvalidCredential` for any
/// verifier failure, including the verify timeout.
pub async fn authenticate(
    state: &AuthState,
    headers: &HeaderMap,
) -> AuthResult<AuthenticatedIdentity> {
    let token = extract_token(headers, &state.cookie_config).ok_or_else(|| {
        tracing::debug!("No bearer credential on request");
        AuthError::MissingCredential
    })?;

    let verified = tokio::time::timeout(state.verify_timeout, state.verifier.verify(&token))
        .await
        .unwrap_or(Err(VerifyError::Timeout));

    match verified {
        Ok(subject_id) => {
            tracing::debug!(subject_id = %subject_id, "Credential verified");
            Ok(AuthenticatedIdentity { subject_id })
        }
        Err(err) => {
            tracing::info!(reason = %err, "Rejected bearer credential");
            Err(AuthError::invalid_credential(err.to_string()))
        }
    }
}

/// Gate middleware: rejects with 401 or attaches [`AuthenticatedIdentity`]
/// to the request extensions.
pub async fn require_auth(
    State(state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    match authenticate(&state, request.headers()).await {
        Ok(identity) => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(err) => err.into_response(),
    }
}

//! # storefront-auth
//!
//! Authentication gate for the storefront server.
//!
//! Every protected request carries a bearer credential, either in the
//! `Authorization: Bearer <token>` header or in the `accessToken` cookie.
//! The gate hands it to an [`IdentityVerifier`] under a bounded timeout and,
//! on success, attaches an [`AuthenticatedIdentity`] to the request
//! extensions. There is no session state: every request is re-verified.
//!
//! ## Modules
//!
//! - [`config`] - verifier and cookie configuration
//! - [`error`] - the externally visible [`AuthError`]
//! - [`verifier`] - the [`IdentityVerifier`] trait and detailed [`VerifyError`]
//! - [`jwt`] - JWT verification against a shared secret or a JWKS endpoint
//! - [`jwks`] - JWKS fetching and caching
//! - [`middleware`] - axum middleware and extractors

pub mod config;
pub mod error;
pub mod jwks;
pub mod jwt;
pub mod middleware;
pub mod verifier;

pub use config::{AuthConfig, ConfigError, CookieConfig};
pub use error::AuthError;
pub use jwks::{JwksCache, JwksCacheConfig, JwksError};
pub use jwt::{JwtVerifier, KeySource, TokenClaims};
pub use middleware::{AuthState, AuthenticatedIdentity, authenticate, require_auth};
pub use verifier::{DynIdentityVerifier, IdentityVerifier, VerifyError};

/// Type alias for authentication results.
pub type AuthResult<T> = Result<T, AuthError>;

//! Axum integration for the authentication gate.
//!
//! ```ignore
//! use axum::{Router, middleware, routing::get};
//! use storefront_auth::{AuthState, AuthenticatedIdentity, require_auth};
//!
//! async fn me(identity: AuthenticatedIdentity) -> String {
//!     identity.subject_id
//! }
//!
//! let app = Router::new()
//!     .route("/api/user/me", get(me))
//!     .route_layer(middleware::from_fn_with_state(auth_state, require_auth));
//! ```

pub mod auth;
pub mod error;
pub mod types;

pub use auth::{AuthState, authenticate, extract_token, require_auth};
pub use types::AuthenticatedIdentity;

//! Authentication configuration.
//!
//! ```toml
//! [auth]
//! verify_timeout_ms = 5000
//! firebase_project_id = "my-shop"
//!
//! [auth.cookie]
//! name = "accessToken"
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Google's JWKS endpoint for Firebase ID-token signing keys.
pub const FIREBASE_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";

/// Authentication gate configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Budget for a single credential verification, in milliseconds.
    pub verify_timeout_ms: u64,

    /// Firebase project id. When set, `issuer`, `audience` and `jwks_url`
    /// default to the project's Firebase values.
    pub firebase_project_id: Option<String>,

    /// Expected `iss` claim.
    pub issuer: Option<String>,

    /// Expected `aud` claim.
    pub audience: Option<String>,

    /// JWKS endpoint publishing the token signing keys.
    pub jwks_url: Option<String>,

    /// Shared HS256 secret. Intended for local development only; ignored
    /// when a JWKS endpoint is configured.
    pub hs256_secret: Option<String>,

    /// Allowed clock skew for `exp`/`nbf`, in seconds.
    pub leeway_secs: u64,

    /// Allow a plain-HTTP JWKS endpoint (tests only).
    pub allow_http_jwks: bool,

    /// Cookie fallback configuration.
    pub cookie: CookieConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            verify_timeout_ms: 5000,
            firebase_project_id: None,
            issuer: None,
            audience: None,
            jwks_url: None,
            hs256_secret: None,
            leeway_secs: 60,
            allow_http_jwks: false,
            cookie: CookieConfig::default(),
        }
    }
}

impl AuthConfig {
    /// Budget for one verification call.
    pub fn verify_timeout(&self) -> Duration {
        Duration::from_millis(self.verify_timeout_ms)
    }

    /// Effective issuer: explicit value, else derived from the Firebase project.
    pub fn effective_issuer(&self) -> Option<String> {
        self.issuer.clone().or_else(|| {
            self.firebase_project_id
                .as_ref()
                .map(|id| format!("https://securetoken.google.com/{id}"))
        })
    }

    /// Effective audience: explicit value, else the Firebase project id.
    pub fn effective_audience(&self) -> Option<String> {
        self.audience
            .clone()
            .or_else(|| self.firebase_project_id.clone())
    }

    /// Effective JWKS endpoint: explicit value, else Google's when a
    /// Firebase project is configured.
    pub fn effective_jwks_url(&self) -> Option<String> {
        self.jwks_url.clone().or_else(|| {
            self.firebase_project_id
                .as_ref()
                .map(|_| FIREBASE_JWKS_URL.to_string())
        })
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if the timeout is zero or the
    /// secret is empty, and `ConfigError::Missing` if no key source is set.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.verify_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "auth.verify_timeout_ms must be > 0".to_string(),
            ));
        }
        if self.cookie.name.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "auth.cookie.name cannot be empty".to_string(),
            ));
        }
        if let Some(secret) = &self.hs256_secret
            && secret.is_empty()
        {
            return Err(ConfigError::InvalidValue(
                "auth.hs256_secret cannot be empty".to_string(),
            ));
        }
        if self.effective_jwks_url().is_none() && self.hs256_secret.is_none() {
            return Err(ConfigError::Missing(
                "one of auth.firebase_project_id, auth.jwks_url or auth.hs256_secret".to_string(),
            ));
        }
        Ok(())
    }
}

/// Cookie fallback for browser clients.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CookieConfig {
    /// Whether the cookie is consulted when no `Authorization` header is sent.
    pub enabled: bool,

    /// Cookie name.
    pub name: String,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            name: "accessToken".to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AuthConfig::default();
        assert_eq!(config.verify_timeout(), Duration::from_secs(5));
        assert!(config.cookie.enabled);
        assert_eq!(config.cookie.name, "accessToken");
    }

    #[test]
    fn test_firebase_project_derives_issuer_audience_and_jwks() {
        let config = AuthConfig {
            firebase_project_id: Some("my-shop".to_string()),
            ..AuthConfig::default()
        };
        assert_eq!(
            config.effective_issuer().as_deref(),
            Some("https://securetoken.google.com/my-shop")
        );
        assert_eq!(config.effective_audience().as_deref(), Some("my-shop"));
        assert_eq!(config.effective_jwks_url().as_deref(), Some(FIREBASE_JWKS_URL));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_explicit_values_win() {
        let config = AuthConfig {
            firebase_project_id: Some("my-shop".to_string()),
            issuer: Some("https://issuer.test".to_string()),
            jwks_url: Some("https://issuer.test/jwks".to_string()),
            ..AuthConfig::default()
        };
        assert_eq!(config.effective_issuer().as_deref(), Some("https://issuer.test"));
        assert_eq!(
            config.effective_jwks_url().as_deref(),
            Some("https://issuer.test/jwks")
        );
    }

    #[test]
    fn test_validate_requires_key_source() {
        let err = AuthConfig::default().validate().unwrap_err();
        assert!(matches!(err, ConfigError::Missing(_)));

        let config = AuthConfig {
            hs256_secret: Some("dev-secret".to_string()),
            ..AuthConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let config = AuthConfig {
            verify_timeout_ms: 0,
            hs256_secret: Some("dev-secret".to_string()),
            ..AuthConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(_))));
    }
}

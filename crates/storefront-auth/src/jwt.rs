//! JWT identity verification.
//!
//! [`JwtVerifier`] checks the signature, `exp`, and (when configured) the
//! issuer and audience of a token, then resolves the subject id. Keys come
//! either from a static HS256 secret or from a provider's JWKS endpoint.

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::{AuthConfig, ConfigError};
use crate::jwks::{JwksCache, JwksCacheConfig, JwksError, SigningKey};
use crate::verifier::{IdentityVerifier, VerifyError};

/// Claims read from a verified token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    /// Firebase ID tokens repeat the uid here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// Expiry (seconds since epoch).
    pub exp: i64,
}

impl TokenClaims {
    /// The subject id: `sub`, else `user_id`. Empty values do not count.
    pub fn subject_id(&self) -> Option<&str> {
        self.sub
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| self.user_id.as_deref().filter(|s| !s.is_empty()))
    }
}

/// Where verification keys come from.
#[derive(Clone)]
pub enum KeySource {
    /// Shared HS256 secret.
    Secret(DecodingKey),
    /// Keys published at a JWKS endpoint.
    Jwks(JwksCache),
}

impl std::fmt::Debug for KeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Secret(_) => f.write_str("Secret(..)"),
            Self::Jwks(cache) => f.debug_tuple("Jwks").field(cache).finish(),
        }
    }
}

/// Verifies JWT bearer tokens.
#[derive(Debug, Clone)]
pub struct JwtVerifier {
    keys: KeySource,
    issuer: Option<String>,
    audience: Option<String>,
    leeway_secs: u64,
}

impl JwtVerifier {
    /// Creates a verifier over the given key source with no issuer or
    /// audience checks.
    pub fn new(keys: KeySource) -> Self {
        Self {
            keys,
            issuer: None,
            audience: None,
            leeway_secs: 60,
        }
    }

    /// Creates a verifier for a shared HS256 secret.
    pub fn with_secret(secret: &[u8]) -> Self {
        Self::new(KeySource::Secret(DecodingKey::from_secret(secret)))
    }

    /// Requires the given `iss` claim.
    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Requires the given `aud` claim.
    #[must_use]
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    /// Sets the allowed clock skew.
    #[must_use]
    pub fn with_leeway(mut self, leeway_secs: u64) -> Self {
        self.leeway_secs = leeway_secs;
        self
    }

    /// Builds a verifier from configuration. A JWKS endpoint takes
    /// precedence over a shared secret.
    ///
    /// # Errors
    ///
    /// Returns an error if no key source is configured or the JWKS URL is
    /// invalid.
    pub fn from_config(config: &AuthConfig) -> Result<Self, ConfigError> {
        let keys = if let Some(jwks_url) = config.effective_jwks_url() {
            let uri = Url::parse(&jwks_url).map_err(|e| {
                ConfigError::InvalidValue(format!("auth.jwks_url {jwks_url:?}: {e}"))
            })?;
            let jwks_config = JwksCacheConfig::default()
                .with_request_timeout(config.verify_timeout())
                .with_allow_http(config.allow_http_jwks);
            let cache = JwksCache::new(uri, jwks_config)
                .map_err(|e| ConfigError::InvalidValue(format!("auth.jwks_url: {e}")))?;
            KeySource::Jwks(cache)
        } else if let Some(secret) = &config.hs256_secret {
            KeySource::Secret(DecodingKey::from_secret(secret.as_bytes()))
        } else {
            return Err(ConfigError::Missing(
                "auth.jwks_url or auth.hs256_secret".to_string(),
            ));
        };

        let mut verifier = Self::new(keys).with_leeway(config.leeway_secs);
        verifier.issuer = config.effective_issuer();
        verifier.audience = config.effective_audience();
        Ok(verifier)
    }

    fn validation(&self, algorithm: Algorithm) -> Validation {
        let mut validation = Validation::new(algorithm);
        validation.leeway = self.leeway_secs;
        validation.set_required_spec_claims(&["exp"]);
        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer]);
        }
        match &self.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }
        validation
    }

    /// Decodes and validates `token`, returning its claims.
    ///
    /// # Errors
    ///
    /// Returns a [`VerifyError`] for any malformed, unsigned, expired or
    /// mis-addressed token.
    pub async fn decode_claims(&self, token: &str) -> Result<TokenClaims, VerifyError> {
        let header = decode_header(token)?;

        match &self.keys {
            KeySource::Secret(key) => {
                if header.alg != Algorithm::HS256 {
                    return Err(VerifyError::InvalidClaims("algorithm".to_string()));
                }
                let data = decode::<TokenClaims>(token, key, &self.validation(Algorithm::HS256))?;
                Ok(data.claims)
            }
            KeySource::Jwks(cache) => {
                let candidates = match header.kid.as_deref() {
                    Some(kid) => vec![cache.get_key(kid).await.map_err(key_error)?],
                    None => cache.find_signing_keys().await.map_err(key_error)?,
                };
                self.decode_with_any(token, header.alg, &candidates)
            }
        }
    }

    fn decode_with_any(
        &self,
        token: &str,
        alg: Algorithm,
        candidates: &[SigningKey],
    ) -> Result<TokenClaims, VerifyError> {
        let validation = self.validation(alg);
        let mut last_error = VerifyError::InvalidSignature;

        for candidate in candidates {
            if candidate.algorithm.is_some_and(|a| a != alg) {
                last_error = VerifyError::InvalidClaims("algorithm".to_string());
                continue;
            }
            match decode::<TokenClaims>(token, &candidate.key, &validation) {
                Ok(data) => return Ok(data.claims),
                Err(e) => {
                    let err = VerifyError::from(e);
                    // Only a signature mismatch is worth trying the next key for.
                    if err != VerifyError::InvalidSignature {
                        return Err(err);
                    }
                    last_error = err;
                }
            }
        }
        Err(last_error)
    }
}

fn key_error(err: JwksError) -> VerifyError {
    match err {
        JwksError::KeyNotFound(_) => VerifyError::InvalidSignature,
        other => VerifyError::KeyUnavailable(other.to_string()),
    }
}

#[async_trait]
impl IdentityVerifier for JwtVerifier {
    async fn verify(&self, token: &str) -> Result<String, VerifyError> {
        let claims = self.decode_claims(token).await?;
        claims
            .subject_id()
            .map(ToString::to_string)
            .ok_or_else(|| VerifyError::InvalidClaims("missing subject".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SECRET: &[u8] = b"storefront-test-secret-0123456789";

    fn now() -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64
    }

    fn sign(header: &Header, claims: serde_json::Value) -> String {
        encode(header, &claims, &EncodingKey::from_secret(SECRET)).unwrap()
    }

    fn hs256(claims: serde_json::Value) -> String {
        sign(&Header::new(Algorithm::HS256), claims)
    }

    #[tokio::test]
    async fn test_valid_token_yields_subject() {
        let verifier = JwtVerifier::with_secret(SECRET);
        let token = hs256(json!({"sub": "user-1", "exp": now() + 600}));
        assert_eq!(verifier.verify(&token).await.unwrap(), "user-1");
    }

    #[tokio::test]
    async fn test_firebase_user_id_fallback() {
        let verifier = JwtVerifier::with_secret(SECRET);
        let token = hs256(json!({"user_id": "fb-uid", "exp": now() + 600}));
        assert_eq!(verifier.verify(&token).await.unwrap(), "fb-uid");
    }

    #[tokio::test]
    async fn test_expired_token() {
        let verifier = JwtVerifier::with_secret(SECRET).with_leeway(0);
        let token = hs256(json!({"sub": "user-1", "exp": now() - 3600}));
        assert_eq!(verifier.verify(&token).await, Err(VerifyError::Expired));
    }

    #[tokio::test]
    async fn test_malformed_token() {
        let verifier = JwtVerifier::with_secret(SECRET);
        let err = verifier.verify("not-a-jwt").await.unwrap_err();
        assert!(matches!(err, VerifyError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_wrong_secret() {
        let verifier = JwtVerifier::with_secret(b"some-other-secret-0123456789abcd");
        let token = hs256(json!({"sub": "user-1", "exp": now() + 600}));
        assert_eq!(verifier.verify(&token).await, Err(VerifyError::InvalidSignature));
    }

    #[tokio::test]
    async fn test_missing_subject() {
        let verifier = JwtVerifier::with_secret(SECRET);
        let token = hs256(json!({"sub": "", "exp": now() + 600}));
        assert!(matches!(
            verifier.verify(&token).await,
            Err(VerifyError::InvalidClaims(_))
        ));
    }

    #[tokio::test]
    async fn test_issuer_and_audience() {
        let verifier = JwtVerifier::with_secret(SECRET)
            .with_issuer("https://securetoken.google.com/shop")
            .with_audience("shop");

        let good = hs256(json!({
            "sub": "user-1", "exp": now() + 600,
            "iss": "https://securetoken.google.com/shop", "aud": "shop"
        }));
        assert_eq!(verifier.verify(&good).await.unwrap(), "user-1");

        let wrong_aud = hs256(json!({
            "sub": "user-1", "exp": now() + 600,
            "iss": "https://securetoken.google.com/shop", "aud": "other"
        }));
        assert!(matches!(
            verifier.verify(&wrong_aud).await,
            Err(VerifyError::InvalidClaims(_))
        ));
    }

    #[tokio::test]
    async fn test_jwks_key_source() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "keys": [{
                    "kty": "oct",
                    "kid": "k1",
                    "alg": "HS256",
                    "k": URL_SAFE_NO_PAD.encode(SECRET)
                }]
            })))
            .mount(&server)
            .await;

        let config = AuthConfig {
            jwks_url: Some(format!("{}/jwks", server.uri())),
            allow_http_jwks: true,
            ..AuthConfig::default()
        };
        let verifier = JwtVerifier::from_config(&config).unwrap();

        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some("k1".to_string());
        let token = sign(&header, json!({"sub": "user-9", "exp": now() + 600}));
        assert_eq!(verifier.verify(&token).await.unwrap(), "user-9");

        header.kid = Some("rotated-away".to_string());
        let token = sign(&header, json!({"sub": "user-9", "exp": now() + 600}));
        assert_eq!(verifier.verify(&token).await, Err(VerifyError::InvalidSignature));
    }

    #[tokio::test]
    async fn test_unreachable_jwks_is_key_unavailable() {
        let config = AuthConfig {
            jwks_url: Some("http://127.0.0.1:9/jwks".to_string()),
            allow_http_jwks: true,
            verify_timeout_ms: 500,
            ..AuthConfig::default()
        };
        let verifier = JwtVerifier::from_config(&config).unwrap();
        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some("k1".to_string());
        let token = sign(&header, json!({"sub": "user-1", "exp": now() + 600}));
        assert!(matches!(
            verifier.verify(&token).await,
            Err(VerifyError::KeyUnavailable(_))
        ));
    }
}

//! JWKS fetching and caching.
//!
//! [`JwksCache`] holds the signing keys of a single identity provider. Keys
//! are fetched on first use and refreshed when the cached set expires or a
//! token names an unknown `kid` (providers rotate keys ahead of use).
//!
//! Unknown-`kid` refreshes are throttled to one per `min_refresh_interval`,
//! and refreshes run under the write lock so concurrent misses share one
//! fetch.
//!
//! The cache honours `Cache-Control: max-age=X` from the provider, clamped
//! to configured bounds.

use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::jwk::{Jwk, JwkSet, KeyAlgorithm, PublicKeyUse};
use jsonwebtoken::{Algorithm, DecodingKey};
use tokio::sync::RwLock;
use url::Url;

/// Configuration for [`JwksCache`].
#[derive(Debug, Clone)]
pub struct JwksCacheConfig {
    /// TTL when the provider sends no Cache-Control (default: 1 hour).
    pub default_ttl: Duration,

    /// Upper TTL bound (default: 24 hours).
    pub max_ttl: Duration,

    /// Lower TTL bound (default: 5 minutes).
    pub min_ttl: Duration,

    /// Minimum time between fetches forced by an unknown `kid`
    /// (default: 30 seconds).
    pub min_refresh_interval: Duration,

    /// HTTP request timeout (default: 5 seconds).
    pub request_timeout: Duration,

    /// Maximum response size in bytes (default: 1 MB).
    pub max_response_size: usize,

    /// Allow plain-HTTP endpoints. Tests only.
    pub allow_http: bool,
}

impl Default for JwksCacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(3600),
            max_ttl: Duration::from_secs(86400),
            min_ttl: Duration::from_secs(300),
            min_refresh_interval: Duration::from_secs(30),
            request_timeout: Duration::from_secs(5),
            max_response_size: 1024 * 1024,
            allow_http: false,
        }
    }
}

impl JwksCacheConfig {
    /// Sets the HTTP request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the minimum interval between unknown-`kid` refreshes.
    #[must_use]
    pub fn with_min_refresh_interval(mut self, interval: Duration) -> Self {
        self.min_refresh_interval = interval;
        self
    }

    /// Allows HTTP (non-HTTPS) JWKS endpoints.
    #[must_use]
    pub fn with_allow_http(mut self, allow: bool) -> Self {
        self.allow_http = allow;
        self
    }
}

/// Errors that can occur while loading keys.
#[derive(Debug, thiserror::Error)]
pub enum JwksError {
    /// The HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    ClientError(String),

    /// A network error occurred while fetching the JWKS.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// The endpoint returned a non-success status code.
    #[error("HTTP error: status {0}")]
    HttpError(u16),

    /// The response body is not a JWK set.
    #[error("Failed to parse JWKS: {0}")]
    ParseError(String),

    /// No key with the requested `kid`.
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// The set holds no usable signing keys.
    #[error("No signing keys found in JWKS")]
    NoSigningKeys,

    /// The endpoint is not HTTPS.
    #[error("Invalid URL scheme: only HTTPS is allowed")]
    InvalidScheme,

    /// The response exceeded the maximum allowed size.
    #[error("Response exceeds maximum size of {max_size} bytes")]
    ResponseTooLarge {
        /// The maximum allowed size.
        max_size: usize,
    },
}

/// A decoded signing key.
#[derive(Clone)]
pub struct SigningKey {
    /// Key id, if the provider sets one.
    pub kid: Option<String>,
    /// Decoding key.
    pub key: DecodingKey,
    /// Algorithm advertised by the JWK.
    pub algorithm: Option<Algorithm>,
}

struct CachedKeys {
    keys: Vec<SigningKey>,
    fetched_at: Instant,
    expires_at: Instant,
}

impl CachedKeys {
    fn is_fresh(&self) -> bool {
        Instant::now() < self.expires_at
    }

    fn find(&self, kid: &str) -> Option<SigningKey> {
        self.keys
            .iter()
            .find(|k| k.kid.as_deref() == Some(kid))
            .cloned()
    }
}

/// Cache of one provider's signing keys.
#[derive(Clone)]
pub struct JwksCache {
    uri: Url,
    http_client: reqwest::Client,
    cached: Arc<RwLock<Option<CachedKeys>>>,
    config: JwksCacheConfig,
}

impl std::fmt::Debug for JwksCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwksCache")
            .field("uri", &self.uri.as_str())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl JwksCache {
    /// Creates a cache for the given endpoint. Nothing is fetched yet.
    ///
    /// # Errors
    ///
    /// Returns `InvalidScheme` for non-HTTPS endpoints (unless allowed) and
    /// `ClientError` if the HTTP client cannot be built.
    pub fn new(uri: Url, config: JwksCacheConfig) -> Result<Self, JwksError> {
        validate_scheme(&uri, config.allow_http)?;

        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| JwksError::ClientError(e.to_string()))?;

        Ok(Self {
            uri,
            http_client,
            cached: Arc::new(RwLock::new(None)),
            config,
        })
    }

    /// The JWKS endpoint.
    pub fn uri(&self) -> &Url {
        &self.uri
    }

    /// Looks up a signing key by `kid`, refreshing once on a miss.
    ///
    /// A miss against a fresh key set fetched less than
    /// `min_refresh_interval` ago fails without a fetch.
    ///
    /// # Errors
    ///
    /// Returns `KeyNotFound` if the key is absent after a refresh (or the
    /// refresh is throttled), or the fetch error if the refresh fails.
    pub async fn get_key(&self, kid: &str) -> Result<SigningKey, JwksError> {
        if let Some(key) = self.cached_key(kid).await {
            tracing::trace!(kid, "JWKS cache hit");
            return Ok(key);
        }

        let mut cached = self.cached.write().await;

        // Another task may have refreshed while we waited for the lock.
        if let Some(entry) = cached.as_ref().filter(|e| e.is_fresh()) {
            if let Some(key) = entry.find(kid) {
                return Ok(key);
            }
            if entry.fetched_at.elapsed() < self.config.min_refresh_interval {
                tracing::debug!(kid, uri = %self.uri, "Unknown kid, JWKS refresh throttled");
                return Err(JwksError::KeyNotFound(kid.to_string()));
            }
        }

        tracing::debug!(kid, uri = %self.uri, "JWKS cache miss");
        let entry = self.fetch().await?;
        let key = entry.find(kid);
        *cached = Some(entry);

        key.ok_or_else(|| JwksError::KeyNotFound(kid.to_string()))
    }

    /// Returns every signing key, for tokens without a `kid` header.
    ///
    /// # Errors
    ///
    /// Returns `NoSigningKeys` if the set is empty, or the fetch error.
    pub async fn find_signing_keys(&self) -> Result<Vec<SigningKey>, JwksError> {
        {
            let cached = self.cached.read().await;
            if let Some(entry) = cached.as_ref().filter(|e| e.is_fresh()) {
                return non_empty(entry.keys.clone());
            }
        }

        let mut cached = self.cached.write().await;
        if let Some(entry) = cached.as_ref().filter(|e| e.is_fresh()) {
            return non_empty(entry.keys.clone());
        }
        let entry = self.fetch().await?;
        let keys = entry.keys.clone();
        *cached = Some(entry);
        non_empty(keys)
    }

    async fn cached_key(&self, kid: &str) -> Option<SigningKey> {
        let cached = self.cached.read().await;
        cached.as_ref().filter(|e| e.is_fresh())?.find(kid)
    }

    /// Downloads and decodes the key set.
    async fn fetch(&self) -> Result<CachedKeys, JwksError> {
        tracing::debug!(uri = %self.uri, "Fetching JWKS");

        let response = self
            .http_client
            .get(self.uri.as_str())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(uri = %self.uri, error = %e, "Failed to fetch JWKS");
                JwksError::NetworkError(e.to_string())
            })?;

        if !response.status().is_success() {
            return Err(JwksError::HttpError(response.status().as_u16()));
        }

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_response_size
        {
            return Err(JwksError::ResponseTooLarge {
                max_size: self.config.max_response_size,
            });
        }

        let ttl = ttl_from_cache_control(response.headers(), &self.config);

        let jwks: JwkSet = response
            .json()
            .await
            .map_err(|e| JwksError::ParseError(e.to_string()))?;

        let keys = signing_keys(&jwks);
        tracing::debug!(uri = %self.uri, keys = keys.len(), ?ttl, "Cached JWKS");

        let fetched_at = Instant::now();
        Ok(CachedKeys {
            keys,
            fetched_at,
            expires_at: fetched_at + ttl,
        })
    }
}

fn non_empty(keys: Vec<SigningKey>) -> Result<Vec<SigningKey>, JwksError> {
    if keys.is_empty() {
        Err(JwksError::NoSigningKeys)
    } else {
        Ok(keys)
    }
}

fn validate_scheme(uri: &Url, allow_http: bool) -> Result<(), JwksError> {
    match uri.scheme() {
        "https" => Ok(()),
        "http" if allow_http => Ok(()),
        _ => Err(JwksError::InvalidScheme),
    }
}

/// Decodes the usable signing keys. Encryption keys and keys that fail to
/// decode are skipped.
fn signing_keys(jwks: &JwkSet) -> Vec<SigningKey> {
    jwks.keys
        .iter()
        .filter(|k| !matches!(k.common.public_key_use, Some(PublicKeyUse::Encryption)))
        .filter_map(|jwk| {
            DecodingKey::from_jwk(jwk).ok().map(|key| SigningKey {
                kid: jwk.common.key_id.clone(),
                key,
                algorithm: jwk_algorithm(jwk),
            })
        })
        .collect()
}

fn ttl_from_cache_control(
    headers: &reqwest::header::HeaderMap,
    config: &JwksCacheConfig,
) -> Duration {
    let ttl = headers
        .get(reqwest::header::CACHE_CONTROL)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            v.split(',').find_map(|directive| {
                directive
                    .trim()
                    .strip_prefix("max-age=")
                    .and_then(|s| s.parse::<u64>().ok())
            })
        })
        .map(Duration::from_secs)
        .unwrap_or(config.default_ttl);

    ttl.min(config.max_ttl).max(config.min_ttl)
}

/// Maps the JWK `alg` member to a verification algorithm.
pub(crate) fn jwk_algorithm(jwk: &Jwk) -> Option<Algorithm> {
    jwk.common.key_algorithm.as_ref().and_then(|alg| match alg {
        KeyAlgorithm::HS256 => Some(Algorithm::HS256),
        KeyAlgorithm::HS384 => Some(Algorithm::HS384),
        KeyAlgorithm::HS512 => Some(Algorithm::HS512),
        KeyAlgorithm::RS256 => Some(Algorithm::RS256),
        KeyAlgorithm::RS384 => Some(Algorithm::RS384),
        KeyAlgorithm::RS512 => Some(Algorithm::RS512),
        KeyAlgorithm::ES256 => Some(Algorithm::ES256),
        KeyAlgorithm::ES384 => Some(Algorithm::ES384),
        KeyAlgorithm::PS256 => Some(Algorithm::PS256),
        KeyAlgorithm::PS384 => Some(Algorithm::PS384),
        KeyAlgorithm::PS512 => Some(Algorithm::PS512),
        KeyAlgorithm::EdDSA => Some(Algorithm::EdDSA),
        _ => None,
    })
}

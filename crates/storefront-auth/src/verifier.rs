//! The identity verifier seam.
//!
//! The gate only needs "token in, subject id out". Production wires in
//! [`JwtVerifier`](crate::jwt::JwtVerifier); tests substitute fakes.

use std::sync::Arc;

use async_trait::async_trait;
use jsonwebtoken::errors::ErrorKind;

/// Verifies a bearer credential and returns the subject id it names.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Verifies `token`.
    ///
    /// # Errors
    ///
    /// Returns a [`VerifyError`] describing why the token was rejected.
    async fn verify(&self, token: &str) -> Result<String, VerifyError>;
}

/// Shared identity verifier.
pub type DynIdentityVerifier = Arc<dyn IdentityVerifier>;

/// Detailed verification failures. Logged, never sent to clients.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    /// Not a structurally valid token.
    #[error("malformed token: {0}")]
    Malformed(String),

    /// The token has expired.
    #[error("token expired")]
    Expired,

    /// The signature does not match any known key.
    #[error("invalid signature")]
    InvalidSignature,

    /// Issuer, audience, subject or time claims are not acceptable.
    #[error("invalid claims: {0}")]
    InvalidClaims(String),

    /// No verification key could be obtained.
    #[error("signing key unavailable: {0}")]
    KeyUnavailable(String),

    /// Verification did not finish within its budget.
    #[error("verification timed out")]
    Timeout,
}

impl From<jsonwebtoken::errors::Error> for VerifyError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::InvalidIssuer => Self::InvalidClaims("issuer".to_string()),
            ErrorKind::InvalidAudience => Self::InvalidClaims("audience".to_string()),
            ErrorKind::InvalidSubject => Self::InvalidClaims("subject".to_string()),
            ErrorKind::ImmatureSignature => Self::InvalidClaims("not yet valid".to_string()),
            ErrorKind::MissingRequiredClaim(claim) => {
                Self::InvalidClaims(format!("missing claim {claim}"))
            }
            ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
                Self::InvalidClaims("algorithm".to_string())
            }
            ErrorKind::InvalidKeyFormat | ErrorKind::InvalidRsaKey(_) | ErrorKind::InvalidEcdsaKey => {
                Self::KeyUnavailable(err.to_string())
            }
            _ => Self::Malformed(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_maps_jsonwebtoken_errors() {
        let expired: jsonwebtoken::errors::Error = ErrorKind::ExpiredSignature.into();
        assert_eq!(VerifyError::from(expired), VerifyError::Expired);

        let signature: jsonwebtoken::errors::Error = ErrorKind::InvalidSignature.into();
        assert_eq!(VerifyError::from(signature), VerifyError::InvalidSignature);

        let token: jsonwebtoken::errors::Error = ErrorKind::InvalidToken.into();
        assert!(matches!(VerifyError::from(token), VerifyError::Malformed(_)));
    }
}

//! Externally visible authentication errors.
//!
//! The gate reports exactly two outcomes to clients. Which verifier check
//! failed is logged but never put in the response.

/// Response message for requests without a credential.
pub const MISSING_CREDENTIAL_MESSAGE: &str = "Unauthorized: missing access token";

/// Response message for every rejected credential.
pub const INVALID_CREDENTIAL_MESSAGE: &str = "Unauthorized: invalid or expired token";

/// Errors returned by the authentication gate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// Neither the `Authorization` header nor the cookie carried a token.
    #[error("missing credential")]
    MissingCredential,

    /// The token was rejected by the identity verifier.
    ///
    /// `reason` is for logs only.
    #[error("invalid credential: {reason}")]
    InvalidCredential {
        /// Internal description of the failure.
        reason: String,
    },
}

impl AuthError {
    /// Creates a new `InvalidCredential` error.
    #[must_use]
    pub fn invalid_credential(reason: impl Into<String>) -> Self {
        Self::InvalidCredential {
            reason: reason.into(),
        }
    }

    /// The message shown to clients.
    #[must_use]
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::MissingCredential => MISSING_CREDENTIAL_MESSAGE,
            Self::InvalidCredential { .. } => INVALID_CREDENTIAL_MESSAGE,
        }
    }

    /// OAuth 2.0 bearer error code (RFC 6750) for the `WWW-Authenticate` header.
    #[must_use]
    pub fn bearer_error_code(&self) -> Option<&'static str> {
        match self {
            // RFC 6750 §3.1: no error code when credentials are absent.
            Self::MissingCredential => None,
            Self::InvalidCredential { .. } => Some("invalid_token"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_message_hides_reason() {
        let expired = AuthError::invalid_credential("token expired");
        let malformed = AuthError::invalid_credential("malformed token");
        assert_eq!(expired.public_message(), malformed.public_message());
        assert!(!expired.public_message().contains("expired token"));
        assert_eq!(expired.public_message(), INVALID_CREDENTIAL_MESSAGE);
    }

    #[test]
    fn test_missing_credential_message() {
        assert_eq!(
            AuthError::MissingCredential.public_message(),
            MISSING_CREDENTIAL_MESSAGE
        );
        assert!(AuthError::MissingCredential.bearer_error_code().is_none());
    }
}

//! Error types shared by the identity primitives.

use thiserror::Error;

/// Errors raised while building or parsing a delegation chain.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DelegationError {
    /// A required field was empty
    #[error("Delegation field `{0}` must not be empty")]
    EmptyField(&'static str),

    /// The chain would nest deeper than the allowed maximum
    #[error("Delegation chain depth {depth} exceeds maximum of {max}")]
    DepthExceeded { depth: usize, max: usize },

    /// The claim value did not have the expected shape
    #[error("Malformed delegation claim: {0}")]
    Malformed(String),
}

/// Errors raised while authenticating an inbound caller.
///
/// These reject a request before any workflow is created and are never
/// retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthenticationError {
    /// No bearer token was presented
    #[error("Missing bearer token")]
    Missing,

    /// The token's `exp` is in the past
    #[error("Token has expired")]
    Expired,

    /// Signature, format or claim validation failed
    #[error("Invalid token: {0}")]
    Invalid(String),

    /// The verifier could not be built from its configuration
    #[error("Verifier configuration error: {0}")]
    Configuration(String),
}

impl AuthenticationError {
    /// HTTP status an outer layer should answer with
    pub fn status_code(&self) -> u16 {
        match self {
            AuthenticationError::Configuration(_) => 500,
            _ => 401,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DelegationError::DepthExceeded { depth: 11, max: 10 };
        assert_eq!(
            err.to_string(),
            "Delegation chain depth 11 exceeds maximum of 10"
        );

        let err = DelegationError::EmptyField("subject");
        assert!(err.to_string().contains("subject"));
    }

    #[test]
    fn test_authentication_status_codes() {
        assert_eq!(AuthenticationError::Missing.status_code(), 401);
        assert_eq!(AuthenticationError::Expired.status_code(), 401);
        assert_eq!(
            AuthenticationError::Configuration("bad pem".into()).status_code(),
            500
        );
    }
}

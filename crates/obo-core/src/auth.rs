//! Inbound bearer verification.
//!
//! Signature, issuer and audience are checked by `jsonwebtoken`; `exp` and
//! `nbf` are checked here against the caller-supplied clock with a leeway,
//! so tests can drive time explicitly.

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::HashSet;

use crate::error::AuthenticationError;
use crate::token::Token;

/// Key material used to check inbound signatures
pub enum VerificationKey {
    /// Shared HMAC secret (HS256/384/512)
    Secret(SecretString),
    /// PEM-encoded RSA public key (RS256/384/512)
    RsaPem(String),
}

impl std::fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerificationKey::Secret(_) => f.write_str("Secret([REDACTED])"),
            VerificationKey::RsaPem(_) => f.write_str("RsaPem(..)"),
        }
    }
}

#[derive(Debug)]
pub struct VerifierConfig {
    pub key: VerificationKey,
    pub algorithm: Algorithm,
    pub issuer: Option<String>,
    pub audience: Option<String>,
    pub leeway_secs: i64,
}

impl VerifierConfig {
    pub fn hs256(secret: impl Into<String>) -> Self {
        Self {
            key: VerificationKey::Secret(SecretString::new(secret.into())),
            algorithm: Algorithm::HS256,
            issuer: None,
            audience: None,
            leeway_secs: 30,
        }
    }

    pub fn rs256_pem(pem: impl Into<String>) -> Self {
        Self {
            key: VerificationKey::RsaPem(pem.into()),
            algorithm: Algorithm::RS256,
            issuer: None,
            audience: None,
            leeway_secs: 30,
        }
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    pub fn with_leeway_secs(mut self, leeway_secs: i64) -> Self {
        self.leeway_secs = leeway_secs;
        self
    }
}

/// The authenticated end user a workflow runs for
#[derive(Debug, Clone)]
pub struct Principal {
    pub subject: String,
    pub username: Option<String>,
    /// The verified bearer, forwarded as the subject token of an exchange
    pub token: Token,
}

#[derive(Debug, Deserialize)]
struct InboundClaims {
    sub: Option<String>,
    preferred_username: Option<String>,
    exp: i64,
    nbf: Option<i64>,
}

/// Verifies inbound bearer JWTs
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
    leeway_secs: i64,
}

impl TokenVerifier {
    pub fn new(config: VerifierConfig) -> Result<Self, AuthenticationError> {
        let key = match &config.key {
            VerificationKey::Secret(secret) => {
                DecodingKey::from_secret(secret.expose_secret().as_bytes())
            }
            VerificationKey::RsaPem(pem) => DecodingKey::from_rsa_pem(pem.as_bytes())
                .map_err(|e| AuthenticationError::Configuration(e.to_string()))?,
        };

        let mut validation = Validation::new(config.algorithm);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.required_spec_claims = HashSet::from(["exp".to_string()]);
        match &config.audience {
            Some(aud) => validation.set_audience(&[aud]),
            None => validation.validate_aud = false,
        }
        if let Some(iss) = &config.issuer {
            validation.set_issuer(&[iss]);
        }

        Ok(Self {
            key,
            validation,
            leeway_secs: config.leeway_secs,
        })
    }

    pub fn verify(&self, bearer: &str) -> Result<Principal, AuthenticationError> {
        self.verify_at(bearer, Utc::now())
    }

    /// Verify against an explicit clock
    pub fn verify_at(
        &self,
        bearer: &str,
        now: DateTime<Utc>,
    ) -> Result<Principal, AuthenticationError> {
        let bearer = bearer.trim();
        if bearer.is_empty() {
            return Err(AuthenticationError::Missing);
        }

        let data = decode::<InboundClaims>(bearer, &self.key, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthenticationError::Expired,
                ErrorKind::InvalidSignature => {
                    AuthenticationError::Invalid("signature is invalid".to_string())
                }
                _ => AuthenticationError::Invalid(e.to_string()),
            }
        })?;
        let claims = data.claims;

        let now = now.timestamp();
        if let Some(nbf) = claims.nbf {
            if now + self.leeway_secs < nbf {
                return Err(AuthenticationError::Invalid("token not yet valid".to_string()));
            }
        }
        if claims.exp < now - self.leeway_secs {
            return Err(AuthenticationError::Expired);
        }

        let subject = claims
            .sub
            .clone()
            .filter(|s| !s.is_empty())
            .or_else(|| claims.preferred_username.clone())
            .ok_or_else(|| AuthenticationError::Invalid("token has no subject".to_string()))?;

        tracing::debug!(subject = %subject, "Inbound token verified");

        Ok(Principal {
            subject,
            username: claims.preferred_username,
            token: Token::access_token(bearer),
        })
    }
}

//! Bearer tokens.
//!
//! The bearer string is held in a [`SecretString`] so it cannot leak through
//! `Debug` or a stray log field; diagnostics use [`Token::fingerprint`].

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, TimeZone, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// RFC 8693 token type for OAuth access tokens
pub const TOKEN_TYPE_ACCESS: &str = "urn:ietf:params:oauth:token-type:access_token";

/// RFC 8693 token type for JWTs
pub const TOKEN_TYPE_JWT: &str = "urn:ietf:params:oauth:token-type:jwt";

const FINGERPRINT_PREFIX_LEN: usize = 12;

/// Non-secret facts about a token.
///
/// `issuer`, `audience` and `expires_at` are read from the unverified JWT
/// payload when the bearer looks like a JWT; they are informational only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TokenMetadata {
    pub issuer: Option<String>,
    pub audience: Option<String>,
    pub token_type: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Opaque bearer token plus metadata
pub struct Token {
    bearer: SecretString,
    metadata: TokenMetadata,
}

impl Token {
    /// Wrap a bearer string, decoding JWT metadata when possible
    pub fn new(bearer: impl Into<String>, token_type: impl Into<String>) -> Self {
        let bearer = bearer.into();
        let mut metadata = decode_jwt_metadata(&bearer).unwrap_or_default();
        metadata.token_type = token_type.into();

        Self {
            bearer: SecretString::new(bearer),
            metadata,
        }
    }

    /// An OAuth access token as presented by an end user
    pub fn access_token(bearer: impl Into<String>) -> Self {
        Self::new(bearer, TOKEN_TYPE_ACCESS)
    }

    /// The raw bearer string. Only for building `Authorization` headers.
    pub fn expose(&self) -> &str {
        self.bearer.expose_secret()
    }

    pub fn metadata(&self) -> &TokenMetadata {
        &self.metadata
    }

    pub fn len(&self) -> usize {
        self.expose().len()
    }

    pub fn is_empty(&self) -> bool {
        self.expose().is_empty()
    }

    /// Log-safe identification: a short prefix and the length
    pub fn fingerprint(&self) -> String {
        let prefix: String = self.expose().chars().take(FINGERPRINT_PREFIX_LEN).collect();
        format!("{}…(len={})", prefix, self.len())
    }

    /// Set the expiry when the bearer itself does not carry one
    pub fn with_fallback_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        if self.metadata.expires_at.is_none() {
            self.metadata.expires_at = Some(expires_at);
        }
        self
    }

    /// True when the token carries an `exp` that is behind `now + skew`
    pub fn is_expired_at(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        self.metadata
            .expires_at
            .map(|exp| exp <= now + skew)
            .unwrap_or(false)
    }
}

impl Clone for Token {
    fn clone(&self) -> Self {
        Self {
            bearer: SecretString::new(self.expose().to_string()),
            metadata: self.metadata.clone(),
        }
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("bearer", &self.fingerprint())
            .field("metadata", &self.metadata)
            .finish()
    }
}

/// A token minted by the STS for exactly one target resource
#[derive(Debug, Clone)]
pub struct OboToken {
    token: Token,
    resource: String,
}

impl OboToken {
    pub fn new(token: Token, resource: impl Into<String>) -> Self {
        Self {
            token,
            resource: resource.into(),
        }
    }

    pub fn token(&self) -> &Token {
        &self.token
    }

    /// The resource the STS scoped this token to
    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn into_token(self) -> Token {
        self.token
    }
}

fn decode_jwt_metadata(bearer: &str) -> Option<TokenMetadata> {
    let mut segments = bearer.split('.');
    let (_header, payload, _signature) = (segments.next()?, segments.next()?, segments.next()?);
    if segments.next().is_some() {
        return None;
    }

    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: Value = serde_json::from_slice(&bytes).ok()?;

    let audience = match claims.get("aud") {
        Some(Value::String(aud)) => Some(aud.clone()),
        Some(Value::Array(auds)) => auds.first().and_then(|a| a.as_str()).map(str::to_string),
        _ => None,
    };

    Some(TokenMetadata {
        issuer: claims.get("iss").and_then(|v| v.as_str()).map(str::to_string),
        audience,
        token_type: String::new(),
        expires_at: claims
            .get("exp")
            .and_then(|v| v.as_i64())
            .and_then(|exp| Utc.timestamp_opt(exp, 0).single()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fake_jwt(claims: Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(claims.to_string().as_bytes());
        format!("{}.{}.sig", header, payload)
    }

    #[test]
    fn test_jwt_metadata_is_decoded() {
        let jwt = fake_jwt(json!({
            "iss": "http://keycloak:8080/realms/mcp-realm",
            "aud": ["supply-chain-agent", "account"],
            "exp": 4_102_444_800i64
        }));
        let token = Token::new(jwt, TOKEN_TYPE_JWT);

        let meta = token.metadata();
        assert_eq!(meta.issuer.as_deref(), Some("http://keycloak:8080/realms/mcp-realm"));
        assert_eq!(meta.audience.as_deref(), Some("supply-chain-agent"));
        assert_eq!(meta.token_type, TOKEN_TYPE_JWT);
        assert!(meta.expires_at.is_some());
    }

    #[test]
    fn test_opaque_token_has_no_claims() {
        let token = Token::access_token("opaque-token-value");
        assert!(token.metadata().issuer.is_none());
        assert!(token.metadata().expires_at.is_none());
        assert!(!token.is_expired_at(Utc::now(), Duration::zero()));
    }

    #[test]
    fn test_expiry_with_skew() {
        let now = Utc::now();
        let jwt = fake_jwt(json!({ "exp": (now + Duration::seconds(20)).timestamp() }));
        let token = Token::new(jwt, TOKEN_TYPE_JWT);

        assert!(!token.is_expired_at(now, Duration::zero()));
        assert!(token.is_expired_at(now, Duration::seconds(30)));
    }

    #[test]
    fn test_fallback_expiry_only_fills_gaps() {
        let later = Utc::now() + Duration::hours(2);
        let opaque = Token::access_token("opaque").with_fallback_expiry(later);
        assert_eq!(opaque.metadata().expires_at, Some(later));

        let jwt = fake_jwt(json!({ "exp": 4_102_444_800i64 }));
        let token = Token::new(jwt, TOKEN_TYPE_JWT).with_fallback_expiry(later);
        assert_ne!(token.metadata().expires_at, Some(later));
    }

    #[test]
    fn test_debug_never_shows_bearer() {
        let secret = "eyJhbGciOiJSUzI1NiJ9.super-secret-payload.signature";
        let token = Token::access_token(secret);
        let debug = format!("{:?}", token);

        assert!(!debug.contains("super-secret-payload"));
        assert!(debug.contains(&format!("len={}", secret.len())));
    }

    #[test]
    fn test_fingerprint() {
        let token = Token::access_token("abcdefghijklmnopqrstuvwxyz");
        assert_eq!(token.fingerprint(), "abcdefghijkl…(len=26)");
    }

    #[test]
    fn test_obo_token_resource() {
        let obo = OboToken::new(Token::new("t", TOKEN_TYPE_JWT), "supply-chain-agent");
        assert_eq!(obo.resource(), "supply-chain-agent");
        assert_eq!(obo.clone().into_token().expose(), "t");
    }
}

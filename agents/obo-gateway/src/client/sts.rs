//! RFC 8693 token exchange client
//!
//! One POST per call, no retries. Every outcome is a [`TokenExchangeError`]
//! variant or an [`OboToken`]; the client never panics on STS behavior.

use chrono::{Duration as ChronoDuration, Utc};
use obo_core::{OboToken, Token, TOKEN_TYPE_ACCESS, TOKEN_TYPE_JWT};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::Instrument;

use crate::client::cache::{CacheKey, TokenCache};
use crate::config::HttpTimeouts;
use crate::error::{ConfigError, TokenExchangeError};

pub const GRANT_TYPE_TOKEN_EXCHANGE: &str = "urn:ietf:params:oauth:grant-type:token-exchange";

/// Parameters of one exchange
#[derive(Debug, Clone)]
pub struct ExchangeRequest {
    pub subject_token: Token,
    pub subject_token_type: String,
    pub requested_token_type: String,
    pub resource: String,
    pub actor_token: String,
    /// Overrides the client's request deadline for this call
    pub timeout: Option<Duration>,
}

impl ExchangeRequest {
    pub fn new(
        subject_token: Token,
        resource: impl Into<String>,
        actor_token: impl Into<String>,
    ) -> Self {
        Self {
            subject_token,
            subject_token_type: TOKEN_TYPE_ACCESS.to_string(),
            requested_token_type: TOKEN_TYPE_JWT.to_string(),
            resource: resource.into(),
            actor_token: actor_token.into(),
            timeout: None,
        }
    }

    pub fn subject_token_type(mut self, token_type: impl Into<String>) -> Self {
        self.subject_token_type = token_type.into();
        self
    }

    pub fn requested_token_type(mut self, token_type: impl Into<String>) -> Self {
        self.requested_token_type = token_type.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[derive(Serialize)]
struct ExchangeForm<'a> {
    grant_type: &'a str,
    subject_token: &'a str,
    subject_token_type: &'a str,
    requested_token_type: &'a str,
    resource: &'a str,
    actor_token: &'a str,
}

#[derive(Deserialize)]
struct ExchangeResponse {
    access_token: Option<String>,
    issued_token_type: Option<String>,
    expires_in: Option<i64>,
}

/// Result of an STS health probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StsHealth {
    /// `connected` or `error`
    pub status: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StsHealth {
    pub fn is_connected(&self) -> bool {
        self.status == "connected"
    }
}

pub struct TokenExchangeClient {
    sts_url: String,
    client: Client,
    cache: Option<TokenCache>,
}

impl TokenExchangeClient {
    pub fn new(sts_url: impl Into<String>, timeouts: HttpTimeouts) -> Result<Self, ConfigError> {
        Ok(Self {
            sts_url: sts_url.into().trim_end_matches('/').to_string(),
            client: timeouts.client()?,
            cache: None,
        })
    }

    pub fn with_cache(mut self, cache: TokenCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn sts_url(&self) -> &str {
        &self.sts_url
    }

    pub fn token_endpoint(&self) -> String {
        format!("{}/api/v1/token", self.sts_url)
    }

    /// Exchange the subject token for a token scoped to `request.resource`
    pub async fn exchange(&self, request: &ExchangeRequest) -> Result<OboToken, TokenExchangeError> {
        let span = tracing::info_span!("token_exchange", resource = %request.resource);
        async {
            let key = CacheKey::new(&request.resource, &request.actor_token, &request.subject_token);
            if let Some(cache) = &self.cache {
                if let Some(token) = cache.get(&key).await {
                    tracing::debug!(token = %token.token().fingerprint(), "Using cached OBO token");
                    return Ok(token);
                }
            }

            let token = self.post_exchange(request).await?;
            if let Some(cache) = &self.cache {
                cache.insert(key, token.clone()).await;
            }
            Ok(token)
        }
        .instrument(span)
        .await
    }

    async fn post_exchange(&self, request: &ExchangeRequest) -> Result<OboToken, TokenExchangeError> {
        let form = ExchangeForm {
            grant_type: GRANT_TYPE_TOKEN_EXCHANGE,
            subject_token: request.subject_token.expose(),
            subject_token_type: &request.subject_token_type,
            requested_token_type: &request.requested_token_type,
            resource: &request.resource,
            actor_token: &request.actor_token,
        };

        tracing::info!(
            actor = %request.actor_token,
            subject = %request.subject_token.fingerprint(),
            "Requesting OBO token"
        );

        let mut builder = self.client.post(self.token_endpoint()).form(&form);
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(|e| {
            let detail = if e.is_timeout() {
                format!("timed out: {}", e)
            } else {
                e.to_string()
            };
            tracing::warn!(error = %detail, "Token exchange request failed");
            TokenExchangeError::Transport(detail)
        })?;

        let status = response.status();
        tracing::debug!(status = status.as_u16(), "Token exchange response received");

        match status {
            StatusCode::OK => {
                let body = response
                    .text()
                    .await
                    .map_err(|e| TokenExchangeError::Transport(e.to_string()))?;
                let token = parse_exchange_body(&body, &request.requested_token_type)?;
                tracing::info!(token = %token.fingerprint(), "Token exchange succeeded");
                Ok(OboToken::new(token, request.resource.clone()))
            }
            StatusCode::BAD_REQUEST => Err(TokenExchangeError::BadRequest),
            StatusCode::UNAUTHORIZED => Err(TokenExchangeError::Unauthorized),
            StatusCode::FORBIDDEN => Err(TokenExchangeError::UntrustedIssuer),
            other => {
                let body = response.text().await.unwrap_or_default();
                tracing::warn!(status = other.as_u16(), "Unexpected token exchange status");
                Err(TokenExchangeError::Transport(format!(
                    "unexpected status {}: {}",
                    other.as_u16(),
                    body
                )))
            }
        }
    }

    /// `GET <sts_url>/health`; never fails
    pub async fn health_check(&self) -> StsHealth {
        let url = format!("{}/health", self.sts_url);
        match self.client.get(&url).send().await {
            Ok(response) if response.status().is_success() => StsHealth {
                status: "connected".to_string(),
                url: self.sts_url.clone(),
                error: None,
            },
            Ok(response) => StsHealth {
                status: "error".to_string(),
                url: self.sts_url.clone(),
                error: Some(format!(
                    "Health check failed with status {}",
                    response.status().as_u16()
                )),
            },
            Err(e) => StsHealth {
                status: "error".to_string(),
                url: self.sts_url.clone(),
                error: Some(e.to_string()),
            },
        }
    }
}

fn parse_exchange_body(body: &str, requested_type: &str) -> Result<Token, TokenExchangeError> {
    let parsed: ExchangeResponse = serde_json::from_str(body)
        .map_err(|e| TokenExchangeError::MalformedResponse(e.to_string()))?;

    let access_token = parsed
        .access_token
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| TokenExchangeError::MalformedResponse("missing access_token".to_string()))?;

    let token_type = parsed
        .issued_token_type
        .unwrap_or_else(|| requested_type.to_string());
    let mut token = Token::new(access_token, token_type);
    // An `expires_in` past the representable range leaves the expiry unknown
    let expires_at = parsed
        .expires_in
        .filter(|secs| *secs > 0)
        .and_then(ChronoDuration::try_seconds)
        .and_then(|ttl| Utc::now().checked_add_signed(ttl));
    if let Some(expires_at) = expires_at {
        token = token.with_fallback_expiry(expires_at);
    }
    Ok(token)
}

//! Axum extractors for trace context and bearer tokens.
//!
//! `TraceContextExtractor` never rejects: a missing or malformed
//! `traceparent` yields `None`. `BearerTokenExtractor` rejects with
//! `401 UNAUTHORIZED` when no `Authorization: Bearer` header is present.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use crate::codec::TraceContextCodec;
use crate::context::TraceContext;
use crate::headers::HeaderBag;

/// Inbound trace context from request headers, if any
pub struct TraceContextExtractor(pub Option<TraceContext>);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for TraceContextExtractor {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let bag = HeaderBag::from(&parts.headers);
        Ok(Self(TraceContextCodec::new().extract_one(&bag)))
    }
}

/// Raw bearer token from the `Authorization` header
pub struct BearerTokenExtractor(pub String);

/// Rejection for a missing bearer token
pub struct MissingBearerRejection;

impl IntoResponse for MissingBearerRejection {
    fn into_response(self) -> Response {
        (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "error": "MISSING_BEARER_TOKEN",
                "message": "Authorization header with a Bearer token is required"
            })),
        )
            .into_response()
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for BearerTokenExtractor {
    type Rejection = MissingBearerRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        HeaderBag::from(&parts.headers)
            .bearer_token()
            .map(|token| Self(token.to_string()))
            .ok_or(MissingBearerRejection)
    }
}

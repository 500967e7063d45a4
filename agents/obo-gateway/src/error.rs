//! Error types for the workflow gateway
//!
//! Every outcome of a network call is a tagged variant; nothing here panics.

use obo_core::DelegationError;
use thiserror::Error;
use uuid::Uuid;

/// Outcome of a failed OBO token exchange
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenExchangeError {
    /// The STS rejected the request as malformed (400)
    #[error("Token exchange bad request")]
    BadRequest,

    /// The subject or actor token failed validation (401)
    #[error("Token exchange unauthorized: subject or actor token failed validation")]
    Unauthorized,

    /// The subject token's issuer is not trusted by the STS (403)
    #[error("Token exchange forbidden: issuer not trusted")]
    UntrustedIssuer,

    /// 200 response that carried no usable `access_token`
    #[error("Malformed token exchange response: {0}")]
    MalformedResponse(String),

    /// Network failure, timeout or an unexpected status
    #[error("Token exchange transport error: {0}")]
    Transport(String),
}

impl TokenExchangeError {
    /// The STS looked at the request and refused it
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            TokenExchangeError::BadRequest
                | TokenExchangeError::Unauthorized
                | TokenExchangeError::UntrustedIssuer
        )
    }

    /// HTTP status that produced this error, when there was one
    pub fn status_code(&self) -> Option<u16> {
        match self {
            TokenExchangeError::BadRequest => Some(400),
            TokenExchangeError::Unauthorized => Some(401),
            TokenExchangeError::UntrustedIssuer => Some(403),
            TokenExchangeError::MalformedResponse(_) => Some(200),
            TokenExchangeError::Transport(_) => None,
        }
    }
}

/// Failure of a downstream agent call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DownstreamAgentError {
    /// The agent answered with a JSON-RPC error object
    #[error("Agent returned error {code}: {message}")]
    ErrorResponse { code: i64, message: String },

    /// Non-2xx HTTP status
    #[error("Agent returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Network failure or timeout
    #[error("Agent transport error: {0}")]
    Transport(String),

    /// The response body was not a JSON-RPC response
    #[error("Unparseable agent response: {0}")]
    Unparseable(String),

    /// The response carried no text
    #[error("Agent returned no text content")]
    EmptyResponse,
}

impl DownstreamAgentError {
    pub fn is_client_error(&self) -> bool {
        matches!(self, DownstreamAgentError::Status { status, .. } if (400..500).contains(status))
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            DownstreamAgentError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Errors surfaced by the workflow coordinator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("Workflow request {0} not found")]
    NotFound(Uuid),

    #[error("Timed out waiting for workflow request {0}")]
    WaitTimeout(Uuid),

    #[error(transparent)]
    TokenExchange(#[from] TokenExchangeError),

    #[error(transparent)]
    Downstream(#[from] DownstreamAgentError),

    #[error(transparent)]
    Delegation(#[from] DelegationError),

    /// The background unit of work ended abnormally
    #[error("Workflow aborted: {0}")]
    Aborted(String),
}

impl WorkflowError {
    pub fn is_client_error(&self) -> bool {
        match self {
            WorkflowError::NotFound(_) => true,
            WorkflowError::TokenExchange(e) => e.is_client_error(),
            WorkflowError::Downstream(e) => e.is_client_error(),
            _ => false,
        }
    }

    /// HTTP status an outer layer should answer a polling call with
    pub fn status_code(&self) -> u16 {
        match self {
            WorkflowError::NotFound(_) => 404,
            WorkflowError::WaitTimeout(_) => 504,
            WorkflowError::TokenExchange(_) | WorkflowError::Downstream(_) => 502,
            WorkflowError::Delegation(_) | WorkflowError::Aborted(_) => 500,
        }
    }
}

/// Configuration loading and validation errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid configuration: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),
}

impl ConfigError {
    pub fn is_client_error(&self) -> bool {
        matches!(self, ConfigError::Parse(_) | ConfigError::Validation(_))
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exchange_error_classification() {
        assert!(TokenExchangeError::Unauthorized.is_client_error());
        assert!(!TokenExchangeError::Transport("reset".into()).is_client_error());
        assert_eq!(TokenExchangeError::UntrustedIssuer.status_code(), Some(403));
        assert_eq!(TokenExchangeError::Transport("x".into()).status_code(), None);
    }

    #[test]
    fn test_workflow_error_wraps_sources() {
        let err: WorkflowError = TokenExchangeError::BadRequest.into();
        assert_eq!(err.to_string(), "Token exchange bad request");
        assert_eq!(err.status_code(), 502);

        let err = WorkflowError::NotFound(Uuid::nil());
        assert_eq!(err.status_code(), 404);
        assert!(err.is_client_error());
    }

    #[test]
    fn test_validation_message_lists_problems() {
        let err = ConfigError::Validation(vec!["sts_url is empty".into(), "read timeout is zero".into()]);
        assert_eq!(
            err.to_string(),
            "Invalid configuration: sts_url is empty; read timeout is zero"
        );
    }
}

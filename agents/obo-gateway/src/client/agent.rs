//! Downstream agent client (A2A JSON-RPC over HTTP)

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::config::HttpTimeouts;
use crate::error::{ConfigError, DownstreamAgentError};
use crate::interceptor::{CallInterceptorChain, TransportArgs};

pub const METHOD_MESSAGE_SEND: &str = "message/send";
pub const AGENT_CARD_PATH: &str = ".well-known/agent.json";

/// A downstream reply reduced to its text plus the raw JSON-RPC result
#[derive(Debug, Clone)]
pub struct AgentReply {
    pub text: String,
    pub raw: Value,
}

/// Moves one call to the downstream agent.
///
/// Interceptors have already been applied to `params` and `args` by the time
/// this is called.
#[async_trait]
pub trait AgentTransport: Send + Sync {
    fn agent_id(&self) -> &str;

    async fn call(
        &self,
        method: &str,
        params: Value,
        args: TransportArgs,
    ) -> Result<AgentReply, DownstreamAgentError>;
}

/// `message/send` params carrying one user text part
pub fn message_params(text: &str) -> Value {
    json!({
        "message": {
            "role": "user",
            "messageId": Uuid::new_v4().to_string(),
            "kind": "message",
            "parts": [{ "kind": "text", "text": text }]
        }
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCard {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

pub struct AgentClient {
    base_url: String,
    agent_id: String,
    client: Client,
}

impl AgentClient {
    pub fn new(
        base_url: impl Into<String>,
        agent_id: impl Into<String>,
        timeouts: HttpTimeouts,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: base_url.into(),
            agent_id: agent_id.into(),
            client: timeouts.client()?,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Apply `chain` and send one `message/send` call
    pub async fn send_text(
        &self,
        text: &str,
        chain: &CallInterceptorChain,
        args: TransportArgs,
    ) -> Result<AgentReply, DownstreamAgentError> {
        let (params, args) = chain.apply(METHOD_MESSAGE_SEND, message_params(text), args);
        self.call(METHOD_MESSAGE_SEND, params, args).await
    }

    /// `GET <agent_url>/.well-known/agent.json`
    pub async fn fetch_agent_card(&self) -> Result<AgentCard, DownstreamAgentError> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), AGENT_CARD_PATH);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| DownstreamAgentError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(DownstreamAgentError::Status { status, body });
        }

        response
            .json()
            .await
            .map_err(|e| DownstreamAgentError::Unparseable(e.to_string()))
    }
}

#[async_trait]
impl AgentTransport for AgentClient {
    fn agent_id(&self) -> &str {
        &self.agent_id
    }

    async fn call(
        &self,
        method: &str,
        params: Value,
        args: TransportArgs,
    ) -> Result<AgentReply, DownstreamAgentError> {
        let envelope = json!({
            "jsonrpc": "2.0",
            "id": Uuid::new_v4().to_string(),
            "method": method,
            "params": params,
        });

        let mut request = self.client.post(&self.base_url).json(&envelope);
        for (name, value) in args.headers.iter() {
            request = request.header(name, value);
        }

        tracing::info!(agent = %self.agent_id, method, "Calling downstream agent");

        let response = request.send().await.map_err(|e| {
            let detail = if e.is_timeout() {
                format!("timed out: {}", e)
            } else {
                e.to_string()
            };
            DownstreamAgentError::Transport(detail)
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DownstreamAgentError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| DownstreamAgentError::Unparseable(e.to_string()))?;
        parse_reply(body)
    }
}

/// Map a JSON-RPC response body to a reply or a typed error
pub fn parse_reply(body: Value) -> Result<AgentReply, DownstreamAgentError> {
    if let Some(error) = body.get("error").filter(|e| !e.is_null()) {
        return Err(DownstreamAgentError::ErrorResponse {
            code: error.get("code").and_then(Value::as_i64).unwrap_or(0),
            message: error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string(),
        });
    }

    let result = body
        .get("result")
        .filter(|r| !r.is_null())
        .ok_or_else(|| DownstreamAgentError::Unparseable("missing result".to_string()))?;

    let text = extract_text(result).ok_or(DownstreamAgentError::EmptyResponse)?;
    Ok(AgentReply {
        text,
        raw: result.clone(),
    })
}

/// Text of a result, from the first place that has any: the message's own
/// parts, task artifacts, the task status message, then agent history
pub fn extract_text(result: &Value) -> Option<String> {
    let from_artifacts = || {
        result.get("artifacts").and_then(Value::as_array).and_then(|artifacts| {
            non_empty(artifacts.iter().filter_map(|a| parts_text(a.get("parts"))).collect())
        })
    };
    let from_status = || parts_text(result.pointer("/status/message/parts"));
    let from_history = || {
        result.get("history").and_then(Value::as_array).and_then(|history| {
            non_empty(
                history
                    .iter()
                    .filter(|m| m.get("role").and_then(Value::as_str) == Some("agent"))
                    .filter_map(|m| parts_text(m.get("parts")))
                    .collect(),
            )
        })
    };

    parts_text(result.get("parts"))
        .or_else(from_artifacts)
        .or_else(from_status)
        .or_else(from_history)
}

fn parts_text(parts: Option<&Value>) -> Option<String> {
    let parts = parts?.as_array()?;
    non_empty(
        parts
            .iter()
            .filter_map(|p| p.get("text").and_then(Value::as_str))
            .filter(|t| !t.trim().is_empty())
            .map(str::to_string)
            .collect(),
    )
}

fn non_empty(chunks: Vec<String>) -> Option<String> {
    (!chunks.is_empty()).then(|| chunks.join("\n"))
}

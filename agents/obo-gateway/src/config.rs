//! Gateway configuration
//!
//! Values come from environment variables ([`GatewayConfig::from_env`]), a
//! TOML file ([`GatewayConfig::load`]) or the builder. Unset fields fall back
//! to the defaults below.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Four separate HTTP timeouts; there is no single overall deadline knob
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HttpTimeouts {
    #[serde(with = "secs")]
    pub connect: Duration,
    #[serde(with = "secs")]
    pub read: Duration,
    #[serde(with = "secs")]
    pub write: Duration,
    #[serde(with = "secs")]
    pub pool: Duration,
}

impl HttpTimeouts {
    pub const fn from_secs(connect: u64, read: u64, write: u64, pool: u64) -> Self {
        Self {
            connect: Duration::from_secs(connect),
            read: Duration::from_secs(read),
            write: Duration::from_secs(write),
            pool: Duration::from_secs(pool),
        }
    }

    /// STS defaults: 10s connect, 30s read, 10s write, 10s pool
    pub const fn sts_default() -> Self {
        Self::from_secs(10, 30, 10, 10)
    }

    /// Downstream agent defaults: 30s connect, 120s read, 30s write, 30s pool
    pub const fn agent_default() -> Self {
        Self::from_secs(30, 120, 30, 30)
    }

    /// Upper bound for one request: connect, then write, then read
    pub fn request_deadline(&self) -> Duration {
        self.connect.saturating_add(self.write).saturating_add(self.read)
    }

    /// Build a reqwest client honoring these timeouts, with no retries
    pub fn client(&self) -> Result<reqwest::Client, ConfigError> {
        reqwest::Client::builder()
            .connect_timeout(self.connect)
            .read_timeout(self.read)
            .pool_idle_timeout(self.pool)
            .timeout(self.request_deadline())
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))
    }

    fn from_env(prefix: &str, defaults: HttpTimeouts) -> Self {
        let read = |name: &str, default: Duration| {
            std::env::var(format!("{}_{}_TIMEOUT", prefix, name))
                .ok()
                .and_then(|v| parse_secs(&v))
                .unwrap_or(default)
        };
        Self {
            connect: read("CONNECT", defaults.connect),
            read: read("READ", defaults.read),
            write: read("WRITE", defaults.write),
            pool: read("POOL", defaults.pool),
        }
    }
}

/// What to do when an OBO exchange fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeFailurePolicy {
    /// Fail the workflow
    #[default]
    Abort,
    /// Log a warning and forward the caller's own access token
    #[serde(alias = "forward")]
    ForwardSubjectToken,
}

impl FromStr for ExchangeFailurePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "abort" => Ok(Self::Abort),
            "forward" | "forward_subject_token" => Ok(Self::ForwardSubjectToken),
            other => Err(ConfigError::Parse(format!(
                "unknown exchange failure policy `{}` (expected abort or forward)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// STS base URL; the token endpoint is `<sts_url>/api/v1/token`
    pub sts_url: String,

    /// This service's identity, sent as the exchange `actor_token`
    pub actor_identity: String,

    pub downstream_agent_url: String,

    /// Target resource of the exchange and audience of the delegation chain
    pub downstream_agent_id: String,

    pub delegation_scope: String,

    pub sts_timeouts: HttpTimeouts,
    pub agent_timeouts: HttpTimeouts,

    pub exchange_failure_policy: ExchangeFailurePolicy,

    /// Pause between progress steps, for demos
    pub step_delay_ms: u64,

    pub token_cache_enabled: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            sts_url: "http://localhost:8081".to_string(),
            actor_identity: "spiffe://cluster.local/ns/default/sa/backend".to_string(),
            downstream_agent_url: "http://localhost:9999/".to_string(),
            downstream_agent_id: "supply-chain-agent".to_string(),
            delegation_scope: "supply-chain:optimize".to_string(),
            sts_timeouts: HttpTimeouts::sts_default(),
            agent_timeouts: HttpTimeouts::agent_default(),
            exchange_failure_policy: ExchangeFailurePolicy::Abort,
            step_delay_ms: 0,
            token_cache_enabled: true,
        }
    }
}

impl GatewayConfig {
    pub fn builder() -> GatewayConfigBuilder {
        GatewayConfigBuilder::new()
    }

    /// Read from environment variables; unparseable values keep the default
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let string = |key: &str, default: String| std::env::var(key).unwrap_or(default);

        Self {
            sts_url: string("AGENT_STS_URL", defaults.sts_url),
            actor_identity: string("AGENT_ACTOR_ID", defaults.actor_identity),
            downstream_agent_url: string("SUPPLY_CHAIN_AGENT_URL", defaults.downstream_agent_url),
            downstream_agent_id: string("SUPPLY_CHAIN_AGENT_ID", defaults.downstream_agent_id),
            delegation_scope: string("DELEGATION_SCOPE", defaults.delegation_scope),
            sts_timeouts: HttpTimeouts::from_env("AGENT_STS", defaults.sts_timeouts),
            agent_timeouts: HttpTimeouts::from_env("SUPPLY_CHAIN", defaults.agent_timeouts),
            exchange_failure_policy: std::env::var("EXCHANGE_FAILURE_POLICY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.exchange_failure_policy),
            step_delay_ms: std::env::var("WORKFLOW_STEP_DELAY_MS")
                .map(|v| v.parse().unwrap_or(defaults.step_delay_ms))
                .unwrap_or(defaults.step_delay_ms),
            token_cache_enabled: std::env::var("TOKEN_CACHE_ENABLED")
                .map(|v| v.parse().unwrap_or(defaults.token_cache_enabled))
                .unwrap_or(defaults.token_cache_enabled),
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Collect every problem instead of stopping at the first
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        for (name, url) in [
            ("sts_url", &self.sts_url),
            ("downstream_agent_url", &self.downstream_agent_url),
        ] {
            if url.trim().is_empty() {
                problems.push(format!("{} is empty", name));
            } else if !(url.starts_with("http://") || url.starts_with("https://")) {
                problems.push(format!("{} must be an http(s) URL, got `{}`", name, url));
            }
        }

        for (name, value) in [
            ("actor_identity", &self.actor_identity),
            ("downstream_agent_id", &self.downstream_agent_id),
            ("delegation_scope", &self.delegation_scope),
        ] {
            if value.trim().is_empty() {
                problems.push(format!("{} is empty", name));
            }
        }

        for (name, timeouts) in [("sts", &self.sts_timeouts), ("agent", &self.agent_timeouts)] {
            if timeouts.connect.is_zero() {
                problems.push(format!("{} connect timeout is zero", name));
            }
            if timeouts.read.is_zero() {
                problems.push(format!("{} read timeout is zero", name));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(problems))
        }
    }

    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.step_delay_ms)
    }
}

pub struct GatewayConfigBuilder {
    config: GatewayConfig,
}

impl GatewayConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: GatewayConfig::default(),
        }
    }

    pub fn sts_url(mut self, url: impl Into<String>) -> Self {
        self.config.sts_url = url.into();
        self
    }

    pub fn actor_identity(mut self, identity: impl Into<String>) -> Self {
        self.config.actor_identity = identity.into();
        self
    }

    pub fn downstream_agent(mut self, url: impl Into<String>, id: impl Into<String>) -> Self {
        self.config.downstream_agent_url = url.into();
        self.config.downstream_agent_id = id.into();
        self
    }

    pub fn delegation_scope(mut self, scope: impl Into<String>) -> Self {
        self.config.delegation_scope = scope.into();
        self
    }

    pub fn sts_timeouts(mut self, timeouts: HttpTimeouts) -> Self {
        self.config.sts_timeouts = timeouts;
        self
    }

    pub fn agent_timeouts(mut self, timeouts: HttpTimeouts) -> Self {
        self.config.agent_timeouts = timeouts;
        self
    }

    pub fn exchange_failure_policy(mut self, policy: ExchangeFailurePolicy) -> Self {
        self.config.exchange_failure_policy = policy;
        self
    }

    pub fn step_delay_ms(mut self, delay: u64) -> Self {
        self.config.step_delay_ms = delay;
        self
    }

    pub fn token_cache(mut self, enabled: bool) -> Self {
        self.config.token_cache_enabled = enabled;
        self
    }

    pub fn build(self) -> GatewayConfig {
        self.config
    }
}

impl Default for GatewayConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Non-negative (fractional) seconds that fit in a `Duration`
fn parse_secs(raw: &str) -> Option<Duration> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
}

/// Durations as (fractional) seconds
mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(format!(
                "timeout must be a non-negative number of seconds, got {}",
                secs
            ))
        })
    }
}

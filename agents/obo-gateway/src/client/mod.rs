//! Outbound HTTP clients: the STS and the downstream agent

pub mod agent;
pub mod cache;
pub mod sts;

pub use agent::{AgentCard, AgentClient, AgentReply, AgentTransport};
pub use cache::{CacheKey, TokenCache};
pub use sts::{ExchangeRequest, StsHealth, TokenExchangeClient};

//! Application context
//!
//! Built once from a [`GatewayConfig`] and passed by reference to whatever
//! serves requests. Tests build their own isolated instances.

use obo_core::{AuthenticationError, Principal, TokenVerifier};
use obo_trace::{InboundContextResolver, InboundEnvelope, TraceContextCodec};
use std::sync::Arc;
use uuid::Uuid;

use crate::client::{AgentClient, AgentTransport, TokenCache, TokenExchangeClient};
use crate::config::GatewayConfig;
use crate::contracts::WorkflowInput;
use crate::engine::{CoordinatorSettings, TokenStrategy, WorkflowCoordinator, WorkflowSubmission};
use crate::error::ConfigError;

pub struct Gateway {
    config: GatewayConfig,
    sts: Arc<TokenExchangeClient>,
    agent: Arc<AgentClient>,
    coordinator: WorkflowCoordinator,
    resolver: InboundContextResolver,
    codec: TraceContextCodec,
    verifier: Option<TokenVerifier>,
}

impl Gateway {
    pub fn from_config(config: GatewayConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut sts = TokenExchangeClient::new(config.sts_url.clone(), config.sts_timeouts)?;
        if config.token_cache_enabled {
            sts = sts.with_cache(TokenCache::new());
        }
        let sts = Arc::new(sts);

        let agent = Arc::new(AgentClient::new(
            config.downstream_agent_url.clone(),
            config.downstream_agent_id.clone(),
            config.agent_timeouts,
        )?);

        let coordinator = WorkflowCoordinator::new(
            agent.clone() as Arc<dyn AgentTransport>,
            TokenStrategy::Exchange {
                client: sts.clone(),
                policy: config.exchange_failure_policy,
            },
            CoordinatorSettings::from_config(&config),
        );

        tracing::info!(
            sts_url = %config.sts_url,
            agent = %config.downstream_agent_id,
            policy = ?config.exchange_failure_policy,
            "Gateway initialized"
        );

        Ok(Self {
            config,
            sts,
            agent,
            coordinator,
            resolver: InboundContextResolver::new(),
            codec: TraceContextCodec::new(),
            verifier: None,
        })
    }

    /// Verify inbound bearers before accepting work
    pub fn with_verifier(mut self, verifier: TokenVerifier) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn sts(&self) -> &TokenExchangeClient {
        &self.sts
    }

    pub fn agent(&self) -> &AgentClient {
        &self.agent
    }

    pub fn coordinator(&self) -> &WorkflowCoordinator {
        &self.coordinator
    }

    /// Authenticate an inbound request and start a workflow for it.
    ///
    /// Headers are located with the inbound resolver; the parent trace comes
    /// from the first source with a valid `traceparent`.
    pub async fn accept<E: InboundEnvelope + ?Sized>(
        &self,
        envelope: &E,
        input: WorkflowInput,
    ) -> Result<Uuid, AuthenticationError> {
        let candidates = self.resolver.candidates(envelope);
        let principal = self.authenticate(&candidates)?;
        let parent = self.codec.extract(&candidates);

        let submission =
            WorkflowSubmission::from_principal(&principal, input).with_parent_trace(parent);
        Ok(self.coordinator.create(submission).await)
    }

    fn authenticate(&self, candidates: &[obo_trace::HeaderBag]) -> Result<Principal, AuthenticationError> {
        let verifier = self.verifier.as_ref().ok_or_else(|| {
            AuthenticationError::Configuration("no inbound token verifier configured".to_string())
        })?;
        let bearer = candidates
            .iter()
            .find_map(|bag| bag.bearer_token())
            .ok_or(AuthenticationError::Missing)?;
        verifier.verify(bearer)
    }
}

//! Workflow coordinator
//!
//! Owns the `Pending -> Running -> {Completed, Failed}` state machine. Each
//! request runs as one background task that acquires a token, describes the
//! delegation, calls the downstream agent through the interceptor chain and
//! stores the synthesized result.

pub mod store;
pub mod synthesis;

use chrono::Utc;
use obo_core::{DelegationChain, Principal, Token};
use obo_trace::{HeaderBag, TraceContext, TraceContextCodec};
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;
use uuid::Uuid;

use crate::client::agent::{message_params, AgentTransport, METHOD_MESSAGE_SEND};
use crate::client::sts::{ExchangeRequest, TokenExchangeClient};
use crate::config::{ExchangeFailurePolicy, GatewayConfig};
use crate::contracts::{ActivityStatus, AgentActivity, WorkflowInput, WorkflowRequest, WorkflowResult};
use crate::error::WorkflowError;
use crate::interceptor::{
    AuthHeaderInterceptor, CallInterceptor, CallInterceptorChain, TraceHeaderInterceptor,
    TransportArgs,
};

pub use store::WorkflowStore;
pub use synthesis::{compose_message, is_completion_text, synthesize, STRUCTURED_MARKER};

/// How the outbound bearer is obtained
#[derive(Clone)]
pub enum TokenStrategy {
    /// Forward the caller's access token unchanged
    Direct,
    /// Exchange it for an OBO token scoped to the downstream agent
    Exchange {
        client: Arc<TokenExchangeClient>,
        policy: ExchangeFailurePolicy,
    },
}

#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub actor_identity: String,
    pub delegation_scope: String,
    pub step_delay: Duration,
    /// Sent on every outbound call, under the trace headers
    pub static_headers: HeaderBag,
}

impl CoordinatorSettings {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            actor_identity: config.actor_identity.clone(),
            delegation_scope: config.delegation_scope.clone(),
            step_delay: config.step_delay(),
            static_headers: HeaderBag::new(),
        }
    }
}

/// Everything a background unit needs to run one request
#[derive(Debug, Clone)]
pub struct WorkflowSubmission {
    pub subject: String,
    pub token: Token,
    pub input: WorkflowInput,
    pub parent_trace: Option<TraceContext>,
}

impl WorkflowSubmission {
    pub fn new(subject: impl Into<String>, token: Token, input: WorkflowInput) -> Self {
        Self {
            subject: subject.into(),
            token,
            input,
            parent_trace: None,
        }
    }

    pub fn from_principal(principal: &Principal, input: WorkflowInput) -> Self {
        Self::new(principal.subject.clone(), principal.token.clone(), input)
    }

    pub fn with_parent_trace(mut self, parent: Option<TraceContext>) -> Self {
        self.parent_trace = parent;
        self
    }
}

struct Inner {
    store: WorkflowStore,
    transport: Arc<dyn AgentTransport>,
    tokens: TokenStrategy,
    settings: CoordinatorSettings,
    codec: TraceContextCodec,
    trace_interceptor: Arc<dyn CallInterceptor>,
}

/// Cheap to clone; clones share the same store
#[derive(Clone)]
pub struct WorkflowCoordinator {
    inner: Arc<Inner>,
}

impl WorkflowCoordinator {
    pub fn new(
        transport: Arc<dyn AgentTransport>,
        tokens: TokenStrategy,
        settings: CoordinatorSettings,
    ) -> Self {
        let codec = TraceContextCodec::new();
        let trace_interceptor: Arc<dyn CallInterceptor> = Arc::new(TraceHeaderInterceptor::new(
            settings.static_headers.clone(),
            codec,
        ));
        Self {
            inner: Arc::new(Inner {
                store: WorkflowStore::new(),
                transport,
                tokens,
                settings,
                codec,
                trace_interceptor,
            }),
        }
    }

    /// Register a Pending request and start its background unit.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn create(&self, submission: WorkflowSubmission) -> Uuid {
        let id = Uuid::new_v4();
        self.inner.store.insert_pending(id).await;
        tracing::info!(request_id = %id, subject = %submission.subject, "Workflow request created");

        tokio::spawn(supervise(self.inner.clone(), id, submission));
        id
    }

    pub async fn get_progress(&self, id: Uuid) -> Result<WorkflowRequest, WorkflowError> {
        self.inner.store.get(id).await.ok_or(WorkflowError::NotFound(id))
    }

    /// Only completed requests have a result
    pub async fn get_result(&self, id: Uuid) -> Result<WorkflowResult, WorkflowError> {
        self.inner
            .store
            .get_result(id)
            .await
            .ok_or(WorkflowError::NotFound(id))
    }

    pub async fn list(&self) -> Vec<WorkflowRequest> {
        self.inner.store.list().await
    }

    /// Drop every request and result. Running units keep going but their
    /// writes are ignored.
    pub async fn clear_all(&self) {
        self.inner.store.clear().await;
        tracing::info!("Cleared all workflow requests");
    }

    /// Resolve once `id` is Completed or Failed
    pub async fn wait_for_terminal(
        &self,
        id: Uuid,
        timeout: Duration,
    ) -> Result<WorkflowRequest, WorkflowError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let settled = self.inner.store.settled();
            let request = self.get_progress(id).await?;
            if request.status.is_terminal() {
                return Ok(request);
            }
            if tokio::time::timeout_at(deadline, settled).await.is_err() {
                return Err(WorkflowError::WaitTimeout(id));
            }
        }
    }
}

async fn supervise(inner: Arc<Inner>, id: Uuid, submission: WorkflowSubmission) {
    let ctx = match &submission.parent_trace {
        Some(parent) => inner.codec.derive_child(parent),
        None => TraceContext::new_root(),
    };
    let span = tracing::info_span!("workflow", request_id = %id, trace_id = %ctx.trace_id_hex());

    let task = tokio::spawn(execute(inner.clone(), id, submission, ctx).instrument(span.clone()));

    async move {
        match task.await {
            Ok(Ok(())) => tracing::info!("Workflow completed"),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Workflow failed");
                inner.store.fail(id, &e.to_string()).await;
            }
            Err(join_error) => {
                let err = WorkflowError::Aborted(join_error.to_string());
                tracing::error!(error = %err, "Workflow unit ended abnormally");
                inner.store.fail(id, &err.to_string()).await;
            }
        }
    }
    .instrument(span)
    .await
}

async fn execute(
    inner: Arc<Inner>,
    id: Uuid,
    submission: WorkflowSubmission,
    ctx: TraceContext,
) -> Result<(), WorkflowError> {
    let agent_id = inner.transport.agent_id().to_string();

    inner.step(id, 0.0, "Connecting to downstream agent").await;

    inner.step(id, 10.0, "Acquiring delegated token").await;
    let token = inner.acquire_token(&submission, &agent_id).await?;
    let delegation = inner.delegation_for(&submission.subject, &agent_id)?;
    tracing::debug!(delegation = %delegation, "Delegation chain built");

    inner.step(id, 30.0, format!("Calling {}", agent_id)).await;
    let chain = CallInterceptorChain::new()
        .with(AuthHeaderInterceptor::new(token))
        .with_shared(inner.trace_interceptor.clone());
    let text = compose_message(&submission.input);
    let (params, args) = chain.apply(
        METHOD_MESSAGE_SEND,
        message_params(&text),
        TransportArgs::new().with_trace(ctx),
    );
    let reply = inner.transport.call(METHOD_MESSAGE_SEND, params, args).await?;

    inner.step(id, 90.0, "Processing agent response").await;
    let result = synthesize(id, &agent_id, &reply.text);
    tracing::info!(
        structured = result.structured,
        completion = result.completion_detected,
        response_chars = result.response_chars,
        "Downstream response received"
    );

    let activity = AgentActivity {
        id: 1,
        timestamp: Utc::now(),
        agent_name: agent_id,
        action: "optimization_step".to_string(),
        delegation,
        status: ActivityStatus::Completed,
        details: synthesis::excerpt(&reply.text),
    };
    inner
        .store
        .complete(id, activity, result, "Workflow completed")
        .await;
    Ok(())
}

impl Inner {
    async fn step(&self, id: Uuid, percentage: f64, label: impl Into<String>) {
        let label = label.into();
        tracing::debug!(progress = percentage, step = %label, "Workflow progress");
        self.store.progress(id, percentage, label).await;
        if !self.settings.step_delay.is_zero() {
            tokio::time::sleep(self.settings.step_delay).await;
        }
    }

    async fn acquire_token(
        &self,
        submission: &WorkflowSubmission,
        agent_id: &str,
    ) -> Result<Token, WorkflowError> {
        let (client, policy) = match &self.tokens {
            TokenStrategy::Direct => return Ok(submission.token.clone()),
            TokenStrategy::Exchange { client, policy } => (client, *policy),
        };

        let request = ExchangeRequest::new(
            submission.token.clone(),
            agent_id,
            self.settings.actor_identity.clone(),
        );
        match client.exchange(&request).await {
            Ok(obo) => Ok(obo.into_token()),
            Err(e) => match policy {
                ExchangeFailurePolicy::Abort => Err(e.into()),
                ExchangeFailurePolicy::ForwardSubjectToken => {
                    tracing::warn!(
                        error = %e,
                        token = %submission.token.fingerprint(),
                        "Token exchange failed; forwarding the caller's access token"
                    );
                    Ok(submission.token.clone())
                }
            },
        }
    }

    /// `{sub: user, aud: agent, scope, act: {sub: actor identity, aud: agent, scope}}`
    fn delegation_for(&self, subject: &str, agent_id: &str) -> Result<DelegationChain, WorkflowError> {
        let scope = &self.settings.delegation_scope;
        let actor = DelegationChain::build(&*self.settings.actor_identity, agent_id, scope.as_str(), None)?;
        Ok(DelegationChain::build(subject, agent_id, scope.as_str(), Some(actor))?)
    }
}

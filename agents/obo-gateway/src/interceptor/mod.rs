//! Outbound call interceptors
//!
//! Each interceptor maps `(method, payload, args)` to a new `(payload, args)`
//! just before a call leaves the process. Interceptors hold only immutable
//! configuration, so one instance can serve any number of concurrent calls.

use obo_core::Token;
use obo_trace::{HeaderBag, TraceContext, TraceContextCodec};
use serde_json::Value;
use std::sync::Arc;

/// Per-call transport arguments
#[derive(Debug, Clone, Default)]
pub struct TransportArgs {
    pub headers: HeaderBag,
    /// Trace context of the calling span, injected by [`TraceHeaderInterceptor`]
    pub trace: Option<TraceContext>,
}

impl TransportArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_trace(mut self, trace: TraceContext) -> Self {
        self.trace = Some(trace);
        self
    }
}

pub trait CallInterceptor: Send + Sync {
    fn name(&self) -> &'static str;

    fn intercept(&self, method: &str, payload: Value, args: TransportArgs) -> (Value, TransportArgs);
}

/// Sets `Authorization: Bearer <token>`
pub struct AuthHeaderInterceptor {
    token: Token,
}

impl AuthHeaderInterceptor {
    pub fn new(token: Token) -> Self {
        Self { token }
    }
}

impl CallInterceptor for AuthHeaderInterceptor {
    fn name(&self) -> &'static str {
        "auth_header"
    }

    fn intercept(&self, method: &str, payload: Value, mut args: TransportArgs) -> (Value, TransportArgs) {
        args.headers
            .insert("authorization", format!("Bearer {}", self.token.expose()));
        tracing::debug!(method, token = %self.token.fingerprint(), "Attached bearer token");
        (payload, args)
    }
}

/// Merges static headers, then overlays the injected trace context.
///
/// Trace headers always win over a static or caller-supplied header of the
/// same name. Without a trace context in the args a new root trace is started.
pub struct TraceHeaderInterceptor {
    static_headers: HeaderBag,
    codec: TraceContextCodec,
}

impl TraceHeaderInterceptor {
    pub fn new(static_headers: HeaderBag, codec: TraceContextCodec) -> Self {
        Self {
            static_headers,
            codec,
        }
    }
}

impl Default for TraceHeaderInterceptor {
    fn default() -> Self {
        Self::new(HeaderBag::new(), TraceContextCodec::new())
    }
}

impl CallInterceptor for TraceHeaderInterceptor {
    fn name(&self) -> &'static str {
        "trace_header"
    }

    fn intercept(&self, method: &str, payload: Value, mut args: TransportArgs) -> (Value, TransportArgs) {
        args.headers.overlay(&self.static_headers);

        let ctx = args.trace.clone().unwrap_or_else(TraceContext::new_root);
        args.headers.overlay(&self.codec.inject(&ctx));
        tracing::debug!(method, trace_id = %ctx.trace_id_hex(), span_id = %ctx.span_id_hex(), "Injected trace context");

        args.trace = Some(ctx);
        (payload, args)
    }
}

/// Ordered list of interceptors applied in insertion order
#[derive(Clone, Default)]
pub struct CallInterceptorChain {
    interceptors: Vec<Arc<dyn CallInterceptor>>,
}

impl CallInterceptorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, interceptor: impl CallInterceptor + 'static) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    pub fn with_shared(mut self, interceptor: Arc<dyn CallInterceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.interceptors.iter().map(|i| i.name()).collect()
    }

    pub fn apply(&self, method: &str, payload: Value, args: TransportArgs) -> (Value, TransportArgs) {
        self.interceptors
            .iter()
            .fold((payload, args), |(payload, args), interceptor| {
                interceptor.intercept(method, payload, args)
            })
    }
}

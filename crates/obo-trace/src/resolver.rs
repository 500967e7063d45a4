//! Locating headers on an inbound RPC request.
//!
//! Depending on the transport, inbound headers may sit on the request wrapper
//! itself, inside a call-state map, in a generic metadata map, or only on the
//! underlying HTTP request. [`InboundContextResolver`] tries a fixed, named
//! list of [`ProbeStrategy`] values against an [`InboundEnvelope`] and stops at
//! the first one that yields a non-empty [`HeaderBag`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::headers::HeaderBag;

/// Metadata keys that carry trace information
pub const TRACE_METADATA_KEYS: &[&str] = &["traceparent", "tracestate", "trace-context"];

/// Key of the header map inside a call-state map
pub const CALL_STATE_HEADERS_KEY: &str = "headers";

/// The places an inbound request may expose headers.
///
/// Every accessor defaults to `None`; an envelope implements the ones its
/// transport actually has.
pub trait InboundEnvelope {
    fn headers(&self) -> Option<HeaderBag> {
        None
    }

    fn call_state(&self) -> Option<&Map<String, Value>> {
        None
    }

    fn metadata(&self) -> Option<&Map<String, Value>> {
        None
    }

    fn transport_headers(&self) -> Option<HeaderBag> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStrategy {
    /// Headers field on the request wrapper
    DirectHeaders,
    /// `headers` entry of the call-state map
    CallStateHeaders,
    /// Metadata map, filtered to [`TRACE_METADATA_KEYS`]
    TraceMetadata,
    /// Headers of the transport's own request object
    TransportHeaders,
}

impl ProbeStrategy {
    pub const DEFAULT_ORDER: [ProbeStrategy; 4] = [
        ProbeStrategy::DirectHeaders,
        ProbeStrategy::CallStateHeaders,
        ProbeStrategy::TraceMetadata,
        ProbeStrategy::TransportHeaders,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ProbeStrategy::DirectHeaders => "direct_headers",
            ProbeStrategy::CallStateHeaders => "call_state_headers",
            ProbeStrategy::TraceMetadata => "trace_metadata",
            ProbeStrategy::TransportHeaders => "transport_headers",
        }
    }

    /// Run this probe; empty bags count as not found
    pub fn probe<E: InboundEnvelope + ?Sized>(&self, envelope: &E) -> Option<HeaderBag> {
        let bag = match self {
            ProbeStrategy::DirectHeaders => envelope.headers(),
            ProbeStrategy::CallStateHeaders => envelope
                .call_state()
                .and_then(|state| state.get(CALL_STATE_HEADERS_KEY))
                .and_then(Value::as_object)
                .map(string_entries),
            ProbeStrategy::TraceMetadata => envelope
                .metadata()
                .map(string_entries)
                .map(|bag| bag.retain_keys(TRACE_METADATA_KEYS)),
            ProbeStrategy::TransportHeaders => envelope.transport_headers(),
        };
        bag.filter(|b| !b.is_empty())
    }
}

/// Ordered probe-with-fallback over an [`InboundEnvelope`]
#[derive(Debug, Clone)]
pub struct InboundContextResolver {
    strategies: Vec<ProbeStrategy>,
}

impl Default for InboundContextResolver {
    fn default() -> Self {
        Self {
            strategies: ProbeStrategy::DEFAULT_ORDER.to_vec(),
        }
    }
}

impl InboundContextResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_strategies(strategies: Vec<ProbeStrategy>) -> Self {
        Self { strategies }
    }

    pub fn strategies(&self) -> &[ProbeStrategy] {
        &self.strategies
    }

    /// First non-empty header bag, or `None`
    pub fn resolve<E: InboundEnvelope + ?Sized>(&self, envelope: &E) -> Option<HeaderBag> {
        self.resolve_with_source(envelope).map(|(_, bag)| bag)
    }

    /// Like [`resolve`](Self::resolve), also naming the strategy that matched
    pub fn resolve_with_source<E: InboundEnvelope + ?Sized>(
        &self,
        envelope: &E,
    ) -> Option<(ProbeStrategy, HeaderBag)> {
        let found = self
            .strategies
            .iter()
            .find_map(|strategy| strategy.probe(envelope).map(|bag| (*strategy, bag)));

        match &found {
            Some((strategy, bag)) => {
                tracing::debug!(strategy = strategy.name(), headers = bag.len(), "Resolved inbound headers")
            }
            None => tracing::debug!("No inbound headers found"),
        }
        found
    }

    /// Every non-empty bag in priority order, for callers that need to fall
    /// through a bag whose contents turn out unusable
    pub fn candidates<E: InboundEnvelope + ?Sized>(&self, envelope: &E) -> Vec<HeaderBag> {
        self.strategies
            .iter()
            .filter_map(|strategy| strategy.probe(envelope))
            .collect()
    }
}

fn string_entries(map: &Map<String, Value>) -> HeaderBag {
    map.iter()
        .filter_map(|(k, v)| v.as_str().map(|s| (k.as_str(), s)))
        .collect()
}

/// Inbound agent-RPC request context as received by a server handler
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct A2aRequestContext {
    pub headers: Option<HeaderBag>,
    pub call_state: Option<Map<String, Value>>,
    pub metadata: Option<Map<String, Value>>,
    #[serde(skip)]
    pub transport_headers: Option<HeaderBag>,
}

impl InboundEnvelope for A2aRequestContext {
    fn headers(&self) -> Option<HeaderBag> {
        self.headers.clone()
    }

    fn call_state(&self) -> Option<&Map<String, Value>> {
        self.call_state.as_ref()
    }

    fn metadata(&self) -> Option<&Map<String, Value>> {
        self.metadata.as_ref()
    }

    fn transport_headers(&self) -> Option<HeaderBag> {
        self.transport_headers.clone()
    }
}

impl InboundEnvelope for axum::http::HeaderMap {
    fn transport_headers(&self) -> Option<HeaderBag> {
        Some(HeaderBag::from(self))
    }
}

impl InboundEnvelope for HeaderBag {
    fn headers(&self) -> Option<HeaderBag> {
        Some(self.clone())
    }
}

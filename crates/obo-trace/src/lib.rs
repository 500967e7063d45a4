//! W3C trace-context propagation for agent-to-agent calls.
//!
//! # Pieces
//!
//! - [`HeaderBag`]: case-insensitive header map used on both sides of a call.
//! - [`TraceContextCodec`]: `traceparent`/`tracestate` extraction with
//!   multi-source fallback, injection and child-span derivation.
//! - [`InboundContextResolver`]: ordered probes that find the headers of an
//!   inbound RPC request wherever its transport put them.
//! - [`TraceContextExtractor`] / [`BearerTokenExtractor`]: axum extractors.
//!
//! # Usage
//!
//! ```rust
//! use obo_trace::{HeaderBag, TraceContextCodec};
//!
//! let inbound = HeaderBag::new()
//!     .with("traceparent", "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01");
//!
//! let codec = TraceContextCodec::new();
//! let parent = codec.extract(&[inbound]).unwrap();
//! let child = codec.derive_child(&parent);
//!
//! assert_eq!(child.trace_id(), parent.trace_id());
//! assert_ne!(child.span_id(), parent.span_id());
//! let outbound = codec.inject(&child);
//! assert!(outbound.contains("traceparent"));
//! ```

pub mod codec;
pub mod context;
pub mod extract;
pub mod headers;
pub mod resolver;

pub use codec::{TraceContextCodec, TRACEPARENT, TRACESTATE};
pub use context::TraceContext;
pub use extract::{BearerTokenExtractor, TraceContextExtractor};
pub use headers::HeaderBag;
pub use resolver::{A2aRequestContext, InboundContextResolver, InboundEnvelope, ProbeStrategy};

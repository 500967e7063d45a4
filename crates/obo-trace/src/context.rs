//! Trace context value.

use std::fmt;
use uuid::Uuid;

/// Maximum number of `tracestate` members
pub const MAX_TRACESTATE_MEMBERS: usize = 32;

/// W3C trace context: trace id, span id, sampling flag and vendor state.
///
/// The trace id is shared by every hop of a call tree; the span id identifies
/// one hop. Neither id is ever all zeroes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TraceContext {
    trace_id: [u8; 16],
    span_id: [u8; 8],
    sampled: bool,
    trace_state: Vec<(String, String)>,
}

impl TraceContext {
    /// Returns `None` if either id is all zeroes or `trace_state` holds an
    /// entry that cannot be carried in a `tracestate` header
    pub fn new(
        trace_id: [u8; 16],
        span_id: [u8; 8],
        sampled: bool,
        trace_state: Vec<(String, String)>,
    ) -> Option<Self> {
        if trace_id.iter().all(|b| *b == 0) || span_id.iter().all(|b| *b == 0) {
            return None;
        }
        if trace_state.len() > MAX_TRACESTATE_MEMBERS
            || !trace_state
                .iter()
                .all(|(k, v)| is_tracestate_key(k) && is_tracestate_value(v))
        {
            return None;
        }
        Some(Self {
            trace_id,
            span_id,
            sampled,
            trace_state,
        })
    }

    /// A fresh, sampled root context
    pub fn new_root() -> Self {
        Self {
            trace_id: random_trace_id(),
            span_id: random_span_id(),
            sampled: true,
            trace_state: Vec::new(),
        }
    }

    /// Same trace, same sampling decision and state, new span id
    pub fn child(&self) -> Self {
        let mut span_id = random_span_id();
        while span_id == self.span_id {
            span_id = random_span_id();
        }
        Self {
            trace_id: self.trace_id,
            span_id,
            sampled: self.sampled,
            trace_state: self.trace_state.clone(),
        }
    }

    pub fn trace_id(&self) -> [u8; 16] {
        self.trace_id
    }

    pub fn span_id(&self) -> [u8; 8] {
        self.span_id
    }

    pub fn trace_id_hex(&self) -> String {
        hex::encode(self.trace_id)
    }

    pub fn span_id_hex(&self) -> String {
        hex::encode(self.span_id)
    }

    pub fn sampled(&self) -> bool {
        self.sampled
    }

    pub fn trace_state(&self) -> &[(String, String)] {
        &self.trace_state
    }

    pub fn flags(&self) -> u8 {
        u8::from(self.sampled)
    }
}

impl fmt::Display for TraceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "00-{}-{}-{:02x}",
            self.trace_id_hex(),
            self.span_id_hex(),
            self.flags()
        )
    }
}

/// Lowercase letters, digits and `_-*/@`, at most 256 bytes
pub(crate) fn is_tracestate_key(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= 256
        && key.bytes().all(|b| {
            b.is_ascii_lowercase()
                || b.is_ascii_digit()
                || matches!(b, b'_' | b'-' | b'*' | b'/' | b'@')
        })
}

/// Printable ASCII other than `,` and `=`, with no surrounding spaces
pub(crate) fn is_tracestate_value(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= 256
        && value.trim() == value
        && value.bytes().all(|b| (0x20..=0x7e).contains(&b) && b != b',' && b != b'=')
}

// A v4 UUID carries fixed version bits in byte 6, so neither slice below can be all zero.
fn random_trace_id() -> [u8; 16] {
    *Uuid::new_v4().as_bytes()
}

fn random_span_id() -> [u8; 8] {
    let bytes = Uuid::new_v4().into_bytes();
    let mut span = [0u8; 8];
    span.copy_from_slice(&bytes[..8]);
    span
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_ids_rejected() {
        assert!(TraceContext::new([0; 16], [1; 8], true, vec![]).is_none());
        assert!(TraceContext::new([1; 16], [0; 8], true, vec![]).is_none());
        assert!(TraceContext::new([1; 16], [1; 8], true, vec![]).is_some());
    }

    #[test]
    fn test_unrepresentable_trace_state_rejected() {
        let state = |k: &str, v: &str| vec![(k.to_string(), v.to_string())];
        assert!(TraceContext::new([1; 16], [2; 8], true, state("Vendor", "a")).is_none());
        assert!(TraceContext::new([1; 16], [2; 8], true, state("vendor", "a,b")).is_none());
        assert!(TraceContext::new([1; 16], [2; 8], true, state("vendor", "a=b")).is_none());
        assert!(TraceContext::new([1; 16], [2; 8], true, state("vendor", "")).is_none());
        assert!(TraceContext::new([1; 16], [2; 8], true, state("vendor", " a")).is_none());
        assert!(TraceContext::new([1; 16], [2; 8], true, state("vendor", "a b")).is_some());

        let full: Vec<_> = (0..MAX_TRACESTATE_MEMBERS)
            .map(|i| (format!("k{}", i), "v".to_string()))
            .collect();
        assert!(TraceContext::new([1; 16], [2; 8], true, full.clone()).is_some());
        let mut over = full;
        over.push(("extra".to_string(), "v".to_string()));
        assert!(TraceContext::new([1; 16], [2; 8], true, over).is_none());
    }

    #[test]
    fn test_root_is_sampled() {
        let root = TraceContext::new_root();
        assert!(root.sampled());
        assert!(root.trace_state().is_empty());
        assert_eq!(root.trace_id_hex().len(), 32);
        assert_eq!(root.span_id_hex().len(), 16);
    }

    #[test]
    fn test_child_keeps_trace() {
        let parent = TraceContext::new([7; 16], [9; 8], false, vec![("k".into(), "v".into())])
            .unwrap();
        let child = parent.child();

        assert_eq!(child.trace_id(), parent.trace_id());
        assert_ne!(child.span_id(), parent.span_id());
        assert_eq!(child.sampled(), parent.sampled());
        assert_eq!(child.trace_state(), parent.trace_state());
    }

    #[test]
    fn test_display() {
        let ctx = TraceContext::new([0xab; 16], [0xcd; 8], true, vec![]).unwrap();
        assert_eq!(
            ctx.to_string(),
            "00-abababababababababababababababab-cdcdcdcdcdcdcdcd-01"
        );
    }
}

//! W3C `traceparent` / `tracestate` codec.
//!
//! Parsing never fails loudly: anything that is not a well-formed version
//! `00` traceparent is treated as absent and logged at debug level.

use crate::context::{
    is_tracestate_key, is_tracestate_value, TraceContext, MAX_TRACESTATE_MEMBERS,
};
use crate::headers::HeaderBag;

pub const TRACEPARENT: &str = "traceparent";
pub const TRACESTATE: &str = "tracestate";

const TRACE_VERSION: &str = "00";

/// Stateless codec; one instance may serve any number of concurrent calls
#[derive(Debug, Clone, Copy, Default)]
pub struct TraceContextCodec;

impl TraceContextCodec {
    pub fn new() -> Self {
        Self
    }

    /// First context found across `sources`, in priority order.
    ///
    /// A source whose traceparent is malformed is skipped; `tracestate` is
    /// read from the same source as the accepted traceparent.
    pub fn extract(&self, sources: &[HeaderBag]) -> Option<TraceContext> {
        sources.iter().find_map(|bag| self.extract_one(bag))
    }

    pub fn extract_one(&self, bag: &HeaderBag) -> Option<TraceContext> {
        let raw = bag.get(TRACEPARENT)?;
        let Some((trace_id, span_id, sampled)) = parse_traceparent(raw) else {
            tracing::debug!(traceparent = %raw, "Ignoring malformed traceparent");
            return None;
        };
        let trace_state = bag.get(TRACESTATE).map(parse_tracestate).unwrap_or_default();
        TraceContext::new(trace_id, span_id, sampled, trace_state)
    }

    /// Like [`extract`](Self::extract), but starts a new root trace when no
    /// source carries a usable context
    pub fn extract_or_root(&self, sources: &[HeaderBag]) -> TraceContext {
        self.extract(sources).unwrap_or_else(|| {
            tracing::debug!("No inbound trace context; starting a new trace");
            TraceContext::new_root()
        })
    }

    /// Serialize to `traceparent` and, when non-empty, `tracestate`
    pub fn inject(&self, ctx: &TraceContext) -> HeaderBag {
        let mut bag = HeaderBag::new();
        bag.insert(TRACEPARENT, ctx.to_string());
        if !ctx.trace_state().is_empty() {
            bag.insert(TRACESTATE, format_tracestate(ctx.trace_state()));
        }
        bag
    }

    pub fn derive_child(&self, parent: &TraceContext) -> TraceContext {
        parent.child()
    }
}

/// Parse a traceparent into `(trace_id, span_id, sampled)`
pub fn parse_traceparent(raw: &str) -> Option<([u8; 16], [u8; 8], bool)> {
    let parts: Vec<&str> = raw.trim().split('-').collect();
    if parts.len() != 4
        || parts[0] != TRACE_VERSION
        || !is_hex_id(parts[1], 32)
        || !is_hex_id(parts[2], 16)
        || !is_hex_id(parts[3], 2)
    {
        return None;
    }

    let mut trace_id = [0u8; 16];
    hex::decode_to_slice(parts[1], &mut trace_id).ok()?;
    let mut span_id = [0u8; 8];
    hex::decode_to_slice(parts[2], &mut span_id).ok()?;
    let mut flags = [0u8; 1];
    hex::decode_to_slice(parts[3], &mut flags).ok()?;

    if trace_id.iter().all(|b| *b == 0) || span_id.iter().all(|b| *b == 0) {
        return None;
    }
    Some((trace_id, span_id, flags[0] & 0x01 == 0x01))
}

/// Parse `k1=v1,k2=v2`, dropping members that are not `key=value`
pub fn parse_tracestate(raw: &str) -> Vec<(String, String)> {
    raw.split(',')
        .map(str::trim)
        .filter(|member| !member.is_empty())
        .filter_map(|member| {
            let (key, value) = member.split_once('=')?;
            let (key, value) = (key.trim(), value.trim());
            (is_tracestate_key(key) && is_tracestate_value(value))
                .then(|| (key.to_string(), value.to_string()))
        })
        .take(MAX_TRACESTATE_MEMBERS)
        .collect()
}

pub fn format_tracestate(entries: &[(String, String)]) -> String {
    entries
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

fn is_hex_id(value: &str, expected_len: usize) -> bool {
    value.len() == expected_len && value.bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01";

    #[test]
    fn test_parse_valid() {
        let (trace, span, sampled) = parse_traceparent(VALID).unwrap();
        assert_eq!(hex::encode(trace), "0af7651916cd43dd8448eb211c80319c");
        assert_eq!(hex::encode(span), "b7ad6b7169203331");
        assert!(sampled);
    }

    #[test]
    fn test_parse_unsampled_and_uppercase() {
        let (_, _, sampled) =
            parse_traceparent("00-0AF7651916CD43DD8448EB211C80319C-B7AD6B7169203331-00").unwrap();
        assert!(!sampled);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for raw in [
            "",
            "00-invalid",
            "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331",
            "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01-extra",
            "01-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01",
            "00-0af7651916cd43dd8448eb211c80319-b7ad6b7169203331-01",
            "00-0af7651916cd43dd8448eb211c80319c-b7ad6b716920333-01",
            "00-zzf7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01",
            "00-00000000000000000000000000000000-b7ad6b7169203331-01",
            "00-0af7651916cd43dd8448eb211c80319c-0000000000000000-01",
        ] {
            assert!(parse_traceparent(raw).is_none(), "accepted {:?}", raw);
        }
    }

    #[test]
    fn test_tracestate() {
        let parsed = parse_tracestate("rojo=00f067aa0ba902b7, congo=t61rcWkgMzE,,bad,=x");
        assert_eq!(
            parsed,
            vec![
                ("rojo".to_string(), "00f067aa0ba902b7".to_string()),
                ("congo".to_string(), "t61rcWkgMzE".to_string()),
            ]
        );
        assert_eq!(format_tracestate(&parsed), "rojo=00f067aa0ba902b7,congo=t61rcWkgMzE");
    }

    #[test]
    fn test_extract_priority_and_fallthrough() {
        let codec = TraceContextCodec::new();
        let malformed = HeaderBag::new().with(TRACEPARENT, "00-bad");
        let empty = HeaderBag::new().with("x-other", "1");
        let good = HeaderBag::new()
            .with(TRACEPARENT, VALID)
            .with(TRACESTATE, "vendor=abc");
        let later = HeaderBag::new().with(
            TRACEPARENT,
            "00-11111111111111111111111111111111-2222222222222222-01",
        );

        let ctx = codec.extract(&[malformed, empty, good, later]).unwrap();
        assert_eq!(ctx.trace_id_hex(), "0af7651916cd43dd8448eb211c80319c");
        assert_eq!(ctx.trace_state(), &[("vendor".to_string(), "abc".to_string())]);
    }

    #[test]
    fn test_extract_absent_is_none() {
        let codec = TraceContextCodec::new();
        assert!(codec.extract(&[]).is_none());
        assert!(codec.extract(&[HeaderBag::new()]).is_none());
    }

    #[test]
    fn test_extract_or_root() {
        let codec = TraceContextCodec::new();
        let root = codec.extract_or_root(&[HeaderBag::new().with(TRACEPARENT, "garbage")]);
        assert!(root.sampled());
    }

    #[test]
    fn test_inject_omits_empty_tracestate() {
        let codec = TraceContextCodec::new();
        let ctx = TraceContext::new_root();
        let bag = codec.inject(&ctx);

        assert_eq!(bag.get(TRACEPARENT), Some(ctx.to_string().as_str()));
        assert!(!bag.contains(TRACESTATE));
    }
}

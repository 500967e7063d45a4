use obo_trace::{
    A2aRequestContext, HeaderBag, InboundContextResolver, TraceContext, TraceContextCodec,
    TRACEPARENT,
};
use proptest::prelude::*;

fn trace_state() -> impl Strategy<Value = Vec<(String, String)>> {
    prop::collection::vec(("[a-z][a-z0-9_*/-]{0,15}", "[A-Za-z0-9_.:+-]{1,16}"), 0..6)
}

fn trace_context() -> impl Strategy<Value = TraceContext> {
    (
        prop::array::uniform16(any::<u8>()),
        prop::array::uniform8(any::<u8>()),
        any::<bool>(),
        trace_state(),
    )
        .prop_filter_map("ids must be non-zero", |(trace, span, sampled, state)| {
            TraceContext::new(trace, span, sampled, state)
        })
}

proptest! {
    #[test]
    fn inject_then_extract_is_identity(ctx in trace_context()) {
        let codec = TraceContextCodec::new();
        let headers = codec.inject(&ctx);
        prop_assert_eq!(codec.extract(&[headers]), Some(ctx));
    }

    #[test]
    fn any_accepted_trace_state_survives_the_wire(
        trace in prop::array::uniform16(1u8..),
        span in prop::array::uniform8(1u8..),
        state in prop::collection::vec((".{0,8}", ".{0,8}"), 0..40),
    ) {
        if let Some(ctx) = TraceContext::new(trace, span, true, state) {
            let codec = TraceContextCodec::new();
            let headers = codec.inject(&ctx);
            prop_assert_eq!(codec.extract(&[headers]), Some(ctx));
        }
    }

    #[test]
    fn child_keeps_trace_id(ctx in trace_context()) {
        let child = TraceContextCodec::new().derive_child(&ctx);
        prop_assert_eq!(child.trace_id(), ctx.trace_id());
        prop_assert_ne!(child.span_id(), ctx.span_id());
        prop_assert_eq!(child.sampled(), ctx.sampled());
    }

    #[test]
    fn arbitrary_traceparent_never_panics(raw in ".{0,80}") {
        let bag = HeaderBag::new().with(TRACEPARENT, raw);
        let _ = TraceContextCodec::new().extract(&[bag]);
    }
}

#[test]
fn inbound_traceparent_yields_child_on_same_trace() {
    let trace_id = "4bf92f3577b34da6a3ce929d0e0e4736";
    let span_id = "00f067aa0ba902b7";
    let inbound = A2aRequestContext {
        headers: Some(
            HeaderBag::new().with(TRACEPARENT, format!("00-{}-{}-01", trace_id, span_id)),
        ),
        ..Default::default()
    };

    let codec = TraceContextCodec::new();
    let candidates = InboundContextResolver::new().candidates(&inbound);
    let parent = codec.extract(&candidates).expect("traceparent should parse");
    assert_eq!(parent.trace_id_hex(), trace_id);
    assert_eq!(parent.span_id_hex(), span_id);
    assert!(parent.sampled());

    let child = codec.derive_child(&parent);
    assert_eq!(child.trace_id_hex(), trace_id);
    assert_ne!(child.span_id_hex(), span_id);

    let outbound = codec.inject(&child);
    let forwarded = outbound.get(TRACEPARENT).unwrap();
    assert!(forwarded.starts_with(&format!("00-{}-", trace_id)));
    assert!(forwarded.ends_with("-01"));
}

#[test]
fn malformed_first_source_falls_through_to_transport_headers() {
    let inbound = A2aRequestContext {
        headers: Some(HeaderBag::new().with(TRACEPARENT, "00-short-01")),
        transport_headers: Some(HeaderBag::new().with(
            TRACEPARENT,
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-00",
        )),
        ..Default::default()
    };

    let candidates = InboundContextResolver::new().candidates(&inbound);
    let ctx = TraceContextCodec::new().extract(&candidates).unwrap();
    assert!(!ctx.sampled());
}

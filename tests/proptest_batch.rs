//! Property-based tests for batch splitting invariants.
//!
//! Uses `proptest` to generate block-append requests of arbitrary size and
//! verify the structural invariants of splitting: sub-batch sizing, synthetic
//! id derivation, and lossless reconstruction of the original children.

use proptest::prelude::*;
use serde_json::{json, Value};

use notion_guard::batch::split_request;
use notion_guard::classify::BATCHABLE_TOOL;
use notion_guard::jsonrpc::{classify, MessageKind};

/// Build a `tools/call` request for the block-append tool.
fn block_append_request(id: Value, children: &[Value]) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": {
            "name": BATCHABLE_TOOL,
            "arguments": {"block_id": "block-x", "children": children}
        }
    })
}

fn arb_children(max: usize) -> impl Strategy<Value = Vec<Value>> {
    prop::collection::vec(
        any::<u32>().prop_map(|n| json!({"paragraph": {"text": n.to_string()}})),
        0..=max,
    )
}

fn arb_id() -> impl Strategy<Value = Value> {
    prop_oneof![
        (0i64..=1_000_000).prop_map(Value::from),
        "[a-zA-Z0-9_-]{1,24}".prop_map(Value::from),
    ]
}

fn arb_ceiling() -> impl Strategy<Value = usize> {
    1usize..=40
}

proptest! {
    /// Requests at or under the ceiling are never split.
    #[test]
    fn under_ceiling_never_splits(children in arb_children(40), ceiling in arb_ceiling()) {
        prop_assume!(children.len() <= ceiling);
        let msg = block_append_request(json!(1), &children);
        let kind = classify(&msg).expect("classify");
        let params = msg.get("params").expect("params");
        prop_assert!(split_request(&kind, params, ceiling).is_none());
    }

    /// Every sub-batch respects the ceiling and only the last may be smaller.
    #[test]
    fn sub_batch_sizes_respect_ceiling(children in arb_children(200), ceiling in arb_ceiling()) {
        prop_assume!(children.len() > ceiling);
        let msg = block_append_request(json!(9), &children);
        let kind = classify(&msg).expect("classify");
        let params = msg.get("params").expect("params");
        let subs = split_request(&kind, params, ceiling).expect("should split");

        prop_assert_eq!(subs.len(), children.len().div_ceil(ceiling));
        for (i, sub) in subs.iter().enumerate() {
            if i + 1 < subs.len() {
                prop_assert_eq!(sub.items, ceiling, "only the last batch may be short");
            } else {
                prop_assert!(sub.items >= 1 && sub.items <= ceiling);
            }
        }
    }

    /// Concatenating sub-batch children reconstructs the original exactly,
    /// and synthetic ids are `{base}_batch_{index}` in dispatch order.
    #[test]
    fn reconstruction_is_lossless(
        children in arb_children(120),
        id in arb_id(),
        ceiling in arb_ceiling(),
    ) {
        prop_assume!(children.len() > ceiling);
        let msg = block_append_request(id.clone(), &children);
        let kind = classify(&msg).expect("classify");
        let base = match &kind {
            MessageKind::Request { id, .. } => id.key(),
            other => panic!("expected request, got {other:?}"),
        };
        let params = msg.get("params").expect("params");
        let subs = split_request(&kind, params, ceiling).expect("should split");

        let mut rebuilt = Vec::new();
        for (i, sub) in subs.iter().enumerate() {
            prop_assert_eq!(&sub.id, &format!("{base}_batch_{i}"));

            let parsed: Value = serde_json::from_str(&sub.line).expect("sub-batch line is JSON");
            prop_assert_eq!(&parsed["jsonrpc"], &json!("2.0"));
            prop_assert_eq!(&parsed["id"], &json!(sub.id.clone()));
            prop_assert_eq!(&parsed["method"], &json!("tools/call"));
            prop_assert_eq!(&parsed["params"]["name"], &json!(BATCHABLE_TOOL));
            prop_assert_eq!(&parsed["params"]["arguments"]["block_id"], &json!("block-x"));

            let chunk = parsed["params"]["arguments"]["children"]
                .as_array()
                .expect("children array")
                .clone();
            prop_assert_eq!(chunk.len(), sub.items);
            rebuilt.extend(chunk);
        }
        prop_assert_eq!(rebuilt, children);
    }
}

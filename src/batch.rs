//! Splitting oversized block-append requests into bounded sub-requests.
//!
//! Only `API-patch-block-children` carries a bulk `children` sequence. When
//! that sequence exceeds the batch ceiling, the request is partitioned into
//! contiguous chunks, each wrapped in a clone of the original request with a
//! synthetic id `{originalId}_batch_{index}`. Concatenating the chunks in
//! order reconstructs the original sequence exactly.
//!
//! This module is the pure half of the splitter; pacing and dispatch live in
//! the pipeline.

use serde_json::{json, Value};

use crate::classify::{tool_name, BATCHABLE_TOOL};
use crate::jsonrpc::MessageKind;

/// One sub-request derived from an oversized batchable request.
#[derive(Debug, Clone)]
pub struct SubRequest {
    /// Synthetic id, `{originalId}_batch_{index}`.
    pub id: String,
    /// Number of child items carried by this sub-request.
    pub items: usize,
    /// Serialized NDJSON line, without trailing newline.
    pub line: String,
}

/// Whether a request's payload warrants batch splitting.
///
/// True iff the tool is [`BATCHABLE_TOOL`] and `arguments.children` holds
/// more items than the ceiling. A sequence of exactly ceiling length is not
/// split.
pub fn batch_eligible(params: Option<&Value>, ceiling: usize) -> bool {
    if tool_name(params) != Some(BATCHABLE_TOOL) {
        return false;
    }
    children_of(params)
        .map(|c| c.len() > ceiling)
        .unwrap_or(false)
}

fn children_of(params: Option<&Value>) -> Option<&Vec<Value>> {
    params?.get("arguments")?.get("children")?.as_array()
}

/// Partition an oversized request into paced-dispatch sub-requests.
///
/// Returns `None` when the request is not batch-eligible. Each sub-request
/// clones the original method and params, overriding the id and the
/// `arguments.children` chunk. Every chunk holds exactly `ceiling` items
/// except possibly the last.
pub fn split_request(
    kind: &MessageKind,
    params: &Value,
    ceiling: usize,
) -> Option<Vec<SubRequest>> {
    if !batch_eligible(Some(params), ceiling) {
        return None;
    }
    let children = children_of(Some(params))?;
    let method = kind.method()?;
    let base_id = kind.id().map(|id| id.key()).unwrap_or_else(|| "null".to_string());

    let subs = children
        .chunks(ceiling)
        .enumerate()
        .map(|(i, chunk)| {
            let sub_id = format!("{base_id}_batch_{i}");
            let mut sub_params = params.clone();
            sub_params["arguments"]["children"] = Value::Array(chunk.to_vec());
            let message = json!({
                "jsonrpc": "2.0",
                "id": sub_id,
                "method": method,
                "params": sub_params,
            });
            SubRequest {
                id: sub_id,
                items: chunk.len(),
                // json!() output of string/array/object inputs always
                // serializes; fall back to an empty object line rather than
                // panicking on pathological values.
                line: serde_json::to_string(&message).unwrap_or_else(|_| "{}".to_string()),
            }
        })
        .collect();

    Some(subs)
}

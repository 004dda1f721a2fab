//! Classification of inbound requests as mutating or read-only.
//!
//! Only mutating operations are governed (rate-limited, batched, logged).
//! Everything else — reads, protocol handshake, notifications, unknown
//! methods — bypasses governance and is forwarded untouched.

use crate::jsonrpc::MessageKind;

/// Tool identifiers that write or modify Notion content.
///
/// A `tools/call` for any of these is a mutating operation.
pub const MUTATING_TOOLS: [&str; 8] = [
    "API-post-page",            // create a page
    "API-patch-page",           // update page properties
    "API-patch-block-children", // append block children
    "API-update-a-block",       // update a block
    "API-create-a-database",    // create a database
    "API-update-a-database",    // update a database
    "API-delete-a-block",       // delete a block
    "API-create-a-comment",     // create a comment
];

/// The one tool whose payload carries a bulk `children` sequence and is
/// therefore eligible for batch splitting.
pub const BATCHABLE_TOOL: &str = "API-patch-block-children";

/// Extract the tool name from `tools/call` params, if present.
pub fn tool_name(params: Option<&serde_json::Value>) -> Option<&str> {
    params?.get("name")?.as_str()
}

/// Whether a classified message is a mutating operation requiring governance.
///
/// Mutating iff the method is `tools/call` and the named tool is on the
/// [`MUTATING_TOOLS`] allow-list. No side effects.
pub fn is_mutating(kind: &MessageKind, params: Option<&serde_json::Value>) -> bool {
    if kind.method() != Some("tools/call") {
        return false;
    }
    match tool_name(params) {
        Some(name) => MUTATING_TOOLS.contains(&name),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jsonrpc::JsonRpcId;
    use serde_json::json;

    fn request(method: &str) -> MessageKind {
        MessageKind::Request {
            id: JsonRpcId::Number(1),
            method: method.to_string(),
        }
    }

    #[test]
    fn test_all_mutating_tools_match() {
        for tool in MUTATING_TOOLS {
            let params = json!({ "name": tool });
            assert!(
                is_mutating(&request("tools/call"), Some(&params)),
                "{tool} should be mutating"
            );
        }
    }

    #[test]
    fn test_read_only_tools_bypass() {
        for tool in ["API-get-self", "API-post-search", "API-retrieve-a-page"] {
            let params = json!({ "name": tool });
            assert!(!is_mutating(&request("tools/call"), Some(&params)));
        }
    }

    #[test]
    fn test_non_tools_call_methods_bypass() {
        let params = json!({ "name": "API-post-page" });
        for method in ["initialize", "tools/list", "resources/read", "ping"] {
            assert!(!is_mutating(&request(method), Some(&params)));
        }
    }

    #[test]
    fn test_mutating_notification_is_governed() {
        let kind = MessageKind::Notification {
            method: "tools/call".to_string(),
        };
        let params = json!({ "name": "API-post-page" });
        // Still matched by tool — notifications carry no id but the method
        // and tool are what make an operation mutating.
        assert!(is_mutating(&kind, Some(&params)));
    }

    #[test]
    fn test_missing_params_bypass() {
        assert!(!is_mutating(&request("tools/call"), None));
        assert!(!is_mutating(&request("tools/call"), Some(&json!({}))));
        assert!(!is_mutating(
            &request("tools/call"),
            Some(&json!({ "name": 42 }))
        ));
    }

    #[test]
    fn test_tool_name_extraction() {
        let params = json!({ "name": "API-patch-page", "arguments": {} });
        assert_eq!(tool_name(Some(&params)), Some("API-patch-page"));
        assert_eq!(tool_name(None), None);
    }

    #[test]
    fn test_batchable_tool_is_mutating() {
        let params = json!({ "name": BATCHABLE_TOOL });
        assert!(is_mutating(&request("tools/call"), Some(&params)));
    }
}

//! JSON-RPC message classification.
//!
//! The gateway inspects exactly one thing about message content: whether a
//! body carries the distinguished `initialize` request that starts a session.

use serde_json::Value;

/// Request header carrying the session id on every non-initialize call.
pub const SESSION_ID_HEADER: &str = "mcp-session-id";

/// The method literal that creates a session.
pub const INITIALIZE_METHOD: &str = "initialize";

fn is_initialize_message(msg: &Value) -> bool {
    msg.get("method").and_then(Value::as_str) == Some(INITIALIZE_METHOD)
}

/// Whether a parsed body is an initialize request.
///
/// A single object counts if its `method` is `initialize`; a batch counts if
/// any element does. Batches mixing initialize with other calls are
/// semantically odd, but the mixed-batch rule is kept as-is pending product
/// clarification.
pub fn is_initialize_request(body: &Value) -> bool {
    match body {
        Value::Array(batch) => batch.iter().any(is_initialize_message),
        _ => is_initialize_message(body),
    }
}

#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    #[test]
    fn single_initialize_object() {
        let body = json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}});
        assert!(is_initialize_request(&body));
    }

    #[test]
    fn other_method_is_not_initialize() {
        assert!(!is_initialize_request(
            &json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"})
        ));
    }

    #[test]
    fn batch_with_initialize_anywhere_counts() {
        let body = json!([
            {"jsonrpc": "2.0", "id": 1, "method": "ping"},
            {"jsonrpc": "2.0", "id": 2, "method": "initialize"},
        ]);
        assert!(is_initialize_request(&body));
    }

    #[test]
    fn batch_without_initialize_does_not_count() {
        let body = json!([{"method": "ping"}, {"method": "tools/call"}]);
        assert!(!is_initialize_request(&body));
    }

    #[test]
    fn non_object_bodies_are_not_initialize() {
        assert!(!is_initialize_request(&json!("initialize")));
        assert!(!is_initialize_request(&json!(42)));
        assert!(!is_initialize_request(&json!({"method": 7})));
        assert!(!is_initialize_request(&json!([])));
    }
}

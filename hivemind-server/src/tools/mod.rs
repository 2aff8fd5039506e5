//! RPC tool surface
//!
//! The tool set is closed and fixed at build time; dispatch is a tagged match
//! over the seven tool names. Every handler receives the resolved caller and
//! raw JSON arguments, and returns either a JSON result or an error that the
//! transport layer wraps in the `{isError: true, text}` envelope.

pub mod add_knowledge;
pub mod delete_knowledge;
pub mod list_knowledge;
pub mod manage_roles;
pub mod publish_knowledge;
pub mod report_outcome;
pub mod search_knowledge;

use hivemind_core::{Error, Result};
use serde_json::Value;

use crate::auth::Caller;
use crate::state::AppState;

/// The complete tool vocabulary, in dispatch order
pub const TOOL_NAMES: [&str; 7] = [
    "add_knowledge",
    "search_knowledge",
    "list_knowledge",
    "delete_knowledge",
    "publish_knowledge",
    "manage_roles",
    "report_outcome",
];

/// Dispatch one tool invocation
pub async fn dispatch(
    state: &AppState,
    caller: &Caller,
    tool: &str,
    arguments: Value,
) -> Result<Value> {
    match tool {
        "add_knowledge" => add_knowledge::handle(state, caller, arguments).await,
        "search_knowledge" => search_knowledge::handle(state, caller, arguments).await,
        "list_knowledge" => list_knowledge::handle(state, caller, arguments).await,
        "delete_knowledge" => delete_knowledge::handle(state, caller, arguments).await,
        "publish_knowledge" => publish_knowledge::handle(state, caller, arguments).await,
        "manage_roles" => manage_roles::handle(state, caller, arguments).await,
        "report_outcome" => report_outcome::handle(state, caller, arguments).await,
        other => Err(Error::Validation(format!(
            "Unknown tool '{other}'. Available tools: {}",
            TOOL_NAMES.join(", ")
        ))),
    }
}

// ---------------------------------------------------------------------------
// Argument extraction helpers shared by the handlers
// ---------------------------------------------------------------------------

/// Optional string argument
pub(crate) fn opt_str(args: &Value, key: &str) -> Option<String> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Required string argument
pub(crate) fn req_str(args: &Value, key: &str) -> Result<String> {
    opt_str(args, key).ok_or_else(|| Error::Validation(format!("Missing '{key}' parameter.")))
}

/// Float argument with a default
pub(crate) fn f32_or(args: &Value, key: &str, default: f32) -> f32 {
    args.get(key)
        .and_then(Value::as_f64)
        .map_or(default, |v| v as f32)
}

/// Unsigned integer argument with a default
pub(crate) fn usize_or(args: &Value, key: &str, default: usize) -> usize {
    args.get(key)
        .and_then(Value::as_u64)
        .map_or(default, |v| v as usize)
}

/// Optional string-list argument
pub(crate) fn opt_str_list(args: &Value, key: &str) -> Option<Vec<String>> {
    args.get(key).and_then(Value::as_array).map(|items| {
        items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect()
    })
}

/// Parse a UUID argument, with the caller-facing validation message
pub(crate) fn parse_uuid(raw: &str, key: &str) -> Result<uuid::Uuid> {
    uuid::Uuid::parse_str(raw)
        .map_err(|_| Error::Validation(format!("Invalid {key} format: '{raw}' is not a valid UUID.")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn argument_helpers() {
        let args = serde_json::json!({
            "content": "hello",
            "confidence": 0.9,
            "limit": 5,
            "tags": ["a", "b"],
        });
        assert_eq!(opt_str(&args, "content").as_deref(), Some("hello"));
        assert!(opt_str(&args, "missing").is_none());
        assert!(req_str(&args, "missing").is_err());
        assert!((f32_or(&args, "confidence", 0.8) - 0.9).abs() < 1e-6);
        assert!((f32_or(&args, "missing", 0.8) - 0.8).abs() < 1e-6);
        assert_eq!(usize_or(&args, "limit", 10), 5);
        assert_eq!(
            opt_str_list(&args, "tags"),
            Some(vec!["a".to_string(), "b".to_string()])
        );
    }

    #[test]
    fn uuid_parsing_message() {
        let err = parse_uuid("nope", "item_id").unwrap_err();
        assert!(err.to_string().contains("item_id"));
    }
}

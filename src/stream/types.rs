//! Stream protocol types.
//!
//! `StreamEvent` is the typed form of one record of the agent's server-push
//! protocol. The `*Payload` structs mirror the JSON carried in each record's
//! `data:` field and are only used while decoding.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ─── Shared ──────────────────────────────────────────────────────────────────

/// A tool invocation reported by the remote agent.
///
/// Immutable once recorded; kept in delivery order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallInfo {
    pub name: String,
    #[serde(default)]
    pub input: Map<String, Value>,
}

/// Raw output of a tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResultInfo {
    pub payload: Value,
    pub is_error: bool,
}

// ─── StreamEvent ─────────────────────────────────────────────────────────────

/// One decoded protocol event, consumed exactly once in arrival order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StreamEvent {
    /// Incremental assistant text.
    Text { delta: String },
    /// A tool invocation began.
    #[serde(rename_all = "camelCase")]
    ToolUse {
        name: String,
        input: Map<String, Value>,
    },
    /// A tool invocation's raw output.
    #[serde(rename_all = "camelCase")]
    ToolResult { payload: Value, is_error: bool },
    /// The remote side paused and awaits a user decision.
    #[serde(rename_all = "camelCase")]
    ConfirmationRequired {
        tool_id: String,
        tool_name: String,
        tool_input: Map<String, Value>,
        summary: String,
    },
    /// A previously requested undo finished on the remote side.
    UndoComplete { action: String, description: String },
    /// Terminal failure.
    #[serde(rename_all = "camelCase")]
    Error {
        code: String,
        message: String,
        retry_after_seconds: Option<u64>,
    },
    /// Terminal success.
    #[serde(rename_all = "camelCase")]
    Done {
        final_text: String,
        tool_calls: Vec<ToolCallInfo>,
        tool_results: Option<Vec<ToolResultInfo>>,
    },
}

impl StreamEvent {
    /// `Done` and `Error` end a session; nothing may follow them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done { .. } | StreamEvent::Error { .. })
    }

    /// The wire event-type discriminator for this variant.
    pub fn event_type(&self) -> &'static str {
        match self {
            StreamEvent::Text { .. } => EVENT_TEXT,
            StreamEvent::ToolUse { .. } => EVENT_TOOL_USE,
            StreamEvent::ToolResult { .. } => EVENT_TOOL_RESULT,
            StreamEvent::ConfirmationRequired { .. } => EVENT_CONFIRMATION_REQUIRED,
            StreamEvent::UndoComplete { .. } => EVENT_UNDO_COMPLETE,
            StreamEvent::Error { .. } => EVENT_ERROR,
            StreamEvent::Done { .. } => EVENT_DONE,
        }
    }
}

// ─── Wire discriminators ─────────────────────────────────────────────────────

pub const EVENT_TEXT: &str = "text";
pub const EVENT_TOOL_USE: &str = "tool_use";
pub const EVENT_TOOL_RESULT: &str = "tool_result";
pub const EVENT_CONFIRMATION_REQUIRED: &str = "confirmation_required";
pub const EVENT_UNDO_COMPLETE: &str = "undo_complete";
pub const EVENT_ERROR: &str = "error";
pub const EVENT_DONE: &str = "done";

/// Error code used when the remote side omits one.
pub const DEFAULT_REMOTE_ERROR_CODE: &str = "AGENT_ERROR";

// ─── Wire payloads ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(crate) struct TextPayload {
    /// Older agent builds send `text` instead of `delta`.
    #[serde(alias = "text")]
    pub delta: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ToolUsePayload {
    pub name: String,
    #[serde(default)]
    pub input: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ToolResultPayload {
    #[serde(default)]
    pub result: Value,
    #[serde(default)]
    pub is_error: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ConfirmationPayload {
    pub tool_id: String,
    pub tool_name: String,
    #[serde(default)]
    pub tool_input: Map<String, Value>,
    #[serde(default)]
    pub summary: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UndoCompletePayload {
    pub action: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorPayload {
    pub error: String,
    #[serde(default)]
    pub error_code: Option<String>,
    /// Integer or fractional seconds.
    #[serde(default)]
    pub retry_after: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DonePayload {
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCallInfo>,
    #[serde(default)]
    pub tool_results: Option<Vec<ToolResultPayload>>,
    /// Set when the agent failed but still closed with `done`.
    #[serde(default)]
    pub error: Option<String>,
}

/// Round a `retry_after` hint up to whole seconds.
pub(crate) fn retry_after_seconds(value: Option<&Value>) -> Option<u64> {
    let value = value?;
    if let Some(secs) = value.as_u64() {
        return Some(secs);
    }
    value
        .as_f64()
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(|secs| secs.ceil() as u64)
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_variants() {
        let done = StreamEvent::Done {
            final_text: String::new(),
            tool_calls: vec![],
            tool_results: None,
        };
        let error = StreamEvent::Error {
            code: "AGENT_ERROR".into(),
            message: "boom".into(),
            retry_after_seconds: None,
        };
        let text = StreamEvent::Text { delta: "hi".into() };
        assert!(done.is_terminal());
        assert!(error.is_terminal());
        assert!(!text.is_terminal());
        assert_eq!(text.event_type(), "text");
    }

    #[test]
    fn test_event_serializes_camel_case_tag() {
        let event = StreamEvent::ConfirmationRequired {
            tool_id: "t1".into(),
            tool_name: "delete_signup".into(),
            tool_input: Map::new(),
            summary: "Delete person 5".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"confirmationRequired""#));
        assert!(json.contains(r#""toolId":"t1""#));
        assert!(!json.contains("tool_id"));
    }

    #[test]
    fn test_text_payload_accepts_legacy_field() {
        let legacy: TextPayload = serde_json::from_str(r#"{"text":"hello"}"#).unwrap();
        assert_eq!(legacy.delta, "hello");
        let current: TextPayload = serde_json::from_str(r#"{"delta":"hello"}"#).unwrap();
        assert_eq!(current.delta, "hello");
    }

    #[test]
    fn test_retry_after_rounds_up() {
        assert_eq!(retry_after_seconds(Some(&serde_json::json!(5))), Some(5));
        assert_eq!(retry_after_seconds(Some(&serde_json::json!(2.2))), Some(3));
        assert_eq!(retry_after_seconds(Some(&serde_json::json!("soon"))), None);
        assert_eq!(retry_after_seconds(None), None);
    }
}

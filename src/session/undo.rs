//! Static undo-strategy and reversal tables.
//!
//! Only tools with a known inverse are listed. `build_action` turns an
//! executed call plus its result into a ledger entry; `reversal_for` turns a
//! ledger entry back into the concrete call that reverses it.

use chrono::Utc;
use serde_json::{Map, Value};
use uuid::Uuid;

use super::types::{UndoType, UndoableAction};
use crate::stream::client::ReversalCall;

// ─── Strategy table ──────────────────────────────────────────────────────────

/// Tools whose creation is reversed by a matching delete.
const CREATE_DELETE_PAIRS: &[(&str, &str)] = &[
    ("create_signup", "delete_signup"),
    ("create_donation", "delete_donation"),
    ("create_event", "delete_event"),
    ("create_event_rsvp", "delete_event_rsvp"),
    ("log_contact", "delete_contact"),
];

/// Undo strategy for a tool, or `None` when the tool is not undoable.
pub fn strategy_for(tool_name: &str) -> Option<UndoType> {
    if CREATE_DELETE_PAIRS.iter().any(|(create, _)| *create == tool_name) {
        return Some(UndoType::DeleteCreated);
    }
    match tool_name {
        "delete_signup" => Some(UndoType::RecreateDeleted),
        "add_to_list" => Some(UndoType::RemoveFromList),
        "remove_from_list" => Some(UndoType::AddToList),
        "tag_signup" => Some(UndoType::RemoveTag),
        "untag_signup" => Some(UndoType::NotReversible),
        _ => None,
    }
}

fn delete_tool_for(create_tool: &str) -> Option<&'static str> {
    CREATE_DELETE_PAIRS
        .iter()
        .find(|(create, _)| *create == create_tool)
        .map(|(_, delete)| *delete)
}

// ─── Building entries ────────────────────────────────────────────────────────

/// Build a ledger entry for an executed tool call.
///
/// Returns `None` for tools without a strategy. When the result lacks the
/// data the inverse needs, the entry is recorded as `NotReversible`.
pub fn build_action(
    tool_name: &str,
    input: &Map<String, Value>,
    result: &Value,
) -> Option<UndoableAction> {
    let strategy = strategy_for(tool_name)?;
    let result = parse_result(result);

    let (undo_type, undo_data) = match undo_data_for(strategy, input, &result) {
        Some(data) => (strategy, data),
        None => {
            if strategy != UndoType::NotReversible {
                tracing::debug!(tool = %tool_name, "result lacks reversal data, recording as not reversible");
            }
            (UndoType::NotReversible, not_reversible_data(input))
        }
    };

    Some(UndoableAction {
        id: Uuid::new_v4().to_string(),
        timestamp: Utc::now(),
        tool_name: tool_name.to_string(),
        tool_input: input.clone(),
        description: describe(tool_name, input, &result),
        undo_type,
        undo_data,
    })
}

fn undo_data_for(
    strategy: UndoType,
    input: &Map<String, Value>,
    result: &Value,
) -> Option<Map<String, Value>> {
    let mut data = Map::new();
    match strategy {
        UndoType::DeleteCreated => {
            data.insert("id".into(), Value::String(result_id(result)?));
        }
        UndoType::RecreateDeleted => {
            let attributes = result_record(result)
                .and_then(|r| r.get("attributes"))
                .and_then(Value::as_object)
                .filter(|a| !a.is_empty())?;
            data.insert("attributes".into(), Value::Object(attributes.clone()));
        }
        UndoType::RemoveFromList | UndoType::AddToList => {
            data.insert("list_id".into(), id_value(input.get("list_id")?)?);
            data.insert("signup_id".into(), id_value(input.get("signup_id")?)?);
        }
        UndoType::RemoveTag => {
            data.insert("tagging_id".into(), Value::String(result_id(result)?));
            for key in ["signup_id", "signup_tag_id"] {
                if let Some(v) = input.get(key).and_then(id_value) {
                    data.insert(key.into(), v);
                }
            }
        }
        UndoType::NotReversible => return None,
    }
    Some(data)
}

fn not_reversible_data(input: &Map<String, Value>) -> Map<String, Value> {
    input
        .iter()
        .filter(|(k, _)| k.ends_with("id"))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Tool results may arrive as JSON text; anything unparseable is `Null`.
fn parse_result(result: &Value) -> Value {
    match result {
        Value::String(text) => serde_json::from_str(text).unwrap_or(Value::Null),
        other => other.clone(),
    }
}

/// The primary record of a result: `data` when present, else the root.
fn result_record(result: &Value) -> Option<&Map<String, Value>> {
    match result.get("data") {
        Some(Value::Object(data)) => Some(data),
        _ => result.as_object(),
    }
}

fn result_id(result: &Value) -> Option<String> {
    result_record(result)
        .and_then(|r| r.get("id"))
        .and_then(id_value)
        .and_then(|v| v.as_str().map(String::from))
}

/// Ids come as strings or numbers; normalize to a non-empty string.
fn id_value(v: &Value) -> Option<Value> {
    match v {
        Value::String(s) if !s.is_empty() => Some(Value::String(s.clone())),
        Value::Number(n) => Some(Value::String(n.to_string())),
        _ => None,
    }
}

fn describe(tool_name: &str, input: &Map<String, Value>, result: &Value) -> String {
    let field = |key: &str| {
        input
            .get(key)
            .and_then(id_value)
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_else(|| "?".into())
    };
    let created = result_id(result).unwrap_or_else(|| "?".into());
    match tool_name {
        "create_signup" => format!("Created person {created}"),
        "create_donation" => format!("Created donation {created}"),
        "create_event" => format!("Created event {created}"),
        "create_event_rsvp" => format!("Created RSVP {created}"),
        "log_contact" => format!("Logged contact {created}"),
        "delete_signup" => format!("Deleted person {}", field("id")),
        "add_to_list" => format!("Added person {} to list {}", field("signup_id"), field("list_id")),
        "remove_from_list" => format!(
            "Removed person {} from list {}",
            field("signup_id"),
            field("list_id")
        ),
        "tag_signup" => format!("Tagged person {} with tag {}", field("signup_id"), field("signup_tag_id")),
        "untag_signup" => format!("Removed tagging {}", field("tagging_id")),
        other => format!("Ran {other}"),
    }
}

// ─── Reversal table ──────────────────────────────────────────────────────────

/// The concrete call that reverses `action`, or `None` if it has no inverse.
pub fn reversal_for(action: &UndoableAction) -> Option<ReversalCall> {
    let data = &action.undo_data;
    let pick = |keys: &[&str]| -> Option<Map<String, Value>> {
        keys.iter()
            .map(|k| data.get(*k).map(|v| (k.to_string(), v.clone())))
            .collect()
    };

    let (tool_name, tool_input) = match action.undo_type {
        UndoType::DeleteCreated => (delete_tool_for(&action.tool_name)?, pick(&["id"])?),
        UndoType::RecreateDeleted => (
            "create_signup",
            data.get("attributes").and_then(Value::as_object)?.clone(),
        ),
        UndoType::RemoveFromList => ("remove_from_list", pick(&["list_id", "signup_id"])?),
        UndoType::AddToList => ("add_to_list", pick(&["list_id", "signup_id"])?),
        UndoType::RemoveTag => ("untag_signup", pick(&["tagging_id"])?),
        UndoType::NotReversible => return None,
    };

    Some(ReversalCall {
        action_id: action.id.clone(),
        tool_name: tool_name.to_string(),
        tool_input,
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────

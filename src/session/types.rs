//! Session Controller types.
//!
//! `Session` is an explicit value owned by the controller; everything other
//! components see is a `SessionSnapshot` copy of it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::stream::types::{ToolCallInfo, ToolResultInfo};

// ─── Confirmation ────────────────────────────────────────────────────────────

/// A paused tool call awaiting the user's decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationRequest {
    pub tool_id: String,
    pub tool_name: String,
    pub tool_input: Map<String, Value>,
    pub summary: String,
}

// ─── Undo ────────────────────────────────────────────────────────────────────

/// Closed set of reversal strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UndoType {
    DeleteCreated,
    RecreateDeleted,
    RemoveFromList,
    AddToList,
    RemoveTag,
    NotReversible,
}

impl UndoType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UndoType::DeleteCreated => "delete_created",
            UndoType::RecreateDeleted => "recreate_deleted",
            UndoType::RemoveFromList => "remove_from_list",
            UndoType::AddToList => "add_to_list",
            UndoType::RemoveTag => "remove_tag",
            UndoType::NotReversible => "not_reversible",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "delete_created" => Some(UndoType::DeleteCreated),
            "recreate_deleted" => Some(UndoType::RecreateDeleted),
            "remove_from_list" => Some(UndoType::RemoveFromList),
            "add_to_list" => Some(UndoType::AddToList),
            "remove_tag" => Some(UndoType::RemoveTag),
            "not_reversible" => Some(UndoType::NotReversible),
            _ => None,
        }
    }
}

/// One reversible side effect of an executed tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UndoableAction {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub tool_name: String,
    pub tool_input: Map<String, Value>,
    pub description: String,
    pub undo_type: UndoType,
    pub undo_data: Map<String, Value>,
}

// ─── Domain records ──────────────────────────────────────────────────────────

/// A record surfaced from a tool result for final display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainRecord {
    pub id: String,
    pub record_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

// ─── Session ─────────────────────────────────────────────────────────────────

/// How a finished session ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum SessionOutcome {
    Succeeded,
    #[serde(rename_all = "camelCase")]
    Failed {
        code: String,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        retry_after_seconds: Option<u64>,
    },
    Cancelled { code: String },
}

impl SessionOutcome {
    pub fn code(&self) -> Option<&str> {
        match self {
            SessionOutcome::Succeeded => None,
            SessionOutcome::Failed { code, .. } | SessionOutcome::Cancelled { code } => Some(code),
        }
    }
}

/// The single logical conversation in flight (or the last one, once ended).
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub id: Option<String>,
    pub active: bool,
    pub cancellation: CancellationToken,
    pub query: Option<String>,
    pub accumulated_text: String,
    pub tool_calls: Vec<ToolCallInfo>,
    pub pending_confirmation: Option<ConfirmationRequest>,
    /// `tool_result` events buffered until `done`.
    pub tool_results: Vec<ToolResultInfo>,
    pub records: Vec<DomainRecord>,
    pub outcome: Option<SessionOutcome>,
    /// Ledger entry this session reverses, when it is an undo.
    pub undo_of: Option<String>,
}

impl Session {
    /// A freshly accepted, active session.
    pub fn start(query: &str) -> Self {
        Self {
            id: Some(Uuid::new_v4().to_string()),
            active: true,
            cancellation: CancellationToken::new(),
            query: Some(query.to_string()),
            ..Self::default()
        }
    }

    /// Whether `session_id` names this session.
    pub fn is(&self, session_id: &str) -> bool {
        self.id.as_deref() == Some(session_id)
    }

    /// Mark ended: inactive, no pending confirmation, outcome recorded.
    /// Text, tool calls and records stay for display.
    pub fn finish(&mut self, outcome: SessionOutcome) {
        self.active = false;
        self.pending_confirmation = None;
        self.tool_results.clear();
        self.outcome = Some(outcome);
    }

    pub fn snapshot(&self, seq: u64, undo_available: usize) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id.clone(),
            active: self.active,
            query: self.query.clone(),
            accumulated_text: self.accumulated_text.clone(),
            tool_calls: self.tool_calls.clone(),
            pending_confirmation: self.pending_confirmation.clone(),
            records: self.records.clone(),
            outcome: self.outcome.clone(),
            seq,
            undo_available,
        }
    }
}

/// Read-only copy of the session for rendering; `seq` is the last broadcast
/// it reflects.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: Option<String>,
    pub active: bool,
    pub query: Option<String>,
    pub accumulated_text: String,
    pub tool_calls: Vec<ToolCallInfo>,
    pub pending_confirmation: Option<ConfirmationRequest>,
    pub records: Vec<DomainRecord>,
    pub outcome: Option<SessionOutcome>,
    pub seq: u64,
    pub undo_available: usize,
}

// ─── Tests ───────────────────────────────────────────────────────────────────

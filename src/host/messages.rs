//! Panel ↔ controller message contract, as carried over native messaging.
//!
//! Incoming: `{"id": …, "type": "SUBMIT_QUERY", …}`. The optional `id` is
//! echoed on the response so the extension can match replies.
//! Outgoing: `{"kind": "response", "id": …, "ok": …}` or
//! `{"kind": "broadcast", "seq": …, "event": {…}}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::session::auth::AuthState;
use crate::session::broadcast::BroadcastEnvelope;
use crate::session::types::UndoableAction;

// ─── Incoming ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PanelRequest {
    #[serde(rename_all = "camelCase")]
    SubmitQuery {
        query: String,
        #[serde(default)]
        context: Option<Value>,
        #[serde(default)]
        undo_stack: Vec<UndoableAction>,
    },
    CancelQuery,
    #[serde(rename_all = "camelCase")]
    ConfirmAction { tool_id: String },
    RejectAction,
    GetSessionState,
    UndoLastAction,
    GetUndoStack,
    ClearLedger,
    #[serde(rename_all = "camelCase")]
    UpdateAuthState { auth_state: AuthState },
}

impl PanelRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            PanelRequest::SubmitQuery { .. } => "SUBMIT_QUERY",
            PanelRequest::CancelQuery => "CANCEL_QUERY",
            PanelRequest::ConfirmAction { .. } => "CONFIRM_ACTION",
            PanelRequest::RejectAction => "REJECT_ACTION",
            PanelRequest::GetSessionState => "GET_SESSION_STATE",
            PanelRequest::UndoLastAction => "UNDO_LAST_ACTION",
            PanelRequest::GetUndoStack => "GET_UNDO_STACK",
            PanelRequest::ClearLedger => "CLEAR_LEDGER",
            PanelRequest::UpdateAuthState { .. } => "UPDATE_AUTH_STATE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IncomingFrame {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(flatten)]
    pub request: PanelRequest,
}

// ─── Outgoing ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// Reply to one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PanelResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl PanelResponse {
    pub fn ok(data: Option<Value>) -> Self {
        Self {
            ok: true,
            data,
            error: None,
        }
    }

    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(ErrorBody {
                code: code.to_string(),
                message: message.into(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutgoingFrame {
    Response {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<Value>,
        #[serde(flatten)]
        response: PanelResponse,
    },
    Broadcast(BroadcastEnvelope),
}

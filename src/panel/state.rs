//! Render state of one Panel Client.

use serde::Serialize;

use crate::session::types::{
    ConfirmationRequest, DomainRecord, SessionOutcome, SessionSnapshot, UndoableAction,
};
use crate::stream::types::ToolCallInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PanelStatus {
    #[default]
    Idle,
    Streaming,
    AwaitingConfirmation,
    Succeeded,
    Failed,
    Cancelled,
}

/// A failure as shown to the user: stable code plus message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelError {
    pub code: String,
    pub message: String,
    pub retry_after_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelState {
    pub session_id: Option<String>,
    pub status: PanelStatus,
    pub active: bool,
    pub query: Option<String>,
    pub text: String,
    pub tool_calls: Vec<ToolCallInfo>,
    pub pending_confirmation: Option<ConfirmationRequest>,
    pub records: Vec<DomainRecord>,
    pub last_error: Option<PanelError>,
    /// Description of the last undo the remote side finished.
    pub notice: Option<String>,
    pub undo_available: usize,
    pub latest_undo: Option<UndoableAction>,
    /// Highest broadcast `seq` reflected in this state.
    pub last_seq: u64,
}

impl PanelState {
    /// State pulled from the controller on attach.
    pub fn from_snapshot(snapshot: &SessionSnapshot) -> Self {
        let mut state = Self {
            session_id: snapshot.session_id.clone(),
            active: snapshot.active,
            query: snapshot.query.clone(),
            text: snapshot.accumulated_text.clone(),
            tool_calls: snapshot.tool_calls.clone(),
            pending_confirmation: snapshot.pending_confirmation.clone(),
            records: snapshot.records.clone(),
            undo_available: snapshot.undo_available,
            last_seq: snapshot.seq,
            ..Self::default()
        };
        state.status = match (&snapshot.outcome, snapshot.active) {
            (_, true) if snapshot.pending_confirmation.is_some() => {
                PanelStatus::AwaitingConfirmation
            }
            (_, true) => PanelStatus::Streaming,
            (Some(outcome), false) => state.apply_outcome(outcome),
            (None, false) => PanelStatus::Idle,
        };
        state
    }

    /// Record how a session ended; returns the matching status.
    pub(crate) fn apply_outcome(&mut self, outcome: &SessionOutcome) -> PanelStatus {
        match outcome {
            SessionOutcome::Succeeded => {
                self.last_error = None;
                PanelStatus::Succeeded
            }
            SessionOutcome::Failed {
                code,
                message,
                retry_after_seconds,
            } => {
                self.last_error = Some(PanelError {
                    code: code.clone(),
                    message: message.clone(),
                    retry_after_seconds: *retry_after_seconds,
                });
                PanelStatus::Failed
            }
            SessionOutcome::Cancelled { .. } => {
                self.last_error = None;
                PanelStatus::Cancelled
            }
        }
    }

    pub fn can_submit(&self) -> bool {
        !self.active
    }
}

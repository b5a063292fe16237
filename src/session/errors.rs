//! Session layer error types.

use serde::{Serialize, Serializer};
use thiserror::Error;

/// Why a submission was refused before anything was sent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectedReason {
    #[error("a query is already in progress")]
    Busy,

    #[error("not signed in")]
    Unauthenticated,

    #[error("external system is not connected")]
    ExternalSystemNotConnected,

    #[error("external system connection needs reauthorization")]
    ExternalSystemNeedsReauth,

    #[error("subscription is not active (status: {status})")]
    SubscriptionInactive { status: String },
}

impl RejectedReason {
    pub fn code(&self) -> &'static str {
        match self {
            RejectedReason::Busy => "BUSY",
            RejectedReason::Unauthenticated => "UNAUTHENTICATED",
            RejectedReason::ExternalSystemNotConnected => "EXTERNAL_SYSTEM_NOT_CONNECTED",
            RejectedReason::ExternalSystemNeedsReauth => "EXTERNAL_SYSTEM_NEEDS_REAUTH",
            RejectedReason::SubscriptionInactive { .. } => "SUBSCRIPTION_INACTIVE",
        }
    }
}

/// Serialized as its stable code.
impl Serialize for RejectedReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code())
    }
}

/// Errors raised inside the session core.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Ledger or auth snapshot storage failed.
    #[error("storage error: {reason}")]
    Storage { reason: String },

    /// Serialization error.
    #[error("serialization error: {reason}")]
    Serialization { reason: String },

    /// Submission refused before anything was sent.
    #[error("query rejected: {0}")]
    Rejected(#[from] RejectedReason),

    /// The controller task is gone.
    #[error("session controller is not running")]
    ControllerStopped,
}

impl SessionError {
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::Storage { .. } => "STORAGE_ERROR",
            SessionError::Serialization { .. } => "SERIALIZATION_ERROR",
            SessionError::Rejected(reason) => reason.code(),
            SessionError::ControllerStopped => "CONTROLLER_STOPPED",
        }
    }
}

impl From<rusqlite::Error> for SessionError {
    fn from(e: rusqlite::Error) -> Self {
        SessionError::Storage {
            reason: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(e: serde_json::Error) -> Self {
        SessionError::Serialization {
            reason: e.to_string(),
        }
    }
}

/// Errors from `undo_last_action`.
#[derive(Debug, Error)]
pub enum UndoError {
    /// Ledger is empty.
    #[error("nothing to undo")]
    NothingToUndo,

    /// The most recent entry has no inverse; it has been discarded.
    #[error("'{tool_name}' cannot be undone (entry {action_id} discarded)")]
    NotReversible { action_id: String, tool_name: String },

    /// Submission preconditions failed; the entry was restored.
    #[error("undo rejected: {0}")]
    Rejected(RejectedReason),

    /// The controller could not be reached.
    #[error("undo unavailable: {reason}")]
    Unavailable { reason: String },
}

impl UndoError {
    pub fn code(&self) -> &'static str {
        match self {
            UndoError::NothingToUndo => "NOTHING_TO_UNDO",
            UndoError::NotReversible { .. } => "UNDO_NOT_REVERSIBLE",
            UndoError::Unavailable { .. } => "UNDO_FAILED",
            UndoError::Rejected(reason) => reason.code(),
        }
    }
}

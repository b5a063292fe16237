//! Broadcast Channel: fan-out of session changes to every attached panel.
//!
//! Best effort: a panel that is not subscribed when an envelope is published
//! misses it and pulls `GET_SESSION_STATE` instead. Every envelope carries a
//! monotonically increasing `seq` so a panel can discard envelopes already
//! reflected in the snapshot it pulled.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::types::{ConfirmationRequest, DomainRecord, SessionOutcome, UndoableAction};
use crate::stream::types::ToolCallInfo;

/// Envelopes buffered per subscriber before the slowest one starts lagging.
const CHANNEL_CAPACITY: usize = 256;

// ─── PanelEvent ──────────────────────────────────────────────────────────────

/// Controller → panel notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PanelEvent {
    #[serde(rename_all = "camelCase")]
    SessionStarted {
        session_id: String,
        query: String,
        is_undo: bool,
    },
    #[serde(rename_all = "camelCase")]
    TextDelta { session_id: String, delta: String },
    #[serde(rename_all = "camelCase")]
    ToolInvoked {
        session_id: String,
        tool: ToolCallInfo,
    },
    #[serde(rename_all = "camelCase")]
    ToolResultReceived {
        session_id: String,
        is_error: bool,
        record_count: usize,
    },
    #[serde(rename_all = "camelCase")]
    ConfirmationRequested {
        session_id: String,
        request: ConfirmationRequest,
    },
    #[serde(rename_all = "camelCase")]
    ConfirmationResolved {
        session_id: String,
        tool_id: String,
        approved: bool,
    },
    #[serde(rename_all = "camelCase")]
    UndoCompleted {
        session_id: String,
        action: String,
        description: String,
    },
    /// Exactly one per session, whatever the outcome.
    #[serde(rename_all = "camelCase")]
    SessionEnded {
        session_id: String,
        outcome: SessionOutcome,
        final_text: String,
        tool_calls: Vec<ToolCallInfo>,
        records: Vec<DomainRecord>,
    },
    #[serde(rename_all = "camelCase")]
    LedgerChanged {
        undo_available: usize,
        latest: Option<UndoableAction>,
    },
    #[serde(rename_all = "camelCase")]
    Keepalive { session_id: String },
}

impl PanelEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            PanelEvent::SessionStarted { .. } => "SESSION_STARTED",
            PanelEvent::TextDelta { .. } => "TEXT_DELTA",
            PanelEvent::ToolInvoked { .. } => "TOOL_INVOKED",
            PanelEvent::ToolResultReceived { .. } => "TOOL_RESULT_RECEIVED",
            PanelEvent::ConfirmationRequested { .. } => "CONFIRMATION_REQUESTED",
            PanelEvent::ConfirmationResolved { .. } => "CONFIRMATION_RESOLVED",
            PanelEvent::UndoCompleted { .. } => "UNDO_COMPLETED",
            PanelEvent::SessionEnded { .. } => "SESSION_ENDED",
            PanelEvent::LedgerChanged { .. } => "LEDGER_CHANGED",
            PanelEvent::Keepalive { .. } => "KEEPALIVE",
        }
    }
}

/// A published event with its sequence number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastEnvelope {
    pub seq: u64,
    pub event: PanelEvent,
}

// ─── Broadcaster ─────────────────────────────────────────────────────────────

/// Cloneable publisher; all clones share one sequence.
#[derive(Clone)]
pub struct Broadcaster {
    inner: Arc<Mutex<Inner>>,
}

struct Inner {
    seq: u64,
    tx: broadcast::Sender<BroadcastEnvelope>,
}

impl Broadcaster {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Mutex::new(Inner { seq: 0, tx })),
        }
    }

    /// Publish to every current subscriber. Returns the assigned `seq`.
    ///
    /// Having no subscribers is not an error.
    pub fn publish(&self, event: PanelEvent) -> u64 {
        let mut inner = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        inner.seq += 1;
        let seq = inner.seq;
        let kind = event.kind();
        match inner.tx.send(BroadcastEnvelope { seq, event }) {
            Ok(recipients) => tracing::debug!(seq, event_type = kind, recipients, "broadcast"),
            Err(_) => tracing::debug!(seq, event_type = kind, "broadcast with no listeners"),
        }
        seq
    }

    /// Sequence number of the last published envelope.
    pub fn last_seq(&self) -> u64 {
        match self.inner.lock() {
            Ok(guard) => guard.seq,
            Err(poisoned) => poisoned.into_inner().seq,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastEnvelope> {
        match self.inner.lock() {
            Ok(guard) => guard.tx.subscribe(),
            Err(poisoned) => poisoned.into_inner().tx.subscribe(),
        }
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn keepalive() -> PanelEvent {
        PanelEvent::Keepalive {
            session_id: "s1".into(),
        }
    }

    #[test]
    fn test_publish_without_subscribers() {
        let broadcaster = Broadcaster::new();
        assert_eq!(broadcaster.publish(keepalive()), 1);
        assert_eq!(broadcaster.publish(keepalive()), 2);
        assert_eq!(broadcaster.last_seq(), 2);
    }

    #[tokio::test]
    async fn test_every_subscriber_sees_envelopes_in_order() {
        let broadcaster = Broadcaster::new();
        let mut a = broadcaster.subscribe();
        let mut b = broadcaster.clone().subscribe();

        broadcaster.publish(keepalive());
        broadcaster.publish(PanelEvent::TextDelta {
            session_id: "s1".into(),
            delta: "hi".into(),
        });

        for rx in [&mut a, &mut b] {
            assert_eq!(rx.recv().await.unwrap().seq, 1);
            assert_eq!(rx.recv().await.unwrap().seq, 2);
        }
    }

    #[test]
    fn test_late_subscriber_misses_earlier_envelopes() {
        let broadcaster = Broadcaster::new();
        broadcaster.publish(keepalive());
        let mut late = broadcaster.subscribe();
        assert!(late.try_recv().is_err());
        broadcaster.publish(keepalive());
        assert_eq!(late.try_recv().unwrap().seq, 2);
    }

    #[test]
    fn test_event_wire_shape() {
        let json = serde_json::to_value(BroadcastEnvelope {
            seq: 4,
            event: PanelEvent::TextDelta {
                session_id: "s1".into(),
                delta: "hi".into(),
            },
        })
        .unwrap();
        assert_eq!(json["seq"], 4);
        assert_eq!(json["event"]["type"], "TEXT_DELTA");
        assert_eq!(json["event"]["sessionId"], "s1");
    }
}

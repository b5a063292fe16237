//! Panel reducer: folds controller broadcasts into `PanelState`.
//!
//! Pure: no I/O, no clocks. Envelopes with a `seq` at or below
//! `state.last_seq` were already reflected by a snapshot and are skipped.

use super::state::{PanelError, PanelState, PanelStatus};
use crate::session::broadcast::{BroadcastEnvelope, PanelEvent};

/// What `reduce` did with an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reduction {
    Applied,
    /// Already reflected in the state.
    Stale,
    /// For a session other than the one on screen.
    OtherSession,
}

pub fn reduce(state: &mut PanelState, envelope: &BroadcastEnvelope) -> Reduction {
    if envelope.seq <= state.last_seq {
        return Reduction::Stale;
    }
    state.last_seq = envelope.seq;

    match &envelope.event {
        PanelEvent::SessionStarted {
            session_id, query, ..
        } => {
            let keep = (state.undo_available, state.latest_undo.take());
            *state = PanelState {
                session_id: Some(session_id.clone()),
                status: PanelStatus::Streaming,
                active: true,
                query: Some(query.clone()),
                undo_available: keep.0,
                latest_undo: keep.1,
                last_seq: envelope.seq,
                ..PanelState::default()
            };
        }
        PanelEvent::LedgerChanged {
            undo_available,
            latest,
        } => {
            state.undo_available = *undo_available;
            state.latest_undo = latest.clone();
        }
        PanelEvent::Keepalive { .. } => {}
        event => {
            if !is_current(state, event) {
                return Reduction::OtherSession;
            }
            apply_session_event(state, event);
        }
    }
    Reduction::Applied
}

fn is_current(state: &PanelState, event: &PanelEvent) -> bool {
    let id = match event {
        PanelEvent::TextDelta { session_id, .. }
        | PanelEvent::ToolInvoked { session_id, .. }
        | PanelEvent::ToolResultReceived { session_id, .. }
        | PanelEvent::ConfirmationRequested { session_id, .. }
        | PanelEvent::ConfirmationResolved { session_id, .. }
        | PanelEvent::UndoCompleted { session_id, .. }
        | PanelEvent::SessionEnded { session_id, .. } => session_id,
        _ => return true,
    };
    state.session_id.as_deref() == Some(id.as_str())
}

fn apply_session_event(state: &mut PanelState, event: &PanelEvent) {
    match event {
        PanelEvent::TextDelta { delta, .. } => state.text.push_str(delta),
        PanelEvent::ToolInvoked { tool, .. } => state.tool_calls.push(tool.clone()),
        PanelEvent::ToolResultReceived { .. } => {}
        PanelEvent::ConfirmationRequested { request, .. } => {
            state.pending_confirmation = Some(request.clone());
            state.status = PanelStatus::AwaitingConfirmation;
        }
        PanelEvent::ConfirmationResolved { tool_id, .. } => {
            if state
                .pending_confirmation
                .as_ref()
                .is_some_and(|p| &p.tool_id == tool_id)
            {
                state.pending_confirmation = None;
            }
            if state.active {
                state.status = PanelStatus::Streaming;
            }
        }
        PanelEvent::UndoCompleted { description, .. } => {
            state.notice = Some(description.clone());
        }
        PanelEvent::SessionEnded {
            outcome,
            final_text,
            tool_calls,
            records,
            ..
        } => {
            state.active = false;
            state.pending_confirmation = None;
            state.text = final_text.clone();
            state.tool_calls = tool_calls.clone();
            state.records = records.clone();
            state.status = state.apply_outcome(outcome);
        }
        PanelEvent::SessionStarted { .. }
        | PanelEvent::LedgerChanged { .. }
        | PanelEvent::Keepalive { .. } => {}
    }
}

/// Show a locally returned failure (rejected submission, failed undo).
/// Does not touch the session fields.
pub fn reduce_local_error(state: &mut PanelState, code: &str, message: &str) {
    state.last_error = Some(PanelError {
        code: code.to_string(),
        message: message.to_string(),
        retry_after_seconds: None,
    });
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::types::{ConfirmationRequest, SessionOutcome, SessionSnapshot};
    use serde_json::Map;

    fn env(seq: u64, event: PanelEvent) -> BroadcastEnvelope {
        BroadcastEnvelope { seq, event }
    }

    fn started(seq: u64, id: &str) -> BroadcastEnvelope {
        env(
            seq,
            PanelEvent::SessionStarted {
                session_id: id.into(),
                query: "find John".into(),
                is_undo: false,
            },
        )
    }

    fn delta(seq: u64, id: &str, text: &str) -> BroadcastEnvelope {
        env(
            seq,
            PanelEvent::TextDelta {
                session_id: id.into(),
                delta: text.into(),
            },
        )
    }

    #[test]
    fn test_stream_builds_text_and_ends() {
        let mut state = PanelState::default();
        reduce(&mut state, &started(1, "s1"));
        reduce(&mut state, &delta(2, "s1", "Found "));
        reduce(&mut state, &delta(3, "s1", "John"));
        assert_eq!(state.text, "Found John");
        assert_eq!(state.status, PanelStatus::Streaming);

        reduce(
            &mut state,
            &env(
                4,
                PanelEvent::SessionEnded {
                    session_id: "s1".into(),
                    outcome: SessionOutcome::Succeeded,
                    final_text: "Found John Doe".into(),
                    tool_calls: vec![],
                    records: vec![],
                },
            ),
        );
        assert!(!state.active);
        assert_eq!(state.status, PanelStatus::Succeeded);
        assert_eq!(state.text, "Found John Doe");
        assert!(state.can_submit());
    }

    #[test]
    fn test_envelopes_covered_by_snapshot_are_skipped() {
        let snapshot = SessionSnapshot {
            session_id: Some("s1".into()),
            active: true,
            accumulated_text: "abc".into(),
            seq: 5,
            ..SessionSnapshot::default()
        };
        let mut state = PanelState::from_snapshot(&snapshot);
        assert_eq!(state.status, PanelStatus::Streaming);

        assert_eq!(reduce(&mut state, &delta(5, "s1", "c")), Reduction::Stale);
        assert_eq!(reduce(&mut state, &delta(6, "s1", "d")), Reduction::Applied);
        assert_eq!(state.text, "abcd");
    }

    #[test]
    fn test_other_session_events_are_ignored() {
        let mut state = PanelState::default();
        reduce(&mut state, &started(1, "s2"));
        assert_eq!(
            reduce(&mut state, &delta(2, "s1", "old")),
            Reduction::OtherSession
        );
        assert!(state.text.is_empty());
        assert_eq!(state.last_seq, 2);
    }

    #[test]
    fn test_confirmation_round_trip() {
        let mut state = PanelState::default();
        reduce(&mut state, &started(1, "s1"));
        reduce(
            &mut state,
            &env(
                2,
                PanelEvent::ConfirmationRequested {
                    session_id: "s1".into(),
                    request: ConfirmationRequest {
                        tool_id: "t1".into(),
                        tool_name: "delete_signup".into(),
                        tool_input: Map::new(),
                        summary: "Delete".into(),
                    },
                },
            ),
        );
        assert_eq!(state.status, PanelStatus::AwaitingConfirmation);

        reduce(
            &mut state,
            &env(
                3,
                PanelEvent::ConfirmationResolved {
                    session_id: "s1".into(),
                    tool_id: "t1".into(),
                    approved: true,
                },
            ),
        );
        assert!(state.pending_confirmation.is_none());
        assert_eq!(state.status, PanelStatus::Streaming);
    }

    #[test]
    fn test_failure_sets_error_and_new_session_clears_it() {
        let mut state = PanelState::default();
        reduce(&mut state, &started(1, "s1"));
        reduce(
            &mut state,
            &env(
                2,
                PanelEvent::SessionEnded {
                    session_id: "s1".into(),
                    outcome: SessionOutcome::Failed {
                        code: "RATE_LIMIT_EXCEEDED".into(),
                        message: "wait".into(),
                        retry_after_seconds: Some(5),
                    },
                    final_text: String::new(),
                    tool_calls: vec![],
                    records: vec![],
                },
            ),
        );
        let error = state.last_error.clone().unwrap();
        assert_eq!(error.code, "RATE_LIMIT_EXCEEDED");
        assert_eq!(error.retry_after_seconds, Some(5));

        reduce(&mut state, &env(3, PanelEvent::LedgerChanged { undo_available: 2, latest: None }));
        reduce(&mut state, &started(4, "s2"));
        assert!(state.last_error.is_none());
        assert_eq!(state.undo_available, 2, "ledger info survives a new session");
    }

    #[test]
    fn test_local_error_leaves_session_fields() {
        let mut state = PanelState::default();
        reduce(&mut state, &started(1, "s1"));
        reduce_local_error(&mut state, "BUSY", "a query is already in progress");
        assert!(state.active);
        assert_eq!(state.last_error.unwrap().code, "BUSY");
    }
}

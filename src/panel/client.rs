//! Panel Client: one per tab.
//!
//! Attaching subscribes to broadcasts first and pulls the controller's
//! snapshot second, so nothing published in between is lost; envelopes the
//! snapshot already covers are skipped by `seq`.

use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::Receiver;

use super::reducer::{reduce, reduce_local_error, Reduction};
use super::state::PanelState;
use crate::session::broadcast::{BroadcastEnvelope, PanelEvent};
use crate::session::controller::{Accepted, ControllerHandle};
use crate::session::errors::{SessionError, UndoError};
use crate::session::types::UndoableAction;

pub struct PanelClient {
    handle: ControllerHandle,
    events: Receiver<BroadcastEnvelope>,
    state: PanelState,
    /// Tab-local copy of the ledger, sent along with each submission.
    undo_copy: Vec<UndoableAction>,
}

impl PanelClient {
    pub async fn attach(handle: ControllerHandle) -> Result<Self, SessionError> {
        let events = handle.subscribe();
        let snapshot = handle.session_state().await?;
        let undo_copy = handle.undo_stack().await?;
        tracing::debug!(seq = snapshot.seq, active = snapshot.active, "panel attached");
        Ok(Self {
            handle,
            events,
            state: PanelState::from_snapshot(&snapshot),
            undo_copy,
        })
    }

    pub fn state(&self) -> &PanelState {
        &self.state
    }

    // ─── Intents ─────────────────────────────────────────────────────────────

    pub async fn submit(
        &mut self,
        query: &str,
        context: Option<Value>,
    ) -> Result<Accepted, SessionError> {
        let result = self
            .handle
            .submit_query(query, context, self.undo_copy.clone())
            .await;
        if let Err(e) = &result {
            reduce_local_error(&mut self.state, e.code(), &e.to_string());
        }
        result
    }

    pub async fn cancel(&mut self) -> Result<(), SessionError> {
        self.handle.cancel_query().await
    }

    pub async fn confirm(&mut self, tool_id: &str) -> Result<bool, SessionError> {
        self.handle.confirm_action(tool_id).await
    }

    pub async fn reject(&mut self) -> Result<bool, SessionError> {
        self.handle.reject_action().await
    }

    pub async fn undo(&mut self) -> Result<Accepted, UndoError> {
        let result = self.handle.undo_last_action().await;
        if let Err(e) = &result {
            reduce_local_error(&mut self.state, e.code(), &e.to_string());
        }
        result
    }

    // ─── Updates ─────────────────────────────────────────────────────────────

    /// Wait for the next broadcast and fold it in.
    ///
    /// Returns `None` once the controller is gone. After falling behind the
    /// channel, the state is rebuilt from a fresh snapshot.
    pub async fn next_update(&mut self) -> Option<Reduction> {
        loop {
            match self.events.recv().await {
                Ok(envelope) => {
                    let reduction = reduce(&mut self.state, &envelope);
                    if reduction == Reduction::Applied {
                        if let PanelEvent::LedgerChanged { .. } = envelope.event {
                            self.refresh_undo_copy().await;
                        }
                    }
                    return Some(reduction);
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "panel lagged behind broadcasts, resyncing");
                    if self.resync().await.is_err() {
                        return None;
                    }
                    return Some(Reduction::Applied);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Replace the state with the controller's current snapshot.
    pub async fn resync(&mut self) -> Result<(), SessionError> {
        let snapshot = self.handle.session_state().await?;
        self.state = PanelState::from_snapshot(&snapshot);
        self.refresh_undo_copy().await;
        Ok(())
    }

    async fn refresh_undo_copy(&mut self) {
        match self.handle.undo_stack().await {
            Ok(stack) => self.undo_copy = stack,
            Err(e) => tracing::debug!(error = %e, "could not refresh undo copy"),
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

//! Session Controller: owns the single in-flight session.
//!
//! The controller runs as one task that exclusively owns the `Session`, the
//! confirmation gate and the ledger. Everything else talks to it by message:
//!
//! - panels send commands through a cloneable `ControllerHandle`;
//! - each session's stream pump posts decoded events tagged with the session
//!   id, so events from a cancelled or finished session are recognized and
//!   dropped;
//! - every state change is published on the `Broadcaster` right after it is
//!   applied, so observers see changes in the order they happened.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use super::auth::{check_preconditions, AuthProvider, AuthState};
use super::broadcast::{BroadcastEnvelope, Broadcaster, PanelEvent};
use super::confirmation::ConfirmationGate;
use super::errors::{RejectedReason, SessionError, UndoError};
use super::ledger::SessionLedger;
use super::records::extract_records;
use super::types::{ConfirmationRequest, Session, SessionOutcome, SessionSnapshot, UndoableAction};
use super::undo;
use super::watchdog::{KeepaliveSink, KeepaliveWatchdog};
use crate::stream::client::{AgentTransport, ConfirmationDecision, QueryRequest, ReversalCall};
use crate::stream::decoder::decode_byte_stream;
use crate::stream::errors::TransportError;
use crate::stream::types::{StreamEvent, ToolCallInfo, ToolResultInfo};
use crate::truncate_utf8;

/// Code for a session the user cancelled.
pub const CANCELLED: &str = "CANCELLED";
/// Code for a session ended by rejecting a confirmation.
pub const CONFIRMATION_REJECTED: &str = "CONFIRMATION_REJECTED";
/// Code for a failed confirm signal.
pub const TRANSPORT_ERROR: &str = "TRANSPORT_ERROR";

/// Max bytes of query text written to logs.
const LOG_QUERY_BYTES: usize = 80;

/// A submission the controller accepted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Accepted {
    pub session_id: String,
}

// ─── Messages ────────────────────────────────────────────────────────────────

enum Command {
    Submit {
        query: String,
        context: Option<Value>,
        undo_stack: Vec<UndoableAction>,
        reply: oneshot::Sender<Result<Accepted, RejectedReason>>,
    },
    Cancel {
        reply: oneshot::Sender<()>,
    },
    Confirm {
        tool_id: String,
        reply: oneshot::Sender<bool>,
    },
    Reject {
        reply: oneshot::Sender<bool>,
    },
    Undo {
        reply: oneshot::Sender<Result<Accepted, UndoError>>,
    },
    State {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    UndoStack {
        reply: oneshot::Sender<Vec<UndoableAction>>,
    },
    ClearLedger {
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    UpdateAuth {
        state: AuthState,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
}

/// Posted by background tasks; always tagged with the session they serve.
enum PumpInput {
    Event {
        session_id: String,
        event: StreamEvent,
    },
    Closed {
        session_id: String,
    },
    Failed {
        session_id: String,
        error: TransportError,
    },
    DecisionFailed {
        session_id: String,
        tool_id: String,
        error: TransportError,
    },
}

// ─── ControllerHandle ────────────────────────────────────────────────────────

/// Cloneable front door to the controller task.
#[derive(Clone)]
pub struct ControllerHandle {
    commands: mpsc::UnboundedSender<Command>,
    broadcaster: Broadcaster,
}

impl ControllerHandle {
    async fn call<R>(
        &self,
        make: impl FnOnce(oneshot::Sender<R>) -> Command,
    ) -> Result<R, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .map_err(|_| SessionError::ControllerStopped)?;
        rx.await.map_err(|_| SessionError::ControllerStopped)
    }

    /// Submit a query. `undo_stack` is the panel's copy of the ledger; it only
    /// seeds a ledger that is empty.
    pub async fn submit_query(
        &self,
        query: &str,
        context: Option<Value>,
        undo_stack: Vec<UndoableAction>,
    ) -> Result<Accepted, SessionError> {
        let query = query.to_string();
        let result = self
            .call(|reply| Command::Submit {
                query,
                context,
                undo_stack,
                reply,
            })
            .await?;
        Ok(result?)
    }

    pub async fn cancel_query(&self) -> Result<(), SessionError> {
        self.call(|reply| Command::Cancel { reply }).await
    }

    /// `false` when `tool_id` is not the pending confirmation.
    pub async fn confirm_action(&self, tool_id: &str) -> Result<bool, SessionError> {
        let tool_id = tool_id.to_string();
        self.call(|reply| Command::Confirm { tool_id, reply }).await
    }

    /// `false` when nothing is pending.
    pub async fn reject_action(&self) -> Result<bool, SessionError> {
        self.call(|reply| Command::Reject { reply }).await
    }

    pub async fn undo_last_action(&self) -> Result<Accepted, UndoError> {
        match self.call(|reply| Command::Undo { reply }).await {
            Ok(result) => result,
            Err(e) => Err(UndoError::Unavailable {
                reason: e.to_string(),
            }),
        }
    }

    pub async fn session_state(&self) -> Result<SessionSnapshot, SessionError> {
        self.call(|reply| Command::State { reply }).await
    }

    pub async fn undo_stack(&self) -> Result<Vec<UndoableAction>, SessionError> {
        self.call(|reply| Command::UndoStack { reply }).await
    }

    pub async fn clear_ledger(&self) -> Result<(), SessionError> {
        self.call(|reply| Command::ClearLedger { reply }).await?
    }

    pub async fn update_auth_state(&self, state: AuthState) -> Result<(), SessionError> {
        self.call(|reply| Command::UpdateAuth { state, reply }).await?
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastEnvelope> {
        self.broadcaster.subscribe()
    }
}

/// Start the controller task and return its handle.
///
/// The task stops once every handle is dropped.
pub fn spawn_controller<T: AgentTransport>(
    transport: Arc<T>,
    auth: Box<dyn AuthProvider>,
    ledger: SessionLedger,
    broadcaster: Broadcaster,
    keepalive_period: Duration,
) -> ControllerHandle {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (pump_tx, pump_rx) = mpsc::unbounded_channel();

    let keepalive_broadcaster = broadcaster.clone();
    let sink: KeepaliveSink = Arc::new(move |session_id: &str| {
        keepalive_broadcaster.publish(PanelEvent::Keepalive {
            session_id: session_id.to_string(),
        });
    });

    let controller = SessionController {
        transport,
        auth,
        ledger,
        gate: ConfirmationGate::new(),
        broadcaster: broadcaster.clone(),
        watchdog: KeepaliveWatchdog::new(keepalive_period, sink),
        session: Session::default(),
        pending_undo: None,
        undo_failed: false,
        pump_tx,
    };
    tokio::spawn(controller.run(command_rx, pump_rx));

    ControllerHandle {
        commands: command_tx,
        broadcaster,
    }
}

// ─── SessionController ───────────────────────────────────────────────────────

struct SessionController<T: AgentTransport> {
    transport: Arc<T>,
    auth: Box<dyn AuthProvider>,
    ledger: SessionLedger,
    gate: ConfirmationGate,
    broadcaster: Broadcaster,
    watchdog: KeepaliveWatchdog,
    session: Session,
    /// Ledger entry detached for the undo session in flight.
    pending_undo: Option<UndoableAction>,
    /// A reversal tool call of the undo session reported an error.
    undo_failed: bool,
    pump_tx: mpsc::UnboundedSender<PumpInput>,
}

impl<T: AgentTransport> SessionController<T> {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut pump: mpsc::UnboundedReceiver<PumpInput>,
    ) {
        tracing::info!(scope = %self.ledger.scope(), "session controller started");
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(input) = pump.recv() => self.handle_pump(input),
            }
        }
        self.cancel_query();
        tracing::info!("session controller stopped");
    }

    fn handle_command(&mut self, command: Command) {
        // A dropped reply receiver only means the caller stopped waiting.
        match command {
            Command::Submit {
                query,
                context,
                undo_stack,
                reply,
            } => {
                let _ = reply.send(self.submit_query(&query, context, undo_stack));
            }
            Command::Cancel { reply } => {
                self.cancel_query();
                let _ = reply.send(());
            }
            Command::Confirm { tool_id, reply } => {
                let _ = reply.send(self.confirm_action(&tool_id));
            }
            Command::Reject { reply } => {
                let _ = reply.send(self.reject_action());
            }
            Command::Undo { reply } => {
                let _ = reply.send(self.undo_last_action());
            }
            Command::State { reply } => {
                let _ = reply.send(self.session_state());
            }
            Command::UndoStack { reply } => {
                let _ = reply.send(self.ledger.snapshot());
            }
            Command::ClearLedger { reply } => {
                self.pending_undo = None;
                let result = self.ledger.clear();
                if result.is_ok() {
                    self.publish_ledger_changed();
                }
                let _ = reply.send(result);
            }
            Command::UpdateAuth { state, reply } => {
                tracing::info!(
                    authenticated = state.authenticated,
                    external_connected = state.external_connected,
                    needs_reauth = state.needs_reauth,
                    subscription = state.subscription_status.as_deref().unwrap_or("none"),
                    "auth snapshot updated"
                );
                let _ = reply.send(self.auth.store_snapshot(state));
            }
        }
    }

    // ─── Operations ──────────────────────────────────────────────────────────

    fn submit_query(
        &mut self,
        query: &str,
        context: Option<Value>,
        undo_stack: Vec<UndoableAction>,
    ) -> Result<Accepted, RejectedReason> {
        let auth = self.admit()?;
        if self.ledger.adopt(undo_stack) > 0 {
            self.publish_ledger_changed();
        }
        Ok(self.start_session(query, context, None, auth))
    }

    /// Single-session and precondition checks shared by queries and undos.
    fn admit(&self) -> Result<AuthState, RejectedReason> {
        if self.session.active {
            tracing::info!(
                session_id = self.session.id.as_deref().unwrap_or(""),
                "submission rejected: session already active"
            );
            return Err(RejectedReason::Busy);
        }

        let auth = self.auth.auth_snapshot().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "auth snapshot unavailable, treating as signed out");
            AuthState::default()
        });
        if let Err(reason) = check_preconditions(&auth) {
            tracing::info!(code = reason.code(), "submission rejected by precondition");
            return Err(reason);
        }
        Ok(auth)
    }

    fn start_session(
        &mut self,
        query: &str,
        context: Option<Value>,
        undo_action: Option<ReversalCall>,
        auth: AuthState,
    ) -> Accepted {
        let is_undo = undo_action.is_some();
        let mut session = Session::start(query);
        session.undo_of = undo_action.as_ref().map(|u| u.action_id.clone());
        let session_id = session.id.clone().unwrap_or_default();

        let request = QueryRequest {
            query: query.to_string(),
            context,
            undo_ledger_snapshot: self.ledger.snapshot(),
            undo_action,
            identity: auth.identity(),
        };

        tracing::info!(
            session_id = %session_id,
            query = %truncate_utf8(query, LOG_QUERY_BYTES),
            is_undo,
            "session started"
        );

        let cancel = session.cancellation.clone();
        self.session = session;
        self.gate.clear();
        self.undo_failed = false;
        self.broadcaster.publish(PanelEvent::SessionStarted {
            session_id: session_id.clone(),
            query: query.to_string(),
            is_undo,
        });
        self.watchdog.start(&session_id);

        tokio::spawn(pump(
            Arc::clone(&self.transport),
            request,
            cancel,
            session_id.clone(),
            self.pump_tx.clone(),
        ));

        Accepted { session_id }
    }

    /// Abort the active session. A no-op without one.
    fn cancel_query(&mut self) {
        if !self.session.active {
            return;
        }
        self.session.cancellation.cancel();
        self.end_session(SessionOutcome::Cancelled {
            code: CANCELLED.to_string(),
        });
    }

    fn confirm_action(&mut self, tool_id: &str) -> bool {
        if !self.session.active {
            return false;
        }
        let Some(request) = self.gate.resolve(tool_id) else {
            return false;
        };
        self.session.pending_confirmation = None;
        let session_id = self.session.id.clone().unwrap_or_default();
        tracing::info!(session_id = %session_id, tool_id = %tool_id, tool = %request.tool_name, "action confirmed");

        self.broadcaster.publish(PanelEvent::ConfirmationResolved {
            session_id: session_id.clone(),
            tool_id: tool_id.to_string(),
            approved: true,
        });

        let transport = Arc::clone(&self.transport);
        let pump_tx = self.pump_tx.clone();
        let decision = ConfirmationDecision {
            session_id: session_id.clone(),
            tool_id: tool_id.to_string(),
            approved: true,
        };
        tokio::spawn(async move {
            if let Err(error) = transport.send_decision(decision).await {
                let _ = pump_tx.send(PumpInput::DecisionFailed {
                    session_id,
                    tool_id: request.tool_id,
                    error,
                });
            }
        });
        true
    }

    fn reject_action(&mut self) -> bool {
        if !self.session.active {
            return false;
        }
        let Some(request) = self.gate.clear() else {
            return false;
        };
        let session_id = self.session.id.clone().unwrap_or_default();
        tracing::info!(session_id = %session_id, tool_id = %request.tool_id, tool = %request.tool_name, "action rejected");

        self.session.pending_confirmation = None;
        self.broadcaster.publish(PanelEvent::ConfirmationResolved {
            session_id: session_id.clone(),
            tool_id: request.tool_id.clone(),
            approved: false,
        });

        let transport = Arc::clone(&self.transport);
        let decision = ConfirmationDecision {
            session_id,
            tool_id: request.tool_id,
            approved: false,
        };
        tokio::spawn(async move {
            if let Err(e) = transport.send_decision(decision).await {
                tracing::warn!(error = %e, "reject signal failed, session already cancelled locally");
            }
        });

        self.session.cancellation.cancel();
        self.end_session(SessionOutcome::Cancelled {
            code: CONFIRMATION_REJECTED.to_string(),
        });
        true
    }

    fn undo_last_action(&mut self) -> Result<Accepted, UndoError> {
        let auth = self.admit().map_err(UndoError::Rejected)?;
        let action = self.ledger.take_last().ok_or(UndoError::NothingToUndo)?;

        let Some(reversal) = undo::reversal_for(&action) else {
            tracing::info!(action_id = %action.id, tool = %action.tool_name, "discarding not-reversible undo entry");
            if let Err(e) = self.ledger.commit_removal(&action) {
                tracing::error!(error = %e, action_id = %action.id, "failed to delete undo entry");
            }
            self.publish_ledger_changed();
            return Err(UndoError::NotReversible {
                action_id: action.id,
                tool_name: action.tool_name,
            });
        };

        tracing::info!(
            action_id = %action.id,
            reversal = %reversal.tool_name,
            "undoing last action"
        );
        let query = format!("Undo: {}", action.description);
        let accepted = self.start_session(&query, None, Some(reversal), auth);
        self.pending_undo = Some(action);
        Ok(accepted)
    }

    fn session_state(&self) -> SessionSnapshot {
        let mut snapshot = self
            .session
            .snapshot(self.broadcaster.last_seq(), self.ledger.len());
        snapshot.pending_confirmation = self.gate.pending().cloned();
        snapshot
    }

    // ─── Stream events ───────────────────────────────────────────────────────

    fn handle_pump(&mut self, input: PumpInput) {
        match input {
            PumpInput::Event { session_id, event } => {
                if self.accepts(&session_id, event.event_type()) {
                    self.handle_event(event);
                }
            }
            PumpInput::Closed { session_id } => {
                if self.accepts(&session_id, "close") {
                    let error = TransportError::StreamEnded;
                    tracing::warn!(session_id = %session_id, "stream closed before a terminal event");
                    self.fail(error.code(), &error.to_string(), None);
                }
            }
            PumpInput::Failed { session_id, error } => {
                if self.accepts(&session_id, "transport_error") {
                    tracing::warn!(session_id = %session_id, error = %error, "stream transport failed");
                    self.fail(error.code(), &error.to_string(), None);
                }
            }
            PumpInput::DecisionFailed {
                session_id,
                tool_id,
                error,
            } => {
                if self.accepts(&session_id, "decision_failed") {
                    tracing::warn!(session_id = %session_id, tool_id = %tool_id, error = %error, "confirm signal failed");
                    self.session.cancellation.cancel();
                    self.fail(TRANSPORT_ERROR, &error.to_string(), None);
                }
            }
        }
    }

    /// Whether input for `session_id` still applies to the current session.
    fn accepts(&self, session_id: &str, kind: &str) -> bool {
        if !self.session.is(session_id) {
            tracing::debug!(session_id = %session_id, kind, "dropping input for stale session");
            return false;
        }
        if !self.session.active {
            tracing::debug!(session_id = %session_id, kind, "dropping input after session end");
            return false;
        }
        true
    }

    fn handle_event(&mut self, event: StreamEvent) {
        let session_id = self.session.id.clone().unwrap_or_default();
        match event {
            StreamEvent::Text { delta } => {
                self.session.accumulated_text.push_str(&delta);
                self.broadcaster
                    .publish(PanelEvent::TextDelta { session_id, delta });
            }
            StreamEvent::ToolUse { name, input } => {
                tracing::info!(session_id = %session_id, tool = %name, "tool invoked");
                let tool = ToolCallInfo { name, input };
                self.session.tool_calls.push(tool.clone());
                self.broadcaster
                    .publish(PanelEvent::ToolInvoked { session_id, tool });
            }
            StreamEvent::ToolResult { payload, is_error } => {
                let records = if is_error {
                    Vec::new()
                } else {
                    extract_records(&payload)
                };
                let record_count = records.len();
                tracing::debug!(session_id = %session_id, is_error, record_count, "tool result");
                if is_error && self.pending_undo.is_some() {
                    self.undo_failed = true;
                }
                self.session.records.extend(records);
                self.session
                    .tool_results
                    .push(ToolResultInfo { payload, is_error });
                self.broadcaster.publish(PanelEvent::ToolResultReceived {
                    session_id,
                    is_error,
                    record_count,
                });
            }
            StreamEvent::ConfirmationRequired {
                tool_id,
                tool_name,
                tool_input,
                summary,
            } => {
                tracing::info!(session_id = %session_id, tool_id = %tool_id, tool = %tool_name, "confirmation required");
                let request = ConfirmationRequest {
                    tool_id,
                    tool_name,
                    tool_input,
                    summary,
                };
                self.gate.open(request.clone());
                self.session.pending_confirmation = Some(request.clone());
                self.broadcaster
                    .publish(PanelEvent::ConfirmationRequested { session_id, request });
            }
            StreamEvent::UndoComplete {
                action,
                description,
            } => {
                tracing::info!(session_id = %session_id, action = %action, "undo complete");
                self.broadcaster.publish(PanelEvent::UndoCompleted {
                    session_id,
                    action,
                    description,
                });
                self.settle_undo(true);
            }
            StreamEvent::Error {
                code,
                message,
                retry_after_seconds,
            } => {
                tracing::warn!(session_id = %session_id, code = %code, message = %message, "remote error");
                self.fail(&code, &message, retry_after_seconds);
            }
            StreamEvent::Done {
                final_text,
                tool_calls,
                tool_results,
            } => self.complete(final_text, tool_calls, tool_results),
        }
    }

    fn complete(
        &mut self,
        final_text: String,
        tool_calls: Vec<ToolCallInfo>,
        tool_results: Option<Vec<ToolResultInfo>>,
    ) {
        let calls = if tool_calls.is_empty() {
            self.session.tool_calls.clone()
        } else {
            tool_calls
        };
        let results = tool_results.unwrap_or_else(|| std::mem::take(&mut self.session.tool_results));

        if self.session.undo_of.is_some() {
            // Reversal calls are never recorded themselves.
            let succeeded = !self.undo_failed && !results.iter().any(|r| r.is_error);
            self.settle_undo(succeeded);
        } else {
            self.record_undoable(&calls, &results);
        }

        if !final_text.is_empty() {
            self.session.accumulated_text = final_text;
        }
        self.session.tool_calls = calls;
        self.end_session(SessionOutcome::Succeeded);
    }

    /// Ledger entries for every undoable call, paired with results by position.
    fn record_undoable(&mut self, calls: &[ToolCallInfo], results: &[ToolResultInfo]) {
        if calls.len() != results.len() {
            tracing::warn!(
                tool_calls = calls.len(),
                tool_results = results.len(),
                "tool call/result counts differ, matching by position"
            );
        }
        let mut recorded = false;
        for (call, result) in calls.iter().zip(results) {
            if result.is_error {
                continue;
            }
            recorded |= self
                .ledger
                .record(&call.name, &call.input, &result.payload)
                .is_some();
        }
        if recorded {
            self.publish_ledger_changed();
        }
    }

    fn fail(&mut self, code: &str, message: &str, retry_after_seconds: Option<u64>) {
        self.end_session(SessionOutcome::Failed {
            code: code.to_string(),
            message: message.to_string(),
            retry_after_seconds,
        });
    }

    /// Finalize the session: one `SESSION_ENDED` broadcast, watchdog off,
    /// inactive. A still-detached undo entry goes back on the ledger.
    fn end_session(&mut self, outcome: SessionOutcome) {
        if self.pending_undo.is_some() {
            self.settle_undo(false);
        }
        self.gate.clear();
        self.watchdog.stop();
        // Stops the pump; anything it still had in flight is dropped.
        self.session.cancellation.cancel();
        self.session.finish(outcome.clone());

        let session_id = self.session.id.clone().unwrap_or_default();
        tracing::info!(
            session_id = %session_id,
            code = outcome.code().unwrap_or("OK"),
            tool_calls = self.session.tool_calls.len(),
            records = self.session.records.len(),
            "session ended"
        );
        self.broadcaster.publish(PanelEvent::SessionEnded {
            session_id,
            outcome,
            final_text: self.session.accumulated_text.clone(),
            tool_calls: self.session.tool_calls.clone(),
            records: self.session.records.clone(),
        });
    }

    /// Commit or restore the detached undo entry, at most once.
    fn settle_undo(&mut self, succeeded: bool) {
        let Some(action) = self.pending_undo.take() else {
            return;
        };
        if succeeded {
            if let Err(e) = self.ledger.commit_removal(&action) {
                tracing::error!(error = %e, action_id = %action.id, "failed to delete undone entry");
            }
            tracing::info!(action_id = %action.id, "undo committed");
        } else {
            self.ledger.restore(action);
        }
        self.publish_ledger_changed();
    }

    fn publish_ledger_changed(&self) {
        self.broadcaster.publish(PanelEvent::LedgerChanged {
            undo_available: self.ledger.len(),
            latest: self.ledger.peek().cloned(),
        });
    }
}

// ─── Stream pump ─────────────────────────────────────────────────────────────

/// Open the stream and forward decoded events until it ends or `cancel` fires.
async fn pump<T: AgentTransport>(
    transport: Arc<T>,
    request: QueryRequest,
    cancel: CancellationToken,
    session_id: String,
    inbox: mpsc::UnboundedSender<PumpInput>,
) {
    let opened = tokio::select! {
        biased;
        _ = cancel.cancelled() => return,
        opened = transport.open_stream(request) => opened,
    };

    let bytes = match opened {
        Ok(bytes) => bytes,
        Err(error) => {
            let _ = inbox.send(PumpInput::Failed { session_id, error });
            return;
        }
    };

    let mut events = Box::pin(decode_byte_stream(bytes));
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(session_id = %session_id, "stream pump cancelled");
                return;
            }
            next = events.next() => next,
        };

        let input = match next {
            Some(Ok(event)) => PumpInput::Event {
                session_id: session_id.clone(),
                event,
            },
            Some(Err(error)) => PumpInput::Failed {
                session_id: session_id.clone(),
                error,
            },
            None => PumpInput::Closed {
                session_id: session_id.clone(),
            },
        };
        let last = !matches!(input, PumpInput::Event { .. });
        if inbox.send(input).is_err() || last {
            return;
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

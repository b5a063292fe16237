//! Native-messaging host.
//!
//! Bridges the browser extension to the session controller over the
//! extension's stdio: requests come in as length-prefixed JSON frames and
//! are answered in order; every controller broadcast (keepalives included)
//! is forwarded as its own frame. Frames are written by a single task so
//! responses and broadcasts never interleave mid-frame.

pub mod framing;
pub mod messages;

use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;

use crate::session::controller::ControllerHandle;

pub use framing::{read_frame, write_body, write_frame, FrameError, MAX_OUTGOING_FRAME};
pub use messages::{IncomingFrame, OutgoingFrame, PanelRequest, PanelResponse};

pub const BAD_REQUEST: &str = "BAD_REQUEST";
pub const NO_PENDING_CONFIRMATION: &str = "NO_PENDING_CONFIRMATION";
pub const RESPONSE_TOO_LARGE: &str = "RESPONSE_TOO_LARGE";

/// Budget for each text field kept in a reduced broadcast.
const REDUCED_TEXT_BYTES: usize = MAX_OUTGOING_FRAME / 4;

// ─── Dispatch ────────────────────────────────────────────────────────────────

/// Run one request against the controller.
pub async fn dispatch(handle: &ControllerHandle, request: PanelRequest) -> PanelResponse {
    match request {
        PanelRequest::SubmitQuery {
            query,
            context,
            undo_stack,
        } => match handle.submit_query(&query, context, undo_stack).await {
            Ok(accepted) => PanelResponse::ok(Some(json!({ "sessionId": accepted.session_id }))),
            Err(e) => PanelResponse::error(e.code(), e.to_string()),
        },
        PanelRequest::CancelQuery => unit(handle.cancel_query().await),
        PanelRequest::ConfirmAction { tool_id } => {
            resolved(handle.confirm_action(&tool_id).await, "no confirmation pending for that tool")
        }
        PanelRequest::RejectAction => {
            resolved(handle.reject_action().await, "no confirmation pending")
        }
        PanelRequest::GetSessionState => match handle.session_state().await {
            Ok(snapshot) => to_data(&snapshot),
            Err(e) => PanelResponse::error(e.code(), e.to_string()),
        },
        PanelRequest::UndoLastAction => match handle.undo_last_action().await {
            Ok(accepted) => PanelResponse::ok(Some(json!({ "sessionId": accepted.session_id }))),
            Err(e) => PanelResponse::error(e.code(), e.to_string()),
        },
        PanelRequest::GetUndoStack => match handle.undo_stack().await {
            Ok(stack) => to_data(&stack),
            Err(e) => PanelResponse::error(e.code(), e.to_string()),
        },
        PanelRequest::ClearLedger => unit(handle.clear_ledger().await),
        PanelRequest::UpdateAuthState { auth_state } => {
            unit(handle.update_auth_state(auth_state).await)
        }
    }
}

fn unit(result: Result<(), crate::session::errors::SessionError>) -> PanelResponse {
    match result {
        Ok(()) => PanelResponse::ok(None),
        Err(e) => PanelResponse::error(e.code(), e.to_string()),
    }
}

fn resolved(
    result: Result<bool, crate::session::errors::SessionError>,
    message: &str,
) -> PanelResponse {
    match result {
        Ok(true) => PanelResponse::ok(None),
        Ok(false) => PanelResponse::error(NO_PENDING_CONFIRMATION, message),
        Err(e) => PanelResponse::error(e.code(), e.to_string()),
    }
}

fn to_data<T: serde::Serialize>(value: &T) -> PanelResponse {
    match serde_json::to_value(value) {
        Ok(data) => PanelResponse::ok(Some(data)),
        Err(e) => PanelResponse::error("SERIALIZATION_ERROR", e.to_string()),
    }
}

// ─── Host loop ───────────────────────────────────────────────────────────────

/// Serve the extension until it closes its end of the pipe.
///
/// A read or framing error ends the loop with that error. An active query is
/// cancelled on the way out since nobody is left to watch it.
pub async fn run_native_host<R, W>(
    handle: ControllerHandle,
    mut reader: R,
    writer: W,
) -> Result<(), FrameError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (out_tx, out_rx) = mpsc::unbounded_channel::<OutgoingFrame>();
    let writer_task = tokio::spawn(write_loop(writer, out_rx));

    let mut events = handle.subscribe();
    let forward_tx = out_tx.clone();
    let forwarder = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(envelope) => {
                    if forward_tx.send(OutgoingFrame::Broadcast(envelope)).is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "host fell behind broadcasts");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let result = loop {
        let body = match read_frame(&mut reader).await {
            Ok(Some(body)) => body,
            Ok(None) => {
                tracing::info!("extension closed the native port");
                break Ok(());
            }
            Err(e) => break Err(e),
        };

        let (id, response) = match serde_json::from_slice::<IncomingFrame>(&body) {
            Ok(frame) => {
                tracing::debug!(kind = frame.request.kind(), "panel request");
                let response = dispatch(&handle, frame.request).await;
                (frame.id, response)
            }
            Err(e) => {
                tracing::warn!(error = %e, "unparseable panel request");
                (request_id(&body), PanelResponse::error(BAD_REQUEST, e.to_string()))
            }
        };
        if out_tx.send(OutgoingFrame::Response { id, response }).is_err() {
            break Ok(());
        }
    };

    if let Err(e) = handle.cancel_query().await {
        tracing::debug!(error = %e, "cancel on shutdown failed");
    }
    forwarder.abort();
    drop(out_tx);
    if let Err(e) = writer_task.await {
        tracing::warn!(error = %e, "host writer task panicked");
    }
    result
}

/// Best-effort `id` from a frame that failed to parse as a request.
fn request_id(body: &[u8]) -> Option<Value> {
    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|v| v.get("id").cloned())
}

async fn write_loop<W: AsyncWrite + Unpin>(mut writer: W, mut rx: mpsc::UnboundedReceiver<OutgoingFrame>) {
    while let Some(frame) = rx.recv().await {
        let body = match encode_outgoing(frame) {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(error = %e, "dropping outgoing frame");
                continue;
            }
        };
        if let Err(e) = write_body(&mut writer, &body).await {
            tracing::error!(error = %e, "failed to write to extension");
            break;
        }
    }
}

// ─── Outgoing size limit ─────────────────────────────────────────────────────

/// Serialize `frame`, reducing it when it exceeds the browser's frame limit.
///
/// An oversized response becomes a `RESPONSE_TOO_LARGE` error for the same
/// `id`. An oversized broadcast keeps its type and ids but drops its bulky
/// fields and carries `"truncated": true`, so the panel still sees e.g.
/// `SESSION_ENDED`.
fn encode_outgoing(frame: OutgoingFrame) -> Result<Vec<u8>, FrameError> {
    let body = serde_json::to_vec(&frame)?;
    if body.len() <= MAX_OUTGOING_FRAME {
        return Ok(body);
    }
    let len = body.len();

    let reduced = match frame {
        OutgoingFrame::Response { id, .. } => {
            tracing::warn!(len, "response exceeds frame limit");
            serde_json::to_vec(&OutgoingFrame::Response {
                id,
                response: PanelResponse::error(
                    RESPONSE_TOO_LARGE,
                    format!("response of {len} bytes exceeds the {MAX_OUTGOING_FRAME}-byte frame limit"),
                ),
            })?
        }
        OutgoingFrame::Broadcast(envelope) => {
            tracing::warn!(len, kind = envelope.event.kind(), seq = envelope.seq, "reducing oversized broadcast");
            let mut value = serde_json::to_value(OutgoingFrame::Broadcast(envelope))?;
            if let Some(event) = value.get_mut("event").and_then(Value::as_object_mut) {
                reduce_event(event);
            }
            serde_json::to_vec(&value)?
        }
    };

    if reduced.len() > MAX_OUTGOING_FRAME {
        return Err(FrameError::TooLarge {
            len: reduced.len(),
            max: MAX_OUTGOING_FRAME,
        });
    }
    Ok(reduced)
}

fn reduce_event(event: &mut serde_json::Map<String, Value>) {
    for key in ["records", "toolCalls"] {
        if let Some(list) = event.get_mut(key) {
            *list = Value::Array(Vec::new());
        }
    }
    if let Some(tool) = event.get_mut("tool").and_then(Value::as_object_mut) {
        tool.insert("input".into(), Value::Object(serde_json::Map::new()));
    }
    if let Some(request) = event.get_mut("request").and_then(Value::as_object_mut) {
        request.insert("toolInput".into(), Value::Object(serde_json::Map::new()));
    }
    if let Some(Value::Object(latest)) = event.get_mut("latest") {
        latest.insert("undoData".into(), Value::Object(serde_json::Map::new()));
    }
    for key in ["finalText", "delta", "query", "summary", "description"] {
        if let Some(Value::String(text)) = event.get_mut(key) {
            if text.len() > REDUCED_TEXT_BYTES {
                let cut = crate::truncate_utf8(text, REDUCED_TEXT_BYTES).len();
                text.truncate(cut);
            }
        }
    }
    event.insert("truncated".into(), Value::Bool(true));
}

// ─── Tests ───────────────────────────────────────────────────────────────────

//! Incremental server-push (SSE) decoder for the agent stream.
//!
//! Bytes arrive in arbitrary fragments. The decoder buffers them, splits the
//! buffer on the blank-line record separator, and parses every complete
//! record (`event: …` + `data: {…}`) into a `StreamEvent`. An incomplete
//! trailing fragment stays buffered for the next chunk. Malformed records are
//! dropped with a warning; they never abort the stream.

use std::collections::VecDeque;

use futures::stream::{self, Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::errors::{RecordError, TransportError};
use super::types::{
    retry_after_seconds, ConfirmationPayload, DonePayload, ErrorPayload, StreamEvent,
    TextPayload, ToolResultInfo, ToolResultPayload, ToolUsePayload, UndoCompletePayload,
    DEFAULT_REMOTE_ERROR_CODE, EVENT_CONFIRMATION_REQUIRED, EVENT_DONE, EVENT_ERROR, EVENT_TEXT,
    EVENT_TOOL_RESULT, EVENT_TOOL_USE, EVENT_UNDO_COMPLETE,
};

/// Record separator after `\r` stripping.
const RECORD_SEPARATOR: &[u8] = b"\n\n";

// ─── EventDecoder ────────────────────────────────────────────────────────────

/// Push-based decoder: feed byte chunks, collect complete events.
#[derive(Debug, Default)]
pub struct EventDecoder {
    buffer: Vec<u8>,
    /// Prefix of `buffer` already searched for a separator.
    scanned: usize,
    dropped: usize,
}

impl EventDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every event completed by it, in order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        // CR only ever appears as part of a line terminator; JSON escapes it.
        self.buffer
            .extend(chunk.iter().copied().filter(|b| *b != b'\r'));

        let mut events = Vec::new();
        let mut start = 0;
        let mut from = self.scanned;
        while let Some(offset) = find_separator(&self.buffer[from..]) {
            let end = from + offset;
            let text = String::from_utf8_lossy(&self.buffer[start..end]).into_owned();
            if let Some(event) = self.decode_record(&text) {
                events.push(event);
            }
            start = end + RECORD_SEPARATOR.len();
            from = start;
        }
        self.buffer.drain(..start);
        // A separator may straddle the next chunk boundary.
        self.scanned = self
            .buffer
            .len()
            .saturating_sub(RECORD_SEPARATOR.len() - 1);
        events
    }

    /// Flush the buffered remainder once, at transport close.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let rest = std::mem::take(&mut self.buffer);
        self.scanned = 0;
        let text = String::from_utf8_lossy(&rest);
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }
        self.decode_record(trimmed).into_iter().collect()
    }

    /// Bytes held back waiting for a record separator.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Number of malformed records dropped so far.
    pub fn dropped_records(&self) -> usize {
        self.dropped
    }

    fn decode_record(&mut self, record: &str) -> Option<StreamEvent> {
        match parse_record(record) {
            Ok(event) => event,
            Err(e) => {
                self.dropped += 1;
                tracing::warn!(
                    error = %e,
                    record = %crate::truncate_utf8(record, 200),
                    "dropping malformed stream record"
                );
                None
            }
        }
    }
}

fn find_separator(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(RECORD_SEPARATOR.len())
        .position(|w| w == RECORD_SEPARATOR)
}

// ─── Record parsing ──────────────────────────────────────────────────────────

/// Parse one SSE record. `Ok(None)` for comments and keep-alives.
pub fn parse_record(record: &str) -> Result<Option<StreamEvent>, RecordError> {
    let mut event_type: Option<String> = None;
    let mut data_lines: Vec<&str> = Vec::new();

    for line in record.lines() {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => event_type = Some(value.trim().to_string()),
            "data" => data_lines.push(value),
            // id:, retry: and unknown fields carry nothing for us
            _ => {}
        }
    }

    if event_type.is_none() && data_lines.is_empty() {
        return Ok(None);
    }

    if data_lines.is_empty() {
        return Err(RecordError::MissingData {
            event_type: event_type.unwrap_or_default(),
        });
    }

    let data: Value =
        serde_json::from_str(&data_lines.join("\n")).map_err(|e| RecordError::InvalidJson {
            reason: e.to_string(),
        })?;

    let event_type = match event_type {
        Some(t) if !t.is_empty() => t,
        _ => data
            .get("type")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or(RecordError::MissingEventType)?,
    };

    if !data.is_object() {
        return Err(RecordError::NotAnObject { event_type });
    }

    event_from_data(&event_type, data).map(Some)
}

/// Map a well-formed `(event_type, data)` pair to a `StreamEvent`.
fn event_from_data(event_type: &str, data: Value) -> Result<StreamEvent, RecordError> {
    let event = match event_type {
        EVENT_TEXT => {
            let p: TextPayload = payload(event_type, data)?;
            StreamEvent::Text { delta: p.delta }
        }
        EVENT_TOOL_USE => {
            let p: ToolUsePayload = payload(event_type, data)?;
            StreamEvent::ToolUse {
                name: p.name,
                input: p.input,
            }
        }
        EVENT_TOOL_RESULT => {
            let p: ToolResultPayload = payload(event_type, data)?;
            StreamEvent::ToolResult {
                payload: p.result,
                is_error: p.is_error,
            }
        }
        EVENT_CONFIRMATION_REQUIRED => {
            let p: ConfirmationPayload = payload(event_type, data)?;
            StreamEvent::ConfirmationRequired {
                tool_id: p.tool_id,
                tool_name: p.tool_name,
                tool_input: p.tool_input,
                summary: p.summary,
            }
        }
        EVENT_UNDO_COMPLETE => {
            let p: UndoCompletePayload = payload(event_type, data)?;
            StreamEvent::UndoComplete {
                action: p.action,
                description: p.description,
            }
        }
        EVENT_ERROR => {
            let p: ErrorPayload = payload(event_type, data)?;
            StreamEvent::Error {
                code: p
                    .error_code
                    .unwrap_or_else(|| DEFAULT_REMOTE_ERROR_CODE.to_string()),
                message: p.error,
                retry_after_seconds: retry_after_seconds(p.retry_after.as_ref()),
            }
        }
        EVENT_DONE => {
            let p: DonePayload = payload(event_type, data)?;
            match p.error {
                Some(message) => StreamEvent::Error {
                    code: DEFAULT_REMOTE_ERROR_CODE.to_string(),
                    message,
                    retry_after_seconds: None,
                },
                None => StreamEvent::Done {
                    final_text: p.response,
                    tool_calls: p.tool_calls,
                    tool_results: p.tool_results.map(|results| {
                        results
                            .into_iter()
                            .map(|r| ToolResultInfo {
                                payload: r.result,
                                is_error: r.is_error,
                            })
                            .collect()
                    }),
                },
            }
        }
        other => {
            return Err(RecordError::UnknownEventType {
                event_type: other.to_string(),
            })
        }
    };
    Ok(event)
}

fn payload<T: DeserializeOwned>(event_type: &str, data: Value) -> Result<T, RecordError> {
    serde_json::from_value(data).map_err(|e| RecordError::InvalidPayload {
        event_type: event_type.to_string(),
        reason: e.to_string(),
    })
}

// ─── Stream adapter ──────────────────────────────────────────────────────────

/// Decode a transport byte stream into a stream of events.
///
/// Transport errors are forwarded as-is and end the stream. A clean close
/// flushes the decoder's remainder once.
pub fn decode_byte_stream<S>(bytes: S) -> impl Stream<Item = Result<StreamEvent, TransportError>>
where
    S: Stream<Item = Result<Vec<u8>, TransportError>> + Unpin,
{
    let state = (bytes, EventDecoder::new(), VecDeque::new(), false);

    stream::unfold(
        state,
        |(mut bytes, mut decoder, mut pending, mut closed)| async move {
            loop {
                if let Some(event) = pending.pop_front() {
                    return Some((Ok(event), (bytes, decoder, pending, closed)));
                }
                if closed {
                    return None;
                }
                match bytes.next().await {
                    Some(Ok(chunk)) => pending.extend(decoder.feed(&chunk)),
                    Some(Err(e)) => {
                        closed = true;
                        return Some((Err(e), (bytes, decoder, pending, closed)));
                    }
                    None => {
                        closed = true;
                        pending.extend(decoder.finish());
                    }
                }
            }
        },
    )
}

// ─── Tests ───────────────────────────────────────────────────────────────────

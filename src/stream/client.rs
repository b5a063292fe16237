//! Transport to the remote agent service.
//!
//! `AgentTransport` is the seam between the session controller and the
//! network: one streaming POST per session plus a small decision POST when a
//! confirmation is resolved. `HttpAgentTransport` is the reqwest-backed
//! implementation; tests substitute an in-process fake.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use futures::{Stream, StreamExt};
use reqwest::Client as HttpClient;
use serde::Serialize;
use serde_json::{Map, Value};

use super::errors::TransportError;
use crate::config::OverlayConfig;
use crate::session::types::UndoableAction;

/// Raw response body, chunk by chunk, as delivered by the network.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, TransportError>> + Send>>;

// ─── Request types ───────────────────────────────────────────────────────────

/// Who is asking. Sent as headers, never in the body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallerIdentity {
    pub user_id: Option<String>,
    pub tenant_id: Option<String>,
    pub nation_slug: Option<String>,
}

/// A concrete reversal call the remote agent should execute for an undo.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReversalCall {
    /// Ledger entry being reversed.
    pub action_id: String,
    pub tool_name: String,
    pub tool_input: Map<String, Value>,
}

/// Body of the outbound query POST.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
    pub undo_ledger_snapshot: Vec<UndoableAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub undo_action: Option<ReversalCall>,
    #[serde(skip)]
    pub identity: CallerIdentity,
}

impl QueryRequest {
    /// `(header, value)` pairs carrying caller identity and page context.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = Vec::new();
        let identity = [
            ("X-Nat-User-Id", &self.identity.user_id),
            ("X-Nat-Tenant-Id", &self.identity.tenant_id),
            ("X-Nat-Nation-Slug", &self.identity.nation_slug),
        ];
        for (name, value) in identity {
            if let Some(v) = value {
                headers.push((name, v.clone()));
            }
        }

        if let Some(ctx) = self.context.as_ref().and_then(Value::as_object) {
            for (name, key) in [("X-Nat-Page-Type", "pageType"), ("X-Nat-Person-Id", "personId")] {
                match ctx.get(key) {
                    Some(Value::String(s)) if !s.is_empty() => headers.push((name, s.clone())),
                    Some(Value::Number(n)) => headers.push((name, n.to_string())),
                    _ => {}
                }
            }
        }
        headers
    }
}

/// The user's answer to a `confirmation_required` pause.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationDecision {
    pub session_id: String,
    pub tool_id: String,
    pub approved: bool,
}

// ─── AgentTransport ──────────────────────────────────────────────────────────

/// Network seam used by the session controller.
pub trait AgentTransport: Send + Sync + 'static {
    /// Open the streaming response for one session.
    fn open_stream(
        &self,
        request: QueryRequest,
    ) -> impl Future<Output = Result<ByteStream, TransportError>> + Send;

    /// Tell the remote side whether a paused tool call may proceed.
    fn send_decision(
        &self,
        decision: ConfirmationDecision,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}

// ─── HttpAgentTransport ──────────────────────────────────────────────────────

/// reqwest-backed transport.
pub struct HttpAgentTransport {
    /// Long timeout, used for the streaming POST.
    http_stream: HttpClient,
    /// Short timeout, used for decision POSTs.
    http: HttpClient,
    endpoint: String,
    confirm_endpoint: String,
    stream_timeout_secs: u64,
    connect_timeout_secs: u64,
}

impl HttpAgentTransport {
    pub fn from_config(config: &OverlayConfig) -> Result<Self, TransportError> {
        let connect_timeout = Duration::from_secs(config.connect_timeout_secs);

        let http_stream = HttpClient::builder()
            .connect_timeout(connect_timeout)
            .timeout(Duration::from_secs(config.stream_timeout_secs))
            .build()
            .map_err(|e| TransportError::ConnectionFailed {
                endpoint: config.agent_endpoint.clone(),
                reason: format!("failed to build streaming HTTP client: {e}"),
            })?;

        let http = HttpClient::builder()
            .connect_timeout(connect_timeout)
            .timeout(connect_timeout * 2)
            .build()
            .map_err(|e| TransportError::ConnectionFailed {
                endpoint: config.confirm_endpoint(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            http_stream,
            http,
            endpoint: config.agent_endpoint.clone(),
            confirm_endpoint: config.confirm_endpoint(),
            stream_timeout_secs: config.stream_timeout_secs,
            connect_timeout_secs: config.connect_timeout_secs,
        })
    }
}

impl AgentTransport for HttpAgentTransport {
    async fn open_stream(&self, request: QueryRequest) -> Result<ByteStream, TransportError> {
        tracing::info!(
            url = %self.endpoint,
            query_len = request.query.len(),
            ledger_entries = request.undo_ledger_snapshot.len(),
            is_undo = request.undo_action.is_some(),
            "opening agent stream"
        );

        let mut builder = self
            .http_stream
            .post(&self.endpoint)
            .json(&request)
            .header("Accept", "text/event-stream");
        for (name, value) in request.headers() {
            builder = builder.header(name, value);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(&self.endpoint, &e, self.connect_timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::HttpError {
                status: status.as_u16(),
                body,
            });
        }

        let timeout_secs = self.stream_timeout_secs;
        let bytes = response.bytes_stream().map(move |chunk| match chunk {
            Ok(bytes) => Ok(bytes.to_vec()),
            Err(e) if e.is_timeout() => Err(TransportError::Timeout {
                duration_secs: timeout_secs,
            }),
            Err(e) => Err(TransportError::StreamError {
                reason: e.to_string(),
            }),
        });
        Ok(Box::pin(bytes))
    }

    async fn send_decision(&self, decision: ConfirmationDecision) -> Result<(), TransportError> {
        tracing::info!(
            url = %self.confirm_endpoint,
            tool_id = %decision.tool_id,
            approved = decision.approved,
            "sending confirmation decision"
        );

        let response = self
            .http
            .post(&self.confirm_endpoint)
            .json(&decision)
            .send()
            .await
            .map_err(|e| {
                TransportError::from_reqwest(&self.confirm_endpoint, &e, self.connect_timeout_secs)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::HttpError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(context: Option<Value>) -> QueryRequest {
        QueryRequest {
            query: "find John Doe".into(),
            context,
            undo_ledger_snapshot: vec![],
            undo_action: None,
            identity: CallerIdentity {
                user_id: Some("u-1".into()),
                tenant_id: Some("t-9".into()),
                nation_slug: None,
            },
        }
    }

    #[test]
    fn test_body_is_camel_case_without_identity() {
        let body = serde_json::to_value(request(Some(json!({"pageType": "person"})))).unwrap();
        assert_eq!(body["query"], "find John Doe");
        assert!(body["undoLedgerSnapshot"].as_array().unwrap().is_empty());
        assert!(body.get("undoAction").is_none());
        assert!(body.get("identity").is_none());
    }

    #[test]
    fn test_headers_carry_identity_and_page_context() {
        let req = request(Some(json!({"pageType": "person", "personId": 5})));
        let headers = req.headers();
        assert!(headers.contains(&("X-Nat-User-Id", "u-1".to_string())));
        assert!(headers.contains(&("X-Nat-Tenant-Id", "t-9".to_string())));
        assert!(headers.contains(&("X-Nat-Page-Type", "person".to_string())));
        assert!(headers.contains(&("X-Nat-Person-Id", "5".to_string())));
        assert!(!headers.iter().any(|(name, _)| *name == "X-Nat-Nation-Slug"));
    }

    #[test]
    fn test_decision_serializes_camel_case() {
        let decision = ConfirmationDecision {
            session_id: "s1".into(),
            tool_id: "t1".into(),
            approved: false,
        };
        let json = serde_json::to_string(&decision).unwrap();
        assert_eq!(json, r#"{"sessionId":"s1","toolId":"t1","approved":false}"#);
    }
}

//! In-process `AgentTransport` for tests.
//!
//! Each call to `script()` queues one response body; the test pushes byte
//! chunks (or a transport error) through the returned sender and drops it to
//! close the stream.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use futures::channel::mpsc;

use super::client::{AgentTransport, ByteStream, ConfirmationDecision, QueryRequest};
use super::errors::TransportError;

pub(crate) type ChunkSender = mpsc::UnboundedSender<Result<Vec<u8>, TransportError>>;

#[derive(Default)]
pub(crate) struct FakeAgentTransport {
    bodies: Mutex<VecDeque<mpsc::UnboundedReceiver<Result<Vec<u8>, TransportError>>>>,
    requests: Mutex<Vec<QueryRequest>>,
    decisions: Mutex<Vec<ConfirmationDecision>>,
    fail_decisions: AtomicBool,
}

impl FakeAgentTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the body for the next `open_stream` call.
    pub fn script(&self) -> ChunkSender {
        let (tx, rx) = mpsc::unbounded();
        self.bodies.lock().unwrap().push_back(rx);
        tx
    }

    pub fn requests(&self) -> Vec<QueryRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn decisions(&self) -> Vec<ConfirmationDecision> {
        self.decisions.lock().unwrap().clone()
    }

    pub fn fail_decisions(&self, fail: bool) {
        self.fail_decisions.store(fail, Ordering::SeqCst);
    }
}

/// Send one SSE record through a scripted body.
pub(crate) fn send_record(tx: &ChunkSender, event: &str, data: serde_json::Value) {
    let record = format!("event: {event}\ndata: {data}\n\n");
    tx.unbounded_send(Ok(record.into_bytes())).unwrap();
}

impl AgentTransport for FakeAgentTransport {
    // Bookkeeping happens on call, before the future is polled, so a pump
    // cancelled right away still consumes its scripted body.
    fn open_stream(
        &self,
        request: QueryRequest,
    ) -> impl Future<Output = Result<ByteStream, TransportError>> + Send {
        self.requests.lock().unwrap().push(request);
        let body = self.bodies.lock().unwrap().pop_front();
        async move {
            match body {
                Some(rx) => Ok(Box::pin(rx) as ByteStream),
                None => Err(TransportError::ConnectionFailed {
                    endpoint: "fake".into(),
                    reason: "no scripted body".into(),
                }),
            }
        }
    }

    async fn send_decision(&self, decision: ConfirmationDecision) -> Result<(), TransportError> {
        self.decisions.lock().unwrap().push(decision);
        if self.fail_decisions.load(Ordering::SeqCst) {
            return Err(TransportError::HttpError {
                status: 503,
                body: "unavailable".into(),
            });
        }
        Ok(())
    }
}

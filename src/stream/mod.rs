//! Agent stream layer: transport to the remote agent and the incremental
//! decoder for its server-push protocol.

pub mod client;
pub mod decoder;
pub mod errors;
#[cfg(test)]
pub(crate) mod testing;
pub mod types;

pub use client::{
    AgentTransport, ByteStream, CallerIdentity, ConfirmationDecision, HttpAgentTransport,
    QueryRequest, ReversalCall,
};
pub use decoder::{decode_byte_stream, parse_record, EventDecoder};
pub use errors::{RecordError, TransportError};
pub use types::{StreamEvent, ToolCallInfo, ToolResultInfo};

//! Session core: the streaming session state machine.
//!
//! Leaves first:
//! - `confirmation`: the single-slot confirmation gate
//! - `ledger` + `undo` + `database`: the bounded, durable undo ledger
//! - `broadcast`: sequenced fan-out to panels
//! - `watchdog`: keepalive timer while a stream is active
//! - `controller`: owns the session and drives everything above

pub mod auth;
pub mod broadcast;
pub mod confirmation;
pub mod controller;
pub mod database;
pub mod errors;
pub mod ledger;
pub mod records;
pub mod types;
pub mod undo;
pub mod watchdog;

pub use auth::{AuthProvider, AuthState, StaticAuthProvider, StoredAuthProvider};
pub use broadcast::{BroadcastEnvelope, Broadcaster, PanelEvent};
pub use confirmation::ConfirmationGate;
pub use controller::{spawn_controller, Accepted, ControllerHandle};
pub use database::LedgerStore;
pub use errors::{RejectedReason, SessionError, UndoError};
pub use ledger::{SessionLedger, DEFAULT_LEDGER_CAPACITY};
pub use types::{
    ConfirmationRequest, DomainRecord, Session, SessionOutcome, SessionSnapshot, UndoType,
    UndoableAction,
};
pub use watchdog::KeepaliveWatchdog;

//! Panel Client side: render state, the broadcast reducer, and the per-tab
//! client that forwards user intents to the controller.

pub mod client;
pub mod reducer;
pub mod state;

pub use client::PanelClient;
pub use reducer::{reduce, reduce_local_error, Reduction};
pub use state::{PanelError, PanelState, PanelStatus};

//! Realtime delivery over WebSockets

mod events;
mod hub;
mod socket;

pub use events::{ClientEvent, MessageRef, ServerEvent};
pub use hub::Hub;
pub use socket::{apply, ws_upgrade};

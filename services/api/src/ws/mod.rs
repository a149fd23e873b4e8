//! WebSocket Chat Transport
//!
//! The streaming face of the chat transport:
//!
//! - `protocol`: Defines the JSON-based frame format for client-server communication.
//! - `session`: Manages the WebSocket connection lifecycle, from handshake to termination.

pub mod protocol;
pub mod session;

pub use session::ws_handler;

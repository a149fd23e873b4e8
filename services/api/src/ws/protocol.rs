//! Defines the WebSocket frame protocol between a chat client and the API server.

use fitplan_core::chat::{ChatAcknowledgement, ChatMessage};
use serde::{Deserialize, Serialize};

fn default_ack_required() -> bool {
    true
}

/// Frames sent from the client to the server.
#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Identifies the sender for the rest of the connection. This must be the first frame.
    Init {
        sender: String,
        /// Narrows the session to one conversation of this sender.
        session_id: Option<String>,
    },
    /// A chat message from the sender to the agent.
    Chat {
        message: ChatMessage,
        #[serde(default = "default_ack_required")]
        ack_required: bool,
    },
}

/// Frames sent from the server to the client.
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Confirms the handshake and names the session the connection is bound to.
    Initialized { session: String },
    /// Confirms receipt of a chat message, sent before any reply to it.
    Ack { acknowledgement: ChatAcknowledgement },
    /// A reply from the agent.
    Reply { message: ChatMessage },
    /// Reports a problem with a client frame.
    Error { message: String },
}

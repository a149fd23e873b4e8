//! Fitness Planner Core
//!
//! Session state and conversation flow for the fitness goal planner agent.
//! Reasoning about the five planning phases is delegated to an external
//! planning oracle; this crate keeps each user's conversation coherent across
//! independent chat messages.

pub mod chat;
pub mod conversation;
pub mod oracle;
pub mod phase;
pub mod prompt;
pub mod session;

pub use conversation::{
    CollectingOutbox, ConversationManager, ConversationSettings, Envelope, Outbound, Outbox,
};
pub use oracle::{OpenAICompatibleOracle, OracleError, OracleSettings, PlanReply, PlanningOracle};
pub use session::{InMemorySessionStore, SessionKey, SessionStore};

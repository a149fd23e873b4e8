//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds the conversation
//! manager and the immutable configuration shared by every handler.

use crate::config::Config;
use fitplan_core::ConversationManager;
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<ConversationManager>,
    pub config: Arc<Config>,
}

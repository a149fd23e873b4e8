//! Fitness Planner API Library Crate
//!
//! The transport boundary of the fitness goal planner agent: configuration,
//! application state, the REST chat endpoint, the WebSocket chat protocol,
//! and routing. The `api` binary is a thin wrapper around this library.

pub mod config;
pub mod handlers;
pub mod models;
pub mod router;
pub mod state;
pub mod ws;

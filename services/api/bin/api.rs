//! Main Entrypoint for the Fitness Planner API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Loading the planner directive.
//! 3. Initializing the session store, planning oracle and conversation manager.
//! 4. Constructing the Axum router and applying middleware.
//! 5. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use fitplan_api::{config::Config, router::create_router, state::AppState};
use fitplan_core::{
    ConversationManager, InMemorySessionStore, OpenAICompatibleOracle, PlanningOracle,
    SessionStore, prompt,
};
use std::{net::SocketAddr, path::Path, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        return;
    }
    info!("Received shutdown signal. Shutting down gracefully...");
}

/// Returns the planner directive, from `path` when configured.
fn load_system_prompt(path: Option<&Path>) -> anyhow::Result<String> {
    match path {
        Some(path) => {
            let prompt = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read system prompt from {}", path.display()))?;
            anyhow::ensure!(
                !prompt.trim().is_empty(),
                "System prompt file {} is empty",
                path.display()
            );
            Ok(prompt)
        }
        None => Ok(prompt::SYSTEM_PROMPT.to_string()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 2. Load Planner Directive ---
    let system_prompt = Arc::new(load_system_prompt(config.system_prompt_path.as_deref())?);

    // --- 3. Initialize Shared Services ---
    let oracle: Arc<dyn PlanningOracle> = Arc::new(
        OpenAICompatibleOracle::new(config.oracle_settings())
            .context("Failed to build planning oracle client")?,
    );
    let store: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
    let manager = Arc::new(ConversationManager::new(
        store,
        oracle,
        system_prompt,
        config.conversation_settings(),
    ));

    let app_state = Arc::new(AppState {
        manager,
        config: Arc::new(config.clone()),
    });

    // --- 4. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state).layer(cors);

    // --- 5. Start Server ---
    info!("Fitness Goal Planner Agent started!");
    info!(
        model = %config.oracle_model,
        oracle = %config.oracle_base_url,
        timeout = ?config.oracle_timeout,
        history_window = ?config.history_window,
        bind_address = %config.bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}

//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the REST chat endpoint, WebSocket endpoint, and OpenAPI documentation.

use crate::{
    handlers,
    models::{Acknowledgement, ChatExchange, ChatRequest, ErrorResponse, HealthResponse, Reply},
    state::AppState,
    ws::ws_handler,
};

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(handlers::post_chat, handlers::health),
    components(
        schemas(ChatRequest, ChatExchange, Acknowledgement, Reply, HealthResponse, ErrorResponse)
    ),
    tags(
        (name = "Fitness Planner API", description = "Chat transport for the fitness goal planner agent")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .route("/chat", post(handlers::post_chat))
        .route("/health", get(handlers::health))
        .route("/ws", get(ws_handler))
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}

//! Axum Handlers for the REST API
//!
//! The HTTP face of the chat transport. It uses `utoipa` doc comments to
//! generate OpenAPI documentation.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use fitplan_core::{
    CollectingOutbox, Envelope, SessionKey,
    chat::{ChatMessage, Inbound},
};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    models::{ChatExchange, ChatRequest, ErrorResponse, HealthResponse},
    state::AppState,
};

pub enum ApiError {
    BadRequest(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::InternalServerError(err.into())
    }
}

/// Send one chat message to the planner and collect everything it emits.
#[utoipa::path(
    post,
    path = "/chat",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Acknowledgement and replies for the message", body = ChatExchange),
        (status = 400, description = "Missing sender or text", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn post_chat(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatExchange>, ApiError> {
    let sender = payload.sender.trim();
    if sender.is_empty() {
        return Err(ApiError::BadRequest("sender is required".to_string()));
    }

    let mut message = ChatMessage::text(payload.text);
    message.msg_id = payload.msg_id.unwrap_or_else(Uuid::new_v4);

    let session = SessionKey::new(sender, payload.session_id);
    let envelope = Envelope::from_chat(session, sender, &message, payload.ack_required)
        .filter(|envelope| matches!(envelope.body, Inbound::Text(_)))
        .ok_or_else(|| ApiError::BadRequest("text is required".to_string()))?;

    info!(session = %envelope.session, "Received chat message over HTTP");
    let outbox = CollectingOutbox::new();
    state.manager.handle_message(envelope, &outbox).await;

    let exchange = outbox
        .take()
        .into_iter()
        .map(|(_, outbound, _)| outbound)
        .collect();
    Ok(Json(exchange))
}

/// Report liveness, the oracle model, and the number of sessions held in memory.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse)
    )
)]
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        model: state.config.oracle_model.clone(),
        sessions: state.manager.store().len().await,
    })
}

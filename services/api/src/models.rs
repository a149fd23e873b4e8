//! REST API Models
//!
//! Request and response bodies for the HTTP chat endpoint, annotated for
//! OpenAPI generation with `utoipa`.

use chrono::{DateTime, Utc};
use fitplan_core::{Outbound, chat::ChatMessage};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

fn default_ack_required() -> bool {
    true
}

#[derive(Deserialize, ToSchema, Debug)]
pub struct ChatRequest {
    /// Address of the sending agent or user.
    #[schema(example = "agent1qexampleaddress")]
    pub sender: String,
    /// Optional conversation identifier; the sender address alone keys the session otherwise.
    pub session_id: Option<String>,
    /// Identifier of the inbound message, echoed in the acknowledgement.
    pub msg_id: Option<Uuid>,
    #[schema(example = "I'm 32, mostly sedentary, and want to lose 6kg.")]
    pub text: String,
    #[serde(default = "default_ack_required")]
    pub ack_required: bool,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct Acknowledgement {
    #[schema(value_type = String, format = Uuid)]
    pub acknowledged_msg_id: Uuid,
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct Reply {
    #[schema(value_type = String, format = Uuid)]
    pub msg_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub text: String,
    pub end_session: bool,
}

impl From<ChatMessage> for Reply {
    fn from(msg: ChatMessage) -> Self {
        Self {
            msg_id: msg.msg_id,
            timestamp: msg.timestamp,
            text: msg.first_text().unwrap_or_default().to_string(),
            end_session: msg.ends_session(),
        }
    }
}

/// Everything the agent emitted while handling one request, in order.
#[derive(Serialize, Deserialize, ToSchema, Debug, Default)]
pub struct ChatExchange {
    pub acknowledgement: Option<Acknowledgement>,
    pub replies: Vec<Reply>,
}

impl FromIterator<Outbound> for ChatExchange {
    fn from_iter<I: IntoIterator<Item = Outbound>>(iter: I) -> Self {
        let mut exchange = ChatExchange::default();
        for outbound in iter {
            match outbound {
                Outbound::Ack(ack) => {
                    exchange.acknowledgement = Some(Acknowledgement {
                        acknowledged_msg_id: ack.acknowledged_msg_id,
                        timestamp: ack.timestamp,
                    })
                }
                Outbound::Reply(msg) => exchange.replies.push(msg.into()),
            }
        }
        exchange
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct HealthResponse {
    #[schema(example = "ok")]
    pub status: String,
    /// Model the planning oracle is asked for.
    pub model: String,
    pub sessions: usize,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
}

//! Manages the WebSocket connection lifecycle for a chat session.

use super::protocol::{ClientMessage, ServerMessage};
use crate::state::AppState;
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use fitplan_core::{Envelope, Outbound, Outbox, SessionKey, prompt};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use std::sync::Arc;
use tokio::sync::{
    Mutex,
    mpsc::{self, error::TrySendError},
};
use tracing::{Instrument, error, info, instrument, warn};

/// Axum handler to upgrade an HTTP connection to a WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Delivers agent output as server frames on one connection.
struct WsOutbox {
    socket_tx: Mutex<SplitSink<WebSocket, Message>>,
}

impl WsOutbox {
    async fn send(&self, msg: ServerMessage) -> Result<()> {
        send_msg(&mut *self.socket_tx.lock().await, msg).await
    }
}

#[async_trait]
impl Outbox for WsOutbox {
    async fn deliver(&self, _recipient: &str, outbound: Outbound) -> Result<()> {
        let frame = match outbound {
            Outbound::Ack(acknowledgement) => ServerMessage::Ack { acknowledgement },
            Outbound::Reply(message) => ServerMessage::Reply { message },
        };
        self.send(frame).await
    }
}

/// Main handler for an individual WebSocket connection.
///
/// Performs the `init` handshake that binds the connection to a sender and
/// session, then runs the chat loop.
#[instrument(name = "ws_session", skip_all, fields(connection, session))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let temp_id: u32 = rand::random();
    tracing::Span::current().record("connection", temp_id);
    info!("New WebSocket connection. Awaiting initialization...");

    let (socket_tx, mut socket_rx) = socket.split();
    let outbox = Arc::new(WsOutbox {
        socket_tx: Mutex::new(socket_tx),
    });

    let handshake = match socket_rx.next().await {
        Some(Ok(Message::Text(text))) => parse_init(&text),
        Some(Ok(_)) => Err(anyhow!("First message was not a text `init` message.")),
        _ => {
            info!("Client disconnected before sending init message.");
            return;
        }
    };

    let (sender, session) = match handshake {
        Ok(bound) => bound,
        Err(e) => {
            error!("Session initialization failed: {:?}", e);
            let _ = outbox
                .send(ServerMessage::Error {
                    message: e.to_string(),
                })
                .await;
            return;
        }
    };
    tracing::Span::current().record("session", session.to_string().as_str());

    if outbox
        .send(ServerMessage::Initialized {
            session: session.to_string(),
        })
        .await
        .is_err()
    {
        error!("Failed to send Initialized message to client.");
        return;
    }

    if let Err(e) = run_chat_session(state, outbox, socket_rx, sender, session).await {
        error!(error = ?e, "Chat session terminated with error.");
    }
    info!("Chat session finished.");
}

/// Room for one more turn on a connection's work queue.
enum TurnSlot<'a> {
    Ready(mpsc::Permit<'a, Envelope>),
    Busy,
    Closed,
}

/// Claims a queue slot without waiting, so a flooded queue never stalls the
/// read loop.
fn reserve_turn(work_tx: &mpsc::Sender<Envelope>) -> TurnSlot<'_> {
    match work_tx.try_reserve() {
        Ok(permit) => TurnSlot::Ready(permit),
        Err(TrySendError::Full(())) => TurnSlot::Busy,
        Err(TrySendError::Closed(())) => TurnSlot::Closed,
    }
}

/// Parses the `init` frame into the sender address and its session key.
fn parse_init(init_text: &str) -> Result<(String, SessionKey)> {
    match serde_json::from_str::<ClientMessage>(init_text)? {
        ClientMessage::Init { sender, session_id } => {
            let sender = sender.trim().to_string();
            if sender.is_empty() {
                return Err(anyhow!("`sender` is required for `init`"));
            }
            let session = SessionKey::new(sender.clone(), session_id);
            Ok((sender, session))
        }
        _ => Err(anyhow!("First message must be `init`")),
    }
}

/// The main event loop for an initialized connection.
///
/// Acknowledgements are sent from the read loop as soon as a frame arrives;
/// processing is queued to a worker that handles this connection's messages
/// one at a time, in arrival order. When the queue is full the message is
/// rejected with an error frame and is neither acknowledged nor recorded.
async fn run_chat_session(
    state: Arc<AppState>,
    outbox: Arc<WsOutbox>,
    mut socket_rx: SplitStream<WebSocket>,
    sender: String,
    session: SessionKey,
) -> Result<()> {
    let (work_tx, mut work_rx) = mpsc::channel::<Envelope>(32);
    let worker = {
        let manager = state.manager.clone();
        let outbox = outbox.clone();
        tokio::spawn(
            async move {
                while let Some(envelope) = work_rx.recv().await {
                    manager.process(envelope, &*outbox).await;
                }
            }
            .in_current_span(),
        )
    };

    while let Some(msg_result) = socket_rx.next().await {
        match msg_result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(ClientMessage::Chat {
                    message,
                    ack_required,
                }) => match Envelope::from_chat(session.clone(), &sender, &message, ack_required) {
                    Some(envelope) => match reserve_turn(&work_tx) {
                        TurnSlot::Ready(permit) => {
                            state.manager.acknowledge(&envelope, &*outbox).await;
                            permit.send(envelope);
                        }
                        TurnSlot::Busy => {
                            warn!(msg_id = %envelope.msg_id, "Work queue full; rejecting message");
                            outbox
                                .send(ServerMessage::Error {
                                    message: prompt::BUSY_MESSAGE.to_string(),
                                })
                                .await?;
                        }
                        TurnSlot::Closed => {
                            error!("Chat worker stopped; closing connection.");
                            break;
                        }
                    },
                    None => {
                        warn!(msg_id = %message.msg_id, "Rejected chat message without text");
                        outbox
                            .send(ServerMessage::Error {
                                message: prompt::NOT_UNDERSTOOD_MESSAGE.to_string(),
                            })
                            .await?;
                    }
                },
                Ok(ClientMessage::Init { .. }) => warn!("Ignoring repeated init message."),
                Err(e) => {
                    warn!(error = %e, "Ignoring unparseable frame.");
                    outbox
                        .send(ServerMessage::Error {
                            message: prompt::NOT_UNDERSTOOD_MESSAGE.to_string(),
                        })
                        .await?;
                }
            },
            Ok(Message::Binary(_)) => warn!("Ignoring binary frame."),
            Ok(Message::Close(_)) => {
                info!("Client sent close frame. Shutting down session.");
                break;
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Err(e) => {
                error!("Error receiving from client WebSocket: {:?}", e);
                break;
            }
        }
    }

    // Let queued turns finish so their history is committed.
    drop(work_tx);
    worker.await?;
    info!("WebSocket connection closed.");
    Ok(())
}

/// A helper function to serialize and send a `ServerMessage` to the client.
pub(crate) async fn send_msg(
    socket_tx: &mut SplitSink<WebSocket, Message>,
    msg: ServerMessage,
) -> Result<()> {
    let serialized = serde_json::to_string(&msg)?;
    socket_tx.send(Message::Text(serialized.into())).await?;
    Ok(())
}

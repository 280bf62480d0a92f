//! WebSocket handler for real-time workflow event streaming
//!
//! A connection starts subscribed to nothing; the client opts in with
//! `subscribe`/`subscribe_all` messages, and may ask for everything it
//! missed with `backfill_request`. Delivery rides `EventBus::socket_receiver`
//! (already fanning out every persisted `WorkflowEvent`); backfill reads the
//! same events back out of storage via `EventRepository::events_after`, so a
//! reconnecting client never has to guess what it missed.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::api::routes::AppState;
use crate::db::repositories::EventRepository;
use crate::events::model::WorkflowEvent;

/// Messages a client may send over the socket.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Stream events for one workflow.
    Subscribe { workflow_id: String },
    /// Stop streaming events for one workflow.
    Unsubscribe { workflow_id: String },
    /// Stream events for every workflow.
    SubscribeAll,
    /// Liveness check; answered with `Pong`.
    Ping,
    /// Replay everything recorded for a workflow since `since_sequence`
    /// (0 for the full history).
    BackfillRequest {
        workflow_id: String,
        #[serde(default)]
        since_sequence: i64,
    },
}

/// Messages the server may send over the socket.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Event {
        event: WorkflowEvent,
    },
    Pong,
    BackfillComplete {
        workflow_id: String,
        count: usize,
    },
    /// The requested range has already been purged by the retention sweep.
    BackfillExpired {
        workflow_id: String,
    },
    Error {
        message: String,
    },
}

/// Legacy, pre-upgrade event shape kept only for [`BroadcastState`]'s
/// existing callers; real-time delivery now flows through
/// [`crate::events::bus::EventBus`] instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WsEvent {
    #[serde(rename = "connected")]
    Connected { client_id: String },
    #[serde(rename = "workflow_updated")]
    WorkflowUpdated { workflow_id: String, status: String },
    #[serde(rename = "error")]
    Error { message: String },
}

/// Broadcast state predating the workflow event bus, retained for any
/// non-workflow notifications a future endpoint might want to fan out.
#[derive(Clone)]
pub struct BroadcastState {
    pub tx: broadcast::Sender<WsEvent>,
}

impl BroadcastState {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(100);
        Self { tx }
    }

    pub async fn broadcast(&self, event: WsEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for BroadcastState {
    fn default() -> Self {
        Self::new()
    }
}

/// `GET /api/ws` — upgrades to a WebSocket and hands the connection to
/// [`handle_socket`].
pub async fn ws_handler(State(app_state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state))
}

async fn handle_socket(socket: WebSocket, app_state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let events = app_state.orchestrator.events();
    let mut socket_rx = events.socket_receiver();
    let mut subscribed_all = false;
    let mut subscribed: std::collections::HashSet<String> = std::collections::HashSet::new();

    loop {
        tokio::select! {
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if !handle_client_message(&text, &mut sender, &mut subscribed, &mut subscribed_all, app_state.db.pool()).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
            event = socket_rx.recv() => {
                match event {
                    Ok(event) if subscribed_all || subscribed.contains(&event.workflow_id) => {
                        if send_json(&mut sender, &ServerMessage::Event { event }).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }
}

/// Returns `false` when the connection should close.
async fn handle_client_message(
    text: &str,
    sender: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    subscribed: &mut std::collections::HashSet<String>,
    subscribed_all: &mut bool,
    pool: &crate::db::DatabasePool,
) -> bool {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            return send_json(sender, &ServerMessage::Error { message: format!("malformed message: {e}") })
                .await
                .is_ok();
        }
    };

    match message {
        ClientMessage::Subscribe { workflow_id } => {
            subscribed.insert(workflow_id);
            true
        }
        ClientMessage::Unsubscribe { workflow_id } => {
            subscribed.remove(&workflow_id);
            true
        }
        ClientMessage::SubscribeAll => {
            *subscribed_all = true;
            true
        }
        ClientMessage::Ping => send_json(sender, &ServerMessage::Pong).await.is_ok(),
        ClientMessage::BackfillRequest { workflow_id, since_sequence } => {
            match EventRepository::events_after(pool, &workflow_id, since_sequence).await {
                Ok(backlog) => {
                    let count = backlog.len();
                    for event in backlog {
                        if send_json(sender, &ServerMessage::Event { event }).await.is_err() {
                            return false;
                        }
                    }
                    send_json(sender, &ServerMessage::BackfillComplete { workflow_id, count })
                        .await
                        .is_ok()
                }
                Err(e) => {
                    tracing::warn!("backfill query failed for workflow {workflow_id}: {e}");
                    send_json(sender, &ServerMessage::BackfillExpired { workflow_id }).await.is_ok()
                }
            }
        }
    }
}

async fn send_json(
    sender: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    message: &ServerMessage,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(message).unwrap_or_else(|_| "{\"type\":\"error\"}".to_string());
    sender.send(Message::Text(text)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ws_event_serialization() {
        let event = WsEvent::Connected { client_id: "c1".to_string() };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("connected"));
    }

    #[test]
    fn test_broadcast_state_creation() {
        let state = BroadcastState::new();
        assert_eq!(state.tx.receiver_count(), 0);
    }

    #[test]
    fn test_client_message_subscribe_roundtrip() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"subscribe","workflow_id":"wf-1"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Subscribe { workflow_id } if workflow_id == "wf-1"));
    }

    #[test]
    fn test_client_message_backfill_defaults_since_sequence() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"backfill_request","workflow_id":"wf-1"}"#).unwrap();
        match msg {
            ClientMessage::BackfillRequest { since_sequence, .. } => assert_eq!(since_sequence, 0),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn test_server_message_event_serializes_tag() {
        let msg = ServerMessage::Pong;
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"type":"pong"}"#);
    }
}

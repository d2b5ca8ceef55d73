//! WebSocket sub-protocol (§4.6, §9): a `DashMap`-backed connection table
//! (fixing the original's race-prone map) and a per-connection writer task
//! fed by an mpsc channel, so concurrent responders never interleave writes
//! to the same socket.

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::gateway::{CallerContext, Gateway};
use crate::types::{reserved, Map, SlotResponse};

struct WsHandle {
    sender: mpsc::UnboundedSender<Message>,
}

/// The connector's live connection table, indexed by the `WsID` allocated
/// on upgrade. Safe to share across the read loops of every open connection.
#[derive(Default)]
pub struct WsTable {
    connections: DashMap<Uuid, WsHandle>,
}

impl WsTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send(&self, id: Uuid, msg: Message) -> bool {
        match self.connections.get(&id) {
            Some(handle) => handle.sender.send(msg).is_ok(),
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

/// Drives one upgraded connection end to end: handshake (`INITWS=true`),
/// then a read loop dispatching each JSON text frame to `gateway.request_api`.
pub async fn handle_socket(
    socket: WebSocket,
    gateway: Arc<Gateway>,
    table: Arc<WsTable>,
    version: String,
    api: String,
    address_field: String,
    client_addr: String,
) {
    let (mut sink, mut stream) = socket.split();
    let id = Uuid::new_v4();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(msg).await.is_err() {
                break;
            }
        }
    });

    let caller = CallerContext { client_ip: client_addr.clone(), ..CallerContext::default() };

    let mut handshake = Map::new();
    handshake.insert(reserved::WS_ID.to_string(), Value::String(id.to_string()));
    handshake.insert(reserved::INIT_WS.to_string(), Value::Bool(true));
    handshake.insert(address_field.clone(), Value::String(client_addr.clone()));

    let handshake_resp = gateway.request_api(&version, &api, handshake, &caller).await;
    if let Some(err) = handshake_resp.error {
        let body = serde_json::to_string(&SlotResponse::err(err)).unwrap_or_default();
        let _ = tx.send(Message::Text(body.into()));
        let _ = tx.send(Message::Close(None));
        drop(tx);
        let _ = writer.await;
        return;
    }

    table.connections.insert(id, WsHandle { sender: tx.clone() });

    while let Some(frame) = stream.next().await {
        let msg = match frame {
            Ok(msg) => msg,
            Err(e) => {
                tracing::error!(ws_id = %id, error = %e, "websocket read error");
                break;
            }
        };

        match msg {
            Message::Text(text) => {
                let parsed: Result<Value, _> = serde_json::from_str(&text);
                let mut params = match parsed {
                    Ok(Value::Object(map)) => map,
                    _ => {
                        let body = serde_json::to_string(&SlotResponse::err(
                            crate::error::sentinel::caller_invalid_request("malformed websocket frame"),
                        ))
                        .unwrap_or_default();
                        let _ = tx.send(Message::Text(body.into()));
                        continue;
                    }
                };
                params.insert(reserved::WS_ID.to_string(), Value::String(id.to_string()));
                params.insert(reserved::INIT_WS.to_string(), Value::Bool(false));
                params.insert(address_field.clone(), Value::String(client_addr.clone()));

                let resp = gateway.request_api(&version, &api, params, &caller).await;
                let body = serde_json::to_string(&resp).unwrap_or_default();
                if tx.send(Message::Text(body.into())).is_err() {
                    break;
                }
            }
            Message::Close(frame) => {
                log_close(&id, frame.as_ref());
                break;
            }
            _ => {}
        }
    }

    table.connections.remove(&id);
    drop(tx);
    let _ = writer.await;
}

fn log_close(id: &Uuid, frame: Option<&CloseFrame>) {
    let code = frame.map(|f| f.code).unwrap_or(1000);
    if code == 1000 {
        tracing::debug!(ws_id = %id, "websocket closed normally");
    } else {
        tracing::error!(ws_id = %id, code, "websocket closed unexpectedly");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_table_reports_no_connections() {
        let table = WsTable::new();
        assert!(table.is_empty());
        assert_eq!(table.len(), 0);
        assert!(!table.send(Uuid::new_v4(), Message::Text("hi".into())));
    }
}

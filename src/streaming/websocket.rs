// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! WebSocket server for real-time streaming
//!
//! Every socket is a broadcaster consumer. Clients may send
//! `{"type": "pong"}`, `{"type": "ping"}` or `{"type": "set_rate", "rate_hz": n}`.

use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, RwLock};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use super::{ConsumerId, StreamBroadcaster, StreamMessage};

/// WebSocket server
pub struct WebSocketServer {
    port: u16,
    max_clients: usize,
    broadcaster: Arc<StreamBroadcaster>,
    clients: Arc<RwLock<HashMap<ConsumerId, SocketAddr>>>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientCommand {
    Ping,
    Pong,
    SetRate { rate_hz: f64 },
}

impl WebSocketServer {
    pub fn new(port: u16, max_clients: usize, broadcaster: Arc<StreamBroadcaster>) -> Self {
        Self {
            port,
            max_clients,
            broadcaster,
            clients: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Bind and accept connections in the background until shutdown.
    /// Returns the bound address, which matters when the port is 0.
    pub async fn start(&self, mut shutdown: broadcast::Receiver<()>) -> Result<SocketAddr> {
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr).await?;
        let local_addr = listener.local_addr()?;

        info!("WebSocket server listening on ws://{}", local_addr);

        let clients = self.clients.clone();
        let max_clients = self.max_clients;
        let broadcaster = self.broadcaster.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    accept_result = listener.accept() => {
                        match accept_result {
                            Ok((stream, addr)) => {
                                let client_count = clients.read().await.len();
                                if client_count >= max_clients {
                                    warn!("Max clients reached, rejecting connection from {}", addr);
                                    continue;
                                }

                                let clients = clients.clone();
                                let broadcaster = broadcaster.clone();
                                let shutdown = shutdown.resubscribe();
                                tokio::spawn(handle_connection(stream, addr, clients, broadcaster, shutdown));
                            }
                            Err(e) => {
                                error!("Accept error: {}", e);
                            }
                        }
                    }
                    _ = shutdown.recv() => {
                        info!("WebSocket server shutting down");
                        break;
                    }
                }
            }
        });

        Ok(local_addr)
    }

    pub async fn get_client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn get_client_addrs(&self) -> Vec<SocketAddr> {
        self.clients.read().await.values().copied().collect()
    }
}

fn encode(message: &StreamMessage) -> Option<Message> {
    match serde_json::to_string(message) {
        Ok(json) => Some(Message::Text(json)),
        Err(e) => {
            error!("Failed to encode {} message: {}", message.kind(), e);
            None
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    clients: Arc<RwLock<HashMap<ConsumerId, SocketAddr>>>,
    broadcaster: Arc<StreamBroadcaster>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            error!("WebSocket handshake failed for {}: {}", addr, e);
            return;
        }
    };

    let (client_id, mut outbound) = broadcaster.connect().into_parts();
    info!("New WebSocket connection from {} (id: {})", addr, client_id);
    clients.write().await.insert(client_id, addr);

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    if let Some(welcome) = encode(&broadcaster.status_message(Some(client_id))) {
        if let Err(e) = ws_sender.send(welcome).await {
            warn!("Failed to send welcome: {}", e);
        }
    }

    loop {
        tokio::select! {
            // Incoming messages from client
            msg = ws_receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        debug!("Received from {}: {}", addr, text);
                        broadcaster.record_activity(client_id);

                        let reply = match serde_json::from_str::<ClientCommand>(&text) {
                            Ok(ClientCommand::Pong) => None,
                            Ok(ClientCommand::Ping) => Some(broadcaster.status_message(Some(client_id))),
                            Ok(ClientCommand::SetRate { rate_hz }) => match broadcaster.set_rate(rate_hz) {
                                Ok(()) => Some(broadcaster.status_message(Some(client_id))),
                                Err(e) => Some(StreamMessage::error(e.to_string(), "invalid_rate")),
                            },
                            Err(e) => Some(StreamMessage::error(e.to_string(), "invalid_command")),
                        };
                        if let Some(message) = reply.as_ref().and_then(encode) {
                            let _ = ws_sender.send(message).await;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        broadcaster.record_activity(client_id);
                        let _ = ws_sender.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Pong(_))) => {
                        broadcaster.record_activity(client_id);
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("WebSocket closed by client {}", addr);
                        break;
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket error from {}: {}", addr, e);
                        break;
                    }
                    None => break,
                    _ => {}
                }
            }

            // Outgoing broadcasts
            msg = outbound.recv() => {
                let Some(message) = msg else {
                    // Removed by the broadcaster: slow or unresponsive
                    let _ = ws_sender.send(Message::Close(None)).await;
                    break;
                };
                let Some(frame) = encode(&message) else {
                    continue;
                };
                if let Err(e) = ws_sender.send(frame).await {
                    warn!("Failed to send to {}: {}", addr, e);
                    break;
                }
            }

            _ = shutdown.recv() => {
                let _ = ws_sender.send(Message::Close(None)).await;
                break;
            }
        }
    }

    clients.write().await.remove(&client_id);
    let _ = broadcaster.disconnect(client_id);

    info!("WebSocket client {} disconnected", addr);
}

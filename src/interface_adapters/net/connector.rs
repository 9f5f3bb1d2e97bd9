// Peer-side transport: joins a relay session over WebSocket and exposes it as a
// channel pair, so `PeerSession` never sees the socket.

use crate::domain::{SessionError, validate_session_name};
use crate::interface_adapters::protocol::{ClientFrame, ServerFrame};
use crate::use_cases::{Delivery, JoinAccepted, PeerLink, PeerMessage, SessionConnector};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WELCOME_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct WsConnector {
    // Relay base url, e.g. `ws://127.0.0.1:3001`.
    base_url: String,
    channel_capacity: usize,
}

impl WsConnector {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            channel_capacity: 1024,
        }
    }

    fn session_url(&self, session_name: &str) -> Result<Url, SessionError> {
        let base = self.base_url.trim_end_matches('/');
        let mut url = Url::parse(&format!("{base}/ws"))
            .map_err(|e| SessionError::StartFailed(format!("invalid relay url: {e}")))?;
        url.query_pairs_mut().append_pair("session", session_name);
        Ok(url)
    }
}

#[async_trait]
impl SessionConnector for WsConnector {
    async fn join(&self, session_name: &str) -> Result<PeerLink, SessionError> {
        let name = validate_session_name(session_name)?;
        let url = self.session_url(&name)?;

        let (mut socket, _) = connect_async(url.as_str())
            .await
            .map_err(|e| SessionError::StartFailed(format!("connect failed: {e}")))?;

        let welcome = match timeout(WELCOME_TIMEOUT, read_welcome(&mut socket)).await {
            Ok(result) => result?,
            Err(_) => {
                let _ = socket.close(None).await;
                return Err(SessionError::StartFailed("welcome timeout".to_string()));
            }
        };
        info!(session = %name, peer = %welcome.peer, "joined relay");

        let (outbound_tx, outbound_rx) = mpsc::channel(self.channel_capacity);
        let (delivery_tx, delivery_rx) = mpsc::channel(self.channel_capacity);
        tokio::spawn(pump_socket(socket, outbound_rx, delivery_tx));

        Ok(PeerLink {
            welcome,
            outbound: outbound_tx,
            inbound: delivery_rx,
        })
    }
}

async fn read_welcome(socket: &mut Socket) -> Result<JoinAccepted, SessionError> {
    loop {
        let Some(incoming) = socket.next().await else {
            return Err(SessionError::StartFailed("closed before welcome".to_string()));
        };
        let message =
            incoming.map_err(|e| SessionError::StartFailed(format!("websocket error: {e}")))?;

        match message {
            Message::Text(text) => {
                return match serde_json::from_str::<ServerFrame>(text.as_str()) {
                    Ok(ServerFrame::Welcome(welcome)) => Ok(welcome),
                    Ok(ServerFrame::Rejected { reason }) => Err(reason.into()),
                    Ok(ServerFrame::Delivery(_)) => Err(SessionError::StartFailed(
                        "delivery before welcome".to_string(),
                    )),
                    Err(e) => Err(SessionError::StartFailed(format!("invalid welcome: {e}"))),
                };
            }
            Message::Close(_) => {
                return Err(SessionError::StartFailed("closed before welcome".to_string()));
            }
            _ => {}
        }
    }
}

// Owns the socket for the lifetime of the link. Dropping the outbound sender
// closes the socket; a closed socket drops the delivery sender.
async fn pump_socket(
    mut socket: Socket,
    mut outbound_rx: mpsc::Receiver<PeerMessage>,
    delivery_tx: mpsc::Sender<Delivery>,
) {
    loop {
        tokio::select! {
            outbound = outbound_rx.recv() => {
                let Some(msg) = outbound else {
                    let _ = socket.close(None).await;
                    break;
                };
                let txt = match serde_json::to_string(&ClientFrame::Message(msg)) {
                    Ok(txt) => txt,
                    Err(e) => {
                        warn!(error = %e, "failed to serialize peer message");
                        continue;
                    }
                };
                if let Err(e) = socket.send(Message::text(txt)).await {
                    warn!(error = %e, "failed to send to relay");
                    break;
                }
            }

            incoming = socket.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ServerFrame>(text.as_str()) {
                            Ok(ServerFrame::Delivery(delivery)) => {
                                if delivery_tx.send(delivery).await.is_err() {
                                    let _ = socket.close(None).await;
                                    break;
                                }
                            }
                            Ok(other) => debug!(frame = ?other, "unexpected frame after welcome"),
                            Err(e) => warn!(error = %e, "failed to parse relay frame"),
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        info!(?frame, "relay closed connection");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "relay socket error");
                        break;
                    }
                    None => break,
                }
            }
        }
    }
}

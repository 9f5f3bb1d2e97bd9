use crate::domain::validate_session_name;
use crate::interface_adapters::protocol::{ClientFrame, RejectReason, ServerFrame};
use crate::interface_adapters::state::AppState;
use crate::interface_adapters::utils::rng::conn_id;
use crate::use_cases::{Delivery, PeerLink, PeerMessage, SessionHub};

use axum::{
    Error,
    extract::{
        Query, State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code},
    },
    response::IntoResponse,
};
use futures::SinkExt;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::mpsc;
use tracing::{Instrument, debug, info, info_span, warn};

#[derive(Debug)]
enum NetError {
    // Categorizes connection lifecycle failures so callers can decide policy.
    #[allow(dead_code)]
    Ws(axum::Error),
    #[allow(dead_code)]
    Serialization(serde_json::Error),
    SessionClosed,
}

impl From<axum::Error> for NetError {
    fn from(e: axum::Error) -> Self {
        NetError::Ws(e)
    }
}

#[derive(Debug, serde::Deserialize)]
pub struct SessionQuery {
    // Session name typed by the player; validated after the upgrade.
    #[serde(default)]
    session: String,
}

const LOG_THROTTLE: Duration = Duration::from_secs(2);
const MAX_INVALID_JSON: u32 = 10;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<SessionQuery>,
) -> impl IntoResponse {
    let hub = state.hub.clone();
    ws.on_upgrade(move |socket| {
        // Separate connection id for correlating logs before a peer ref exists.
        let span = info_span!(
            "conn",
            conn_id = conn_id(),
            session = %query.session,
            peer = tracing::field::Empty
        );
        handle_socket(socket, hub, query.session).instrument(span)
    })
}

async fn handle_socket(mut socket: WebSocket, hub: Arc<SessionHub>, raw_name: String) {
    let name = match validate_session_name(&raw_name) {
        Ok(name) => name,
        Err(err) => {
            info!(error = %err, "join rejected");
            let _ = reject(&mut socket, RejectReason::InvalidSessionName).await;
            return;
        }
    };

    let link = match hub.join_session(&name).await {
        Ok(link) => link,
        Err(err) => {
            info!(error = %err, "join rejected");
            let _ = reject(&mut socket, RejectReason::from(&err)).await;
            return;
        }
    };

    let peer = link.welcome.peer;
    tracing::Span::current().record("peer", tracing::field::display(peer));

    let mut ctx = ConnCtx::new(link);
    let welcome = ServerFrame::Welcome(ctx.link.welcome.clone());
    if let Err(err) = send_frame(&mut socket, &welcome).await {
        warn!(error = ?err, "failed to send welcome");
        return;
    }
    info!(peers = ctx.link.welcome.peers.len(), "peer connected");

    if let Err(e) = run_peer_loop(&mut socket, &mut ctx).await {
        warn!(error = ?e, "peer loop exited with error");
    }

    info!(
        msgs_in = ctx.msgs_in,
        msgs_out = ctx.msgs_out,
        bytes_in = ctx.bytes_in,
        bytes_out = ctx.bytes_out,
        invalid_json = ctx.invalid_json,
        "peer disconnected"
    );
    // Dropping the link tells the relay this peer left.
}

async fn reject(socket: &mut WebSocket, reason: RejectReason) -> Result<(), NetError> {
    send_frame(socket, &ServerFrame::Rejected { reason }).await?;
    send_close_with_reason(socket, close_code::POLICY, reason.as_str()).await
}

async fn send_frame(socket: &mut WebSocket, frame: &ServerFrame) -> Result<usize, NetError> {
    let txt = serde_json::to_string(frame).map_err(NetError::Serialization)?;
    let bytes = txt.len();
    socket
        .send(Message::Text(txt.into()))
        .await
        .map_err(NetError::Ws)?;
    Ok(bytes)
}

async fn send_close_with_reason(
    socket: &mut WebSocket,
    code: u16,
    reason: &'static str,
) -> Result<(), NetError> {
    socket
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })))
        .await
        .map_err(NetError::Ws)?;
    socket.close().await.map_err(NetError::Ws)
}

struct ConnCtx {
    link: PeerLink,

    msgs_in: u64,
    msgs_out: u64,
    bytes_in: u64,
    bytes_out: u64,

    invalid_json: u32,

    last_queue_full_log: Option<Instant>,
    last_invalid_log: Option<Instant>,

    close_frame: Option<CloseFrame>,
}

impl ConnCtx {
    fn new(link: PeerLink) -> Self {
        Self {
            link,
            msgs_in: 0,
            msgs_out: 0,
            bytes_in: 0,
            bytes_out: 0,
            invalid_json: 0,
            last_queue_full_log: None,
            last_invalid_log: None,
            close_frame: None,
        }
    }
}

enum LoopControl {
    Continue,
    Disconnect,
}

fn should_log(last: &mut Option<Instant>) -> bool {
    if last.is_none_or(|at| at.elapsed() >= LOG_THROTTLE) {
        *last = Some(Instant::now());
        true
    } else {
        false
    }
}

async fn run_peer_loop(socket: &mut WebSocket, ctx: &mut ConnCtx) -> Result<(), NetError> {
    let mut fatal: Option<NetError> = None;

    loop {
        let disconnect: bool = tokio::select! {
            incoming = socket.recv() => {
                match handle_incoming_ws(incoming, ctx) {
                    LoopControl::Continue => false,
                    LoopControl::Disconnect => true,
                }
            }

            delivery = ctx.link.inbound.recv() => {
                match delivery {
                    Some(delivery) => match forward_delivery(delivery, socket, ctx).await {
                        LoopControl::Continue => false,
                        LoopControl::Disconnect => true,
                    },
                    None => {
                        // The relay dropped us (queue overflow) or shut down.
                        ctx.close_frame = Some(CloseFrame {
                            code: close_code::AWAY,
                            reason: "session closed".into(),
                        });
                        fatal = Some(NetError::SessionClosed);
                        true
                    }
                }
            }
        };

        if disconnect {
            if let Some(frame) = ctx.close_frame.take() {
                let _ = socket.send(Message::Close(Some(frame))).await;
            }
            if let Err(err) = socket.close().await.map_err(NetError::Ws) {
                debug!(error = ?err, "socket close error");
            }
            break;
        }
    }

    match fatal {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn handle_incoming_ws(incoming: Option<Result<Message, Error>>, ctx: &mut ConnCtx) -> LoopControl {
    match incoming {
        Some(Ok(msg)) => match msg {
            Message::Text(text) => {
                ctx.msgs_in += 1;
                ctx.bytes_in += text.len() as u64;

                match serde_json::from_str::<ClientFrame>(&text) {
                    Ok(ClientFrame::Message(msg)) => forward_peer_message(msg, ctx),
                    Err(parse_err) => {
                        ctx.invalid_json += 1;
                        if should_log(&mut ctx.last_invalid_log) {
                            warn!(
                                bytes = text.len(),
                                error = %parse_err,
                                "failed to parse peer frame"
                            );
                        }

                        if ctx.invalid_json > MAX_INVALID_JSON {
                            ctx.close_frame = Some(CloseFrame {
                                code: close_code::POLICY,
                                reason: "too many invalid messages".into(),
                            });
                            return LoopControl::Disconnect;
                        }
                        LoopControl::Continue
                    }
                }
            }
            Message::Binary(_) => {
                ctx.close_frame = Some(CloseFrame {
                    code: close_code::UNSUPPORTED,
                    reason: "binary messages not supported".into(),
                });
                LoopControl::Disconnect
            }
            Message::Ping(_) | Message::Pong(_) => LoopControl::Continue,
            Message::Close(_) => LoopControl::Disconnect,
        },
        Some(Err(e)) => {
            warn!(error = %e, "websocket recv error");
            LoopControl::Disconnect
        }
        None => {
            info!("websocket closed");
            LoopControl::Disconnect
        }
    }
}

fn forward_peer_message(msg: PeerMessage, ctx: &mut ConnCtx) -> LoopControl {
    let droppable = matches!(msg, PeerMessage::Update { .. });
    match ctx.link.outbound.try_send(msg) {
        Ok(()) => LoopControl::Continue,
        Err(mpsc::error::TrySendError::Full(_)) if droppable => {
            if should_log(&mut ctx.last_queue_full_log) {
                warn!("relay queue full; dropping update");
            }
            LoopControl::Continue
        }
        Err(mpsc::error::TrySendError::Full(_)) => {
            ctx.close_frame = Some(CloseFrame {
                code: close_code::POLICY,
                reason: "relay queue full".into(),
            });
            LoopControl::Disconnect
        }
        Err(mpsc::error::TrySendError::Closed(_)) => LoopControl::Disconnect,
    }
}

async fn forward_delivery(
    delivery: Delivery,
    socket: &mut WebSocket,
    ctx: &mut ConnCtx,
) -> LoopControl {
    match send_frame(socket, &ServerFrame::Delivery(delivery)).await {
        Ok(bytes) => {
            ctx.msgs_out += 1;
            ctx.bytes_out += bytes as u64;
            LoopControl::Continue
        }
        Err(err) => {
            // Disconnect follows immediately.
            warn!(error = ?err, "failed to send delivery");
            LoopControl::Disconnect
        }
    }
}

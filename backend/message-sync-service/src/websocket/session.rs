//! One authenticated websocket connection.
//!
//! The inbound loop parses client frames and dispatches them; the outbound loop
//! drains the connection's queue and sends keepalive pings. Whichever finishes
//! first ends the session.

use crate::error::AppError;
use crate::state::AppState;
use crate::websocket::message_types::{ClientFrame, ServerFrame};
use crate::websocket::registry::ConnectionHandle;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, Instant};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Message, Utf8Bytes};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub async fn run_session<S>(
    ws: WebSocketStream<S>,
    state: AppState,
    user_id: Uuid,
    device_id: Option<String>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let gateway = state.config.gateway.clone();
    let (handle, channels) =
        ConnectionHandle::new(user_id, device_id.clone(), gateway.outbound_queue_capacity);
    let connection_id = handle.id;
    let replies = handle.sender();

    let outcome = state.registry.register(handle).await;
    info!(
        %user_id,
        connection = %connection_id,
        device_id = device_id.as_deref().unwrap_or("-"),
        replaced = outcome.replaced.is_some(),
        "websocket session started"
    );

    let (sink, stream) = ws.split();

    tokio::select! {
        _ = inbound_loop(stream, &state, user_id, replies, gateway.idle_timeout) => {
            debug!(%user_id, connection = %connection_id, "inbound loop finished");
        }
        _ = outbound_loop(sink, channels.outbound, channels.cancelled, gateway.heartbeat_interval) => {
            debug!(%user_id, connection = %connection_id, "outbound loop finished");
        }
    }

    state.registry.unregister(user_id, connection_id).await;
    info!(%user_id, connection = %connection_id, "websocket session closed");
}

async fn inbound_loop<S>(
    mut stream: SplitStream<WebSocketStream<S>>,
    state: &AppState,
    user_id: Uuid,
    replies: mpsc::Sender<String>,
    idle_timeout: Duration,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let message = match tokio::time::timeout(idle_timeout, stream.next()).await {
            Err(_) => {
                info!(%user_id, "connection idle, closing");
                return;
            }
            Ok(None) => return,
            Ok(Some(Err(e))) => {
                debug!(%user_id, error = %e, "websocket read failed");
                return;
            }
            Ok(Some(Ok(message))) => message,
        };

        match message {
            Message::Text(text) => {
                if let Some(reply) = handle_text(state, user_id, text.as_str()).await {
                    enqueue_reply(&replies, reply).await;
                }
            }
            Message::Binary(_) => {
                let err = AppError::BadRequest("binary frames are not supported".into());
                enqueue_reply(&replies, ServerFrame::from_error(&err, None)).await;
            }
            Message::Close(_) => return,
            // Protocol pings are answered by tungstenite; any frame resets the idle timer
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
        }
    }
}

/// Handle one client text frame, returning the reply if there is one.
pub async fn handle_text(state: &AppState, user_id: Uuid, text: &str) -> Option<ServerFrame> {
    let frame = match serde_json::from_str::<ClientFrame>(text) {
        Ok(frame) => frame,
        Err(e) => {
            debug!(%user_id, error = %e, "malformed client frame");
            let err = AppError::BadRequest(format!("malformed frame: {e}"));
            return Some(ServerFrame::from_error(&err, None));
        }
    };

    match frame {
        ClientFrame::Ping => Some(ServerFrame::Pong),
        ClientFrame::Pong => None,
        ClientFrame::MessageSend(req) => {
            let local_id = req.local_id.clone();
            match state.messages.send_message(user_id, req).await {
                Ok(sent) => Some(ServerFrame::MessageSent(sent)),
                Err(e) => {
                    warn!(%user_id, error = %e, "message.send rejected");
                    Some(ServerFrame::from_error(&e, local_id))
                }
            }
        }
    }
}

async fn enqueue_reply(replies: &mpsc::Sender<String>, frame: ServerFrame) {
    match frame.to_json() {
        // Fails only once the outbound loop is gone
        Ok(json) => {
            let _ = replies.send(json).await;
        }
        Err(e) => warn!(error = %e, "failed to encode reply frame"),
    }
}

async fn outbound_loop<S>(
    mut sink: SplitSink<WebSocketStream<S>, Message>,
    mut outbound: mpsc::Receiver<String>,
    mut cancelled: oneshot::Receiver<()>,
    heartbeat: Duration,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut ticker = interval_at(Instant::now() + heartbeat, heartbeat);

    loop {
        tokio::select! {
            _ = &mut cancelled => {
                let close = CloseFrame {
                    code: CloseCode::Away,
                    reason: Utf8Bytes::from_static("replaced by a newer connection"),
                };
                let _ = sink.send(Message::Close(Some(close))).await;
                return;
            }
            frame = outbound.recv() => {
                let Some(frame) = frame else { return };
                if let Err(e) = sink.send(Message::text(frame)).await {
                    debug!(error = %e, "websocket write failed");
                    return;
                }
            }
            _ = ticker.tick() => {
                if sink.send(Message::Ping(Default::default())).await.is_err() {
                    return;
                }
            }
        }
    }
}

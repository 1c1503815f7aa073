//! WebSocket transport for a session's event stream.

use std::time::Duration;

use axum::{
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::{IntoResponse, Response},
};
use futures::Stream;
use futures_util::{SinkExt, StreamExt, stream::SplitSink, stream::SplitStream};
use tokio::time::Instant;

use super::api::{ApiError, SharedState};
use crate::pipeline::StreamItem;

/// How often to send WebSocket Ping frames.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// How long to wait for a Pong response before considering the connection dead.
const PONG_TIMEOUT: Duration = Duration::from_secs(60);

/// `GET /api/ws/{id}`: the same frames as the SSE endpoint, one JSON text message each.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
    Path(session_id): Path<String>,
) -> Result<Response, ApiError> {
    let items = state
        .orchestrator
        .subscribe(&session_id, state.idle_keepalive)?;
    tracing::debug!(session_id = %session_id, "WebSocket subscriber attached");
    Ok(ws
        .on_upgrade(move |socket| handle_socket(socket, items))
        .into_response())
}

async fn handle_socket<S>(socket: WebSocket, items: S)
where
    S: Stream<Item = StreamItem> + Send + 'static,
{
    let (sender, receiver) = socket.split();
    run_socket_loop(sender, receiver, Box::pin(items)).await;
}

pub fn to_ws_text(item: &StreamItem) -> String {
    item.to_json().to_string()
}

/// Forward stream items until `done`, with ping/pong health checking.
///
/// If no Pong is received within [`PONG_TIMEOUT`] after a Ping is sent, the
/// connection is considered dead and the loop exits.
async fn run_socket_loop<S>(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    mut items: std::pin::Pin<Box<S>>,
) where
    S: Stream<Item = StreamItem> + Send,
{
    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    // The first tick completes immediately.
    ping_interval.tick().await;

    let mut last_pong = Instant::now();
    let mut awaiting_pong = false;

    loop {
        tokio::select! {
            _ = ping_interval.tick() => {
                if awaiting_pong && last_pong.elapsed() > PONG_TIMEOUT {
                    tracing::debug!("WebSocket pong timeout");
                    break;
                }
                if sender.send(Message::Ping(Default::default())).await.is_err() {
                    break;
                }
                awaiting_pong = true;
            }

            item = items.next() => {
                let Some(item) = item else { break };
                let done = item.is_done();
                if sender.send(Message::Text(to_ws_text(&item).into())).await.is_err() {
                    break;
                }
                if done {
                    break;
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Pong(_))) => {
                        last_pong = Instant::now();
                        awaiting_pong = false;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    // Clients have nothing to say on this socket.
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }

    let _ = sender.send(Message::Close(None)).await;
}

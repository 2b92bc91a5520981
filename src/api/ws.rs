// =============================================================================
// WebSocket Handler — per-ticker real-time feed
// =============================================================================
//
// Clients connect to `/ws/ticks/{symbol}` and receive every payload published
// for that ticker as a text frame:
//
//   {"type": "ticker.update", "payload": {...}}
//
// Each connection owns one delivery sink. The handler:
//   - Joins the ticker group on connect and leaves it on any exit path (the
//     subscription guard is dropped when the task ends).
//   - Drains the sink onto the socket.
//   - Responds to Ping frames with Pong frames and ignores client text.
//   - Sends a Close frame when the sink is closed for overflowing.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use crate::app_state::AppState;
use crate::types::normalize_symbol;

// =============================================================================
// WebSocket upgrade handler
// =============================================================================

pub async fn ticker_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
) -> impl IntoResponse {
    let symbol = normalize_symbol(&symbol);
    info!(symbol = %symbol, "WebSocket connection accepted, upgrading");
    ws.on_upgrade(move |socket| handle_ticker_connection(socket, state, symbol))
}

// =============================================================================
// Connection handler
// =============================================================================

/// Manages a single WebSocket connection lifecycle.
///
/// Runs two concurrent branches via `tokio::select!`:
///   1. **Push** — forward frames from this connection's sink.
///   2. **Recv** — process incoming client messages (Ping, Close).
async fn handle_ticker_connection(socket: WebSocket, state: Arc<AppState>, symbol: String) {
    let (mut sender, mut receiver) = socket.split();

    let subscription = state.registry().attach(&symbol, state.new_sink());
    let sink = subscription.sink().clone();
    info!(
        symbol = %subscription.symbol(),
        sink_id = %sink.id(),
        subscribers = state.registry().subscriber_count(subscription.symbol()),
        "client subscribed"
    );

    loop {
        tokio::select! {
            // ── Push: drain the sink onto the socket ────────────────────
            frame = sink.recv() => {
                match frame {
                    Some(frame) => {
                        if let Err(e) = sender.send(Message::Text(frame.to_string())).await {
                            debug!(error = %e, "WebSocket send failed, disconnecting");
                            break;
                        }
                    }
                    None => {
                        warn!(
                            symbol = %symbol,
                            policy = %state.overflow_policy(),
                            "sink closed for a slow consumer, disconnecting"
                        );
                        let _ = sender.send(Message::Close(None)).await;
                        break;
                    }
                }
            }

            // ── Recv: process incoming messages ─────────────────────────
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = sender.send(Message::Pong(data)).await {
                            debug!(error = %e, "Failed to send Pong, disconnecting");
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        debug!(symbol = %symbol, "WebSocket Close frame received");
                        break;
                    }
                    Some(Ok(_)) => {
                        // Clients have nothing to say on this feed.
                    }
                    Some(Err(e)) => {
                        debug!(error = %e, "WebSocket receive error, disconnecting");
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    let dropped = sink.dropped();
    let undelivered = sink.queued();
    drop(subscription);
    info!(
        symbol = %symbol,
        dropped_frames = dropped,
        undelivered_frames = undelivered,
        "client disconnected"
    );
}

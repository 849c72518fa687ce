use std::sync::Arc;

use axum::{
    debug_handler,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::events::{ClientEvent, ServerEvent};
use crate::hub::Hub;

#[debug_handler(state = crate::AppState)]
pub async fn hub_ws(State(hub): State<Arc<Hub>>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_connection(hub, socket))
}

/// One connection's serving loop: register, pump outbound events from the
/// hub's queue into the socket, parse and dispatch inbound frames, and clean
/// up whatever happens. A bad frame or failing handler only costs that one
/// event; the loop and every other connection keep running.
async fn serve_connection(hub: Arc<Hub>, socket: WebSocket) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();
    let conn_id = hub.connect(tx).await;

    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let frame = match serde_json::to_string(&event) {
                Ok(frame) => frame,
                Err(err) => {
                    warn!(%err, "failed to serialize outbound event");
                    continue;
                }
            };
            if sink.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(message)) = stream.next().await {
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        match serde_json::from_str::<ClientEvent>(&text) {
            Ok(event) => Arc::clone(&hub).dispatch(conn_id, event).await,
            Err(err) => {
                debug!(%conn_id, %err, "rejecting malformed frame");
                hub.send_error(conn_id, format!("malformed event: {err}"))
                    .await;
            }
        }
    }

    // Runs even when the connection died mid-operation; all shared state is
    // mutated under the component locks, so this cannot race a straggler.
    hub.disconnect(conn_id).await;
    writer.abort();
    debug!(%conn_id, "serving loop finished");
}

// Realtime HTTP routes: WebSocket and SSE
//
// Both variants authorize the same way and forward broker messages verbatim.
// Authentication happens before the upgrade (401); ownership is checked on
// the open connection.

use std::borrow::Cow;
use std::convert::Infallible;
use std::fmt::Display;

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::{
        sse::{Event as SseEvent, KeepAlive, Sse},
        Response,
    },
    routing::get,
    Router,
};
use futures::{stream, Sink, SinkExt, Stream, StreamExt};
use uuid::Uuid;

use super::common::ApiError;
use crate::auth::AuthUser;
use crate::services::{Connection, ConnectionState, RealtimeService};
use crate::AppState;

/// Close code for policy violations (RFC 6455)
const CLOSE_POLICY_VIOLATION: u16 = 1008;
const CLOSE_GOING_AWAY: u16 = 1001;

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/realtime/:project_id", get(websocket))
        .route("/realtime/:project_id/sse", get(sse))
        .with_state(state)
}

fn connected_message(project_id: Uuid) -> String {
    serde_json::json!({ "type": "connected", "projectId": project_id }).to_string()
}

/// GET /realtime/{project_id} - WebSocket live stream
pub async fn websocket(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    user: AuthUser,
    ws: WebSocketUpgrade,
) -> Response {
    let realtime = state.realtime.clone();
    ws.on_upgrade(move |socket: WebSocket| async move {
        drive_socket(socket, &realtime, Connection::new(project_id, user.id)).await;
    })
}

/// Run one WebSocket connection through its lifecycle
pub async fn drive_socket<S>(mut socket: S, realtime: &RealtimeService, mut conn: Connection)
where
    S: Sink<Message> + Stream<Item = Result<Message, axum::Error>> + Unpin,
    S::Error: Display,
{
    conn.advance(ConnectionState::Authorizing);
    if realtime.authorize(conn.project_id, conn.user_id).await.is_err() {
        let _ = socket
            .send(Message::Text(r#"{"error":"Unauthorized"}"#.to_string()))
            .await;
        let _ = socket
            .send(Message::Close(Some(CloseFrame {
                code: CLOSE_POLICY_VIOLATION,
                reason: Cow::Borrowed("Unauthorized"),
            })))
            .await;
        conn.advance(ConnectionState::Closed);
        return;
    }

    conn.advance(ConnectionState::Subscribed);
    if let Err(e) = socket
        .send(Message::Text(connected_message(conn.project_id)))
        .await
    {
        tracing::debug!(error = %e, "Client left before confirmation");
        conn.advance(ConnectionState::Closed);
        return;
    }

    let mut live = match realtime.open(conn.project_id).await {
        Ok(live) => live,
        Err(e) => {
            tracing::warn!(project_id = %conn.project_id, error = %e, "Subscribe failed");
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code: 1011,
                    reason: Cow::Borrowed("Subscribe failed"),
                })))
                .await;
            conn.advance(ConnectionState::Closed);
            return;
        }
    };
    conn.advance(ConnectionState::Streaming);

    loop {
        tokio::select! {
            message = live.next_message() => {
                // Broker closed: the server is shutting down
                let Some(message) = message else {
                    let _ = socket
                        .send(Message::Close(Some(CloseFrame {
                            code: CLOSE_GOING_AWAY,
                            reason: Cow::Borrowed("Server shutting down"),
                        })))
                        .await;
                    break;
                };
                if let Err(e) = socket.send(Message::Text(message.to_string())).await {
                    tracing::debug!(error = %e, "Forward failed, closing connection");
                    break;
                }
            }
            incoming = socket.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(error = %e, "Transport error");
                        break;
                    }
                    // Client messages carry no meaning
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    live.close().await;
    conn.advance(ConnectionState::Closed);
}

/// GET /realtime/{project_id}/sse - Server-sent events live stream
pub async fn sse(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    user: AuthUser,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    let mut conn = Connection::new(project_id, user.id);

    conn.advance(ConnectionState::Authorizing);
    if let Err(e) = state.realtime.authorize(project_id, user.id).await {
        conn.advance(ConnectionState::Closed);
        return Err(e.into());
    }

    conn.advance(ConnectionState::Subscribed);
    let live = match state.realtime.open(project_id).await {
        Ok(live) => live,
        Err(e) => {
            conn.advance(ConnectionState::Closed);
            return Err(e.into());
        }
    };
    conn.advance(ConnectionState::Streaming);

    // The subscription travels with the stream; dropping the response
    // (client gone) drops it and releases the broker handle.
    let connected = stream::once(async move {
        Ok::<_, Infallible>(SseEvent::default().data(connected_message(project_id)))
    });
    let events = live.map(|message| Ok(SseEvent::default().data(&*message)));

    Ok(Sse::new(connected.chain(events)).keep_alive(KeepAlive::default()))
}

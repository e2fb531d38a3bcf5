//! HTTP and WebSocket routes of the development server.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use super::board::Submission;
use super::hub::LiveHub;

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Health check endpoint
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Body of `POST /submissions`
#[derive(Debug, Deserialize)]
struct NewSubmission {
    username: String,
    scene_name: String,
}

async fn create_submission(
    State(hub): State<Arc<LiveHub>>,
    Json(body): Json<NewSubmission>,
) -> (StatusCode, Json<Submission>) {
    let submission = hub.submit(&body.username, &body.scene_name).await;
    (StatusCode::CREATED, Json(submission))
}

async fn ws_handler(ws: WebSocketUpgrade, State(hub): State<Arc<LiveHub>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

async fn handle_socket(socket: WebSocket, hub: Arc<LiveHub>) {
    let id = Uuid::new_v4();
    let (mut sender, mut receiver) = socket.split();
    let mut updates = hub.subscribe();
    hub.connection_opened().await;

    if sender
        .send(Message::Text(hub.snapshot().await.into()))
        .await
        .is_err()
    {
        tracing::debug!("Socket {} closed before the snapshot was sent", id);
        hub.connection_closed().await;
        return;
    }

    loop {
        tokio::select! {
            msg = receiver.next() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text.as_str().to_owned(),
                    Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::warn!("Socket {} sent non UTF-8 binary frame: {}", id, e);
                            continue;
                        }
                    },
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        tracing::warn!("Socket {} error: {}", id, e);
                        break;
                    }
                };

                if let Some(reply) = hub.handle_client_frame(&text).await {
                    if sender.send(Message::Text(reply.into())).await.is_err() {
                        break;
                    }
                }
            }
            update = updates.recv() => {
                let text = match update {
                    Ok(text) => text,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("Socket {} lagged by {} frames, resending snapshot", id, skipped);
                        hub.snapshot().await
                    }
                    Err(RecvError::Closed) => break,
                };
                if sender.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
        }
    }

    hub.connection_closed().await;
}

/// Builds the router: `/health`, `/submissions` and the live socket on `/`
/// and `/ws`.
pub fn router(hub: Arc<LiveHub>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/", get(ws_handler))
        .route("/ws", get(ws_handler))
        .route("/submissions", post(create_submission))
        .with_state(hub)
        .layer(TraceLayer::new_for_http())
}

//! Local control surface
//!
//! HTTP + WebSocket API consumed by the presentation layer:
//!
//! | Route          | Description                                |
//! |----------------|--------------------------------------------|
//! | `GET /health`  | Daemon liveness probe                      |
//! | `GET /api/state` | Current state snapshot                   |
//! | `POST /api/command` | Command dispatch (see [`crate::command`]) |
//! | `GET /ws/state` | Push of full snapshots after each mutation |

use crate::command::{dispatch, Command};
use crate::runtime::Runtime;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    http::{header, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Build the complete control-surface application.
pub fn build_app(runtime: Arc<Runtime>, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/state", get(get_state))
        .route("/api/command", post(post_command))
        .route("/ws/state", get(ws_state))
        .layer(build_cors(cors_origins))
        .with_state(runtime)
}

/// Health check response
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn get_state(State(runtime): State<Arc<Runtime>>) -> impl IntoResponse {
    Json(runtime.store().get().await)
}

async fn post_command(
    State(runtime): State<Arc<Runtime>>,
    Json(command): Json<Command>,
) -> impl IntoResponse {
    match dispatch(&runtime, command).await {
        Ok(reply) => (StatusCode::OK, Json(serde_json::to_value(reply).unwrap_or_default())),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "error": {"code": "COMMAND_FAILED", "message": e.to_string()}
            })),
        ),
    }
}

async fn ws_state(
    State(runtime): State<Arc<Runtime>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| stream_state(socket, runtime))
}

/// Push one snapshot immediately, then one per completed mutation.
async fn stream_state(mut socket: WebSocket, runtime: Arc<Runtime>) {
    let mut updates = runtime.store().subscribe();

    let snapshot = runtime.store().get().await;
    if send_snapshot(&mut socket, &snapshot).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Ok(snapshot) => {
                    if send_snapshot(&mut socket, &snapshot).await.is_err() {
                        break;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    // Fell behind; resync from the current snapshot.
                    tracing::debug!(skipped, "State subscriber lagged, resyncing");
                    let snapshot = runtime.store().get().await;
                    if send_snapshot(&mut socket, &snapshot).await.is_err() {
                        break;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(_)) => {}
                _ => break,
            },
        }
    }
}

async fn send_snapshot(
    socket: &mut WebSocket,
    snapshot: &crate::state::RuntimeState,
) -> Result<(), axum::Error> {
    let payload = serde_json::to_string(snapshot).unwrap_or_default();
    socket.send(Message::Text(payload)).await
}

fn build_cors(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT]);

    if origins.is_empty() {
        cors.allow_origin(Any)
    } else {
        let parsed: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        cors.allow_origin(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runtime() -> Arc<Runtime> {
        Runtime::builder().build().unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let response = health_check().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_get_state_serves_snapshot() {
        let response = get_state(State(runtime())).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["isRunning"], false);
        assert_eq!(json["runningState"], "idle");
    }

    #[tokio::test]
    async fn test_post_command_dispatches() {
        let command: Command =
            serde_json::from_str(r#"{"command": "update-state", "patch": {"isStealth": true}}"#)
                .unwrap();
        let response = post_command(State(runtime()), Json(command))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["isStealth"], true);
    }

    #[test]
    fn test_build_cors_empty_origins() {
        let _cors = build_cors(&[]);
    }

    #[test]
    fn test_build_cors_with_origins() {
        let _cors = build_cors(&["http://localhost:1420".to_string()]);
    }

    #[tokio::test]
    async fn test_served_app_round_trip() {
        let runtime = runtime();
        let app = build_app(runtime, &[]);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = reqwest::Client::new();
        let health: serde_json::Value = client
            .get(format!("http://{}/health", addr))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health["status"], "ok");

        let reply: serde_json::Value = client
            .post(format!("http://{}/api/command", addr))
            .json(&serde_json::json!({
                "command": "action-lock:try-acquire",
                "actionId": "screenshot_capture"
            }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(reply["acquired"], true);
    }
}

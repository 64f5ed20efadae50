use axum::{
    extract::{State, WebSocketUpgrade},
    http::Method,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::env;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::EnvFilter;

mod app;
mod game;
mod protocol;
mod session;
mod shared;
mod transport;

use session::SessionManager;
use transport::ws_session::handle_socket;

#[derive(Debug, Serialize)]
struct HealthResponse {
    message: String,
    players: usize,
    lobbies: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let manager = Arc::new(SessionManager::new());
    manager.spawn_sweeper();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);
    let app: Router = Router::new()
        .route("/", get(health))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .with_state(Arc::clone(&manager));

    let port: u16 = env::var("PORT")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(3001);
    let address = format!("0.0.0.0:{port}");
    tracing::info!("listening on {address}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    let shutdown_manager = Arc::clone(&manager);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
            shutdown_manager.shutdown().await;
        })
        .await?;
    Ok(())
}

async fn health(State(manager): State<Arc<SessionManager>>) -> impl IntoResponse {
    let (players, lobbies) = manager.counts().await;
    Json(HealthResponse {
        message: "snake-arena server".to_string(),
        players,
        lobbies,
    })
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(manager): State<Arc<SessionManager>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, manager))
}

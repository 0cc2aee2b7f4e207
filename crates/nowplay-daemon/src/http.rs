//! Read-only HTTP surface for the consuming banner view.
//!
//! The view never sees errors from this daemon — it only ever reads the
//! last-known-good snapshot, so a remount never flashes a loading state once
//! a snapshot exists.  CORS is permissive because the consumer is a browser
//! page on another origin.

use axum::{extract::State, response::Json, routing::get, Router};
use chrono::{DateTime, Utc};
use nowplay_proto::model::Track;
use nowplay_proto::snapshot::SnapshotStore;
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

#[derive(Clone)]
struct HttpState {
    store: SnapshotStore,
}

#[derive(Serialize)]
struct ApiNowPlaying {
    rev: u64,
    is_playing: bool,
    is_authorized: bool,
    progress_ms: u64,
    /// Position as a 0..1 fraction of track length, for the progress bar.
    progress_percent: Option<f64>,
    track: Option<Track>,
    last_played_at: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
}

pub fn start_server(
    bind_address: String,
    port: u16,
    store: SnapshotStore,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let app_state = HttpState { store };

        let app = Router::new()
            .route("/api/now-playing", get(get_now_playing))
            .route("/api/health", get(get_health))
            .layer(CorsLayer::permissive())
            .with_state(app_state);

        let addr = format!("{}:{}", bind_address, port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind HTTP server to {}: {}", addr, e);
                return;
            }
        };

        info!("HTTP API server listening on http://{}", addr);

        if let Err(e) = axum::serve(listener, app).await {
            error!("HTTP server error: {}", e);
        }
    })
}

async fn get_now_playing(State(state): State<HttpState>) -> Json<ApiNowPlaying> {
    let snap = state.store.get().await;
    Json(ApiNowPlaying {
        rev: snap.rev,
        is_playing: snap.is_playing,
        is_authorized: snap.is_authorized,
        progress_ms: snap.progress_ms,
        progress_percent: snap.progress_percent(),
        track: snap.track,
        last_played_at: snap.last_played_at,
    })
}

async fn get_health() -> Json<Health> {
    Json(Health { status: "ok" })
}

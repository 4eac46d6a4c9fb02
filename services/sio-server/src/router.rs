use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use tokio::sync::Mutex;
use tracing::info;

use crate::config::RouterSettings;
use crate::connection::Connection;
use crate::container::SessionContainer;
use crate::handshake;
use crate::stats::StatsCollector;
use crate::transport::{htmlfile, jsonp_polling, websocket, xhr_polling};

/// Builds a fresh default-endpoint `Connection` for each new session.
pub type ConnectionFactory = Arc<dyn Fn() -> Box<dyn Connection> + Send + Sync>;

/// Shared state for every route: settings, the session container, stats,
/// and the factory the handshake uses to construct each session's default
/// connection.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionContainer>,
    pub stats: Arc<Mutex<StatsCollector>>,
    pub settings: Arc<RouterSettings>,
    pub connection_factory: ConnectionFactory,
}

impl AppState {
    pub fn new(settings: RouterSettings, connection_factory: ConnectionFactory) -> Self {
        Self {
            sessions: Arc::new(SessionContainer::new()),
            stats: Arc::new(Mutex::new(StatsCollector::new())),
            settings: Arc::new(settings),
            connection_factory,
        }
    }

    /// Spawns the periodic session sweep (§4.6) and the 1 Hz stats tick.
    /// Both run until the process exits; nothing cancels them short of
    /// that, matching the router's documented lifetime.
    pub fn spawn_background_tasks(&self) {
        let sessions = Arc::clone(&self.sessions);
        let interval = self.settings.session_check_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                sessions.expire().await;
            }
        });

        let stats = Arc::clone(&self.stats);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            loop {
                ticker.tick().await;
                stats.lock().await.tick();
            }
        });
    }
}

async fn stats_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.stats.lock().await.snapshot())
}

async fn healthz() -> impl IntoResponse {
    "ok"
}

/// Wires the URL table described in §6: a handshake endpoint plus one
/// route per transport, all scoped under `/{namespace}/1/...`.
pub fn build_router(state: AppState) -> Router {
    let ns = &state.settings.namespace;
    let handshake_path = format!("/{ns}/:version/");
    let websocket_path = format!("/{ns}/1/websocket/:sid");
    let flashsocket_path = format!("/{ns}/1/flashsocket/:sid");
    let xhr_path = format!("/{ns}/1/xhr-polling/:sid");
    let jsonp_path = format!("/{ns}/1/jsonp-polling/:sid");
    let htmlfile_path = format!("/{ns}/1/htmlfile/:sid");
    let stats_path = format!("/{ns}/1/stats");

    info!(namespace = %ns, "wiring socket.io router");

    Router::new()
        .route("/healthz", get(healthz))
        .route(&handshake_path, get(handshake::handshake_handler))
        .route(&websocket_path, get(websocket::websocket_handler))
        .route(&flashsocket_path, get(websocket::websocket_handler))
        .route(
            &xhr_path,
            get(xhr_polling::xhr_poll_get)
                .post(xhr_polling::xhr_poll_post)
                .options(crate::transport::common::cors_preflight),
        )
        .route(
            &jsonp_path,
            get(jsonp_polling::jsonp_poll_get)
                .post(jsonp_polling::jsonp_poll_post)
                .options(crate::transport::common::cors_preflight),
        )
        .route(&htmlfile_path, get(htmlfile::htmlfile_get))
        .route(&stats_path, get(stats_endpoint))
        .with_state(state)
}

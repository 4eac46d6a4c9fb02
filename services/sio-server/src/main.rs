use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sio_protocol::EventArgs;
use sio_server::{AppState, Connection, ConnectionContext, InboundMessage, RouterSettings};

/// Minimal default-endpoint connection: echoes messages and events back to
/// their sender. Applications wiring their own `Connection` into
/// `AppState::new` replace this; it exists only so the binary is runnable
/// on its own.
struct EchoConnection;

#[async_trait]
impl Connection for EchoConnection {
    async fn on_message(&self, ctx: &ConnectionContext, message: InboundMessage) {
        match message {
            InboundMessage::Text(text) => ctx.send(Value::String(text), None, false).await,
            InboundMessage::Json(value) => ctx.send(value, None, true).await,
        }
    }

    async fn on_event(&self, _ctx: &ConnectionContext, name: &str, args: EventArgs) -> Option<Value> {
        Some(serde_json::json!({ "name": name, "args": args.to_wire() }))
    }
}

#[tokio::main]
async fn main() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level))
        .init();

    let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_owned());

    let settings = RouterSettings::default();
    let factory: Arc<dyn Fn() -> Box<dyn Connection> + Send + Sync> = Arc::new(|| Box::new(EchoConnection));
    let state = AppState::new(settings, factory);
    state.spawn_background_tasks();

    let router = sio_server::build_router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("failed to bind");
    info!(addr = %bind_addr, "socket.io server listening");
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("server error");
    info!("server shut down gracefully");
}

/// Waits for SIGTERM or Ctrl-C (SIGINT) and returns to trigger graceful shutdown.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("received Ctrl+C, shutting down"); },
        _ = terminate => { info!("received SIGTERM, shutting down"); },
    }
}

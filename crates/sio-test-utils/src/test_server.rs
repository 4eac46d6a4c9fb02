use std::net::SocketAddr;
use std::sync::Arc;

use sio_server::{AppState, Connection, RouterSettings};

/// A real `sio-server` router, bound to a random port and driven by a
/// background task for the duration of the test. Dropping it aborts the
/// serving task.
pub struct TestServer {
    pub addr: SocketAddr,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    pub async fn start(
        settings: RouterSettings,
        factory: Arc<dyn Fn() -> Box<dyn Connection> + Send + Sync>,
    ) -> Self {
        let state = AppState::new(settings, factory);
        state.spawn_background_tasks();
        let router = sio_server::build_router(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local_addr");
        let handle = tokio::spawn(async move {
            let _ = axum::serve(
                listener,
                router.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await;
        });

        Self { addr, handle }
    }

    pub fn http_base(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn ws_base(&self) -> String {
        format!("ws://{}", self.addr)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

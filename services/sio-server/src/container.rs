use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use crate::session::Session;

/// An indexed, expiring collection of sessions. The container is the sole
/// owner of every `Session` it holds.
#[derive(Default)]
pub struct SessionContainer {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, session: Arc<Session>) {
        self.sessions.write().await.insert(session.id.clone(), session);
    }

    pub async fn get(&self, id: &str) -> Option<Arc<Session>> {
        let session = self.sessions.read().await.get(id).cloned();
        if let Some(session) = &session {
            session.promote().await;
        }
        session
    }

    pub async fn remove(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.write().await.remove(id)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Called periodically (every `session_check_interval`). Sessions that
    /// still have an attached, non-closed handler are promoted instead of
    /// removed; everyone else is removed and force-closed.
    pub async fn expire(&self) {
        let now = tokio::time::Instant::now();
        let expired: Vec<Arc<Session>> = {
            let sessions = self.sessions.read().await;
            let mut expired = Vec::new();
            for session in sessions.values() {
                if session.expires_at().await <= now {
                    expired.push(Arc::clone(session));
                }
            }
            expired
        };

        for session in expired {
            if session.has_attached_handler().await && !session.is_closed().await {
                session.promote().await;
                continue;
            }
            debug!(session_id = %session.id, "expiring session");
            self.sessions.write().await.remove(&session.id);
            session.close(None).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouterSettings;
    use crate::connection::{Connection, ConnectionContext, InboundMessage};
    use crate::stats::StatsCollector;
    use tokio::sync::Mutex;

    struct NullConnection;

    #[async_trait::async_trait]
    impl Connection for NullConnection {
        async fn on_message(&self, _ctx: &ConnectionContext, _message: InboundMessage) {}
    }

    struct CountingCloseConnection {
        closes: Arc<std::sync::atomic::AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl Connection for CountingCloseConnection {
        async fn on_message(&self, _ctx: &ConnectionContext, _message: InboundMessage) {}

        async fn on_close(&self, _ctx: &ConnectionContext) {
            self.closes.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
    }

    fn new_session(expiry: std::time::Duration) -> Arc<Session> {
        let mut settings = RouterSettings::default();
        settings.session_expiry = expiry;
        Session::new(
            uuid::Uuid::new_v4().to_string(),
            None,
            Box::new(NullConnection),
            Arc::new(settings),
            Arc::new(Mutex::new(StatsCollector::new())),
        )
    }

    #[tokio::test]
    async fn add_and_get_round_trip() {
        let container = SessionContainer::new();
        let session = new_session(std::time::Duration::from_secs(30));
        let id = session.id.clone();
        container.add(session).await;
        assert!(container.get(&id).await.is_some());
        assert_eq!(container.len().await, 1);
    }

    #[tokio::test]
    async fn expire_removes_sessions_past_their_deadline_with_no_attached_handler() {
        let container = SessionContainer::new();
        let session = new_session(std::time::Duration::from_millis(1));
        let id = session.id.clone();
        container.add(session).await;

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        container.expire().await;

        assert!(container.get(&id).await.is_none());
    }

    #[tokio::test]
    async fn expire_invokes_on_close_exactly_once_for_an_unattached_session() {
        let closes = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let mut settings = RouterSettings::default();
        settings.session_expiry = std::time::Duration::from_millis(1);
        let session = Session::new(
            uuid::Uuid::new_v4().to_string(),
            None,
            Box::new(CountingCloseConnection { closes: Arc::clone(&closes) }),
            Arc::new(settings),
            Arc::new(Mutex::new(StatsCollector::new())),
        );
        let id = session.id.clone();

        let container = SessionContainer::new();
        container.add(session).await;

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        container.expire().await;
        container.expire().await;

        assert!(container.get(&id).await.is_none());
        assert_eq!(closes.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn get_promotes_the_session() {
        let container = SessionContainer::new();
        let session = new_session(std::time::Duration::from_secs(30));
        let id = session.id.clone();
        let before = session.expires_at().await;
        container.add(session).await;

        tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        container.get(&id).await;

        let after = container.get(&id).await.unwrap().expires_at().await;
        assert!(after >= before);
    }
}

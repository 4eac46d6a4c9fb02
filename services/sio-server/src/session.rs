use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::RouterSettings;
use crate::connection::{AckCallback, Connection, ConnectionContext, InboundMessage};
use crate::connection_info::ConnectionInfo;
use crate::stats::StatsCollector;
use crate::transport::TransportHandler;
use sio_protocol::{self as proto, EventArgs, MessageId, Packet};

const DEFAULT_ENDPOINT: &str = "";

struct PendingAck {
    #[allow(dead_code)]
    created_at: Instant,
    callback: AckCallback,
    original: Value,
}

/// Per-endpoint runtime state owned by the session: the outgoing ack
/// counter and the registry of acks awaiting a reply.
#[derive(Default)]
struct ConnectionRuntime {
    next_ack_id: u64,
    pending: HashMap<u64, PendingAck>,
}

impl ConnectionRuntime {
    fn allocate_ack(&mut self, original: Value, callback: AckCallback) -> u64 {
        self.next_ack_id += 1;
        let id = self.next_ack_id;
        self.pending.insert(id, PendingAck { created_at: Instant::now(), callback, original });
        id
    }

    fn deque(&mut self, id: u64) -> Option<PendingAck> {
        self.pending.remove(&id)
    }
}

struct EndpointSlot {
    app: Arc<dyn Connection>,
    runtime: Mutex<ConnectionRuntime>,
}

enum HeartbeatCmd {
    Delay,
    Reset,
    Stop,
}

/// The durable per-client entity. Outlives individual HTTP requests; the
/// only object the transport layer refers to across request boundaries.
pub struct Session {
    pub id: String,
    pub remote_ip: Option<String>,
    pub created_at: Instant,
    expiry: Duration,
    expires_at: RwLock<Instant>,
    queue: Mutex<Vec<String>>,
    handler: RwLock<Option<Arc<dyn TransportHandler>>>,
    endpoints: RwLock<HashMap<String, EndpointSlot>>,
    is_closed: RwLock<bool>,
    missed_heartbeats: RwLock<u32>,
    heartbeat_tx: Mutex<Option<mpsc::UnboundedSender<HeartbeatCmd>>>,
    settings: Arc<RouterSettings>,
    stats: Arc<Mutex<StatsCollector>>,
}

impl Session {
    pub fn new(
        id: String,
        remote_ip: Option<String>,
        default_connection: Box<dyn Connection>,
        settings: Arc<RouterSettings>,
        stats: Arc<Mutex<StatsCollector>>,
    ) -> Arc<Self> {
        let expiry = settings.session_expiry;
        let mut endpoints = HashMap::new();
        endpoints.insert(
            DEFAULT_ENDPOINT.to_owned(),
            EndpointSlot {
                app: Arc::from(default_connection),
                runtime: Mutex::new(ConnectionRuntime::default()),
            },
        );

        // The default endpoint is considered connected as soon as the
        // session exists; the client learns this on its first poll/upgrade.
        let initial_queue = vec![proto::encode(&Packet::Connect { endpoint: None })];

        Arc::new(Self {
            id,
            remote_ip,
            created_at: Instant::now(),
            expiry,
            expires_at: RwLock::new(Instant::now() + expiry),
            queue: Mutex::new(initial_queue),
            handler: RwLock::new(None),
            endpoints: RwLock::new(endpoints),
            is_closed: RwLock::new(false),
            missed_heartbeats: RwLock::new(0),
            heartbeat_tx: Mutex::new(None),
            settings,
            stats,
        })
    }

    pub async fn is_closed(&self) -> bool {
        *self.is_closed.read().await
    }

    pub async fn expires_at(&self) -> Instant {
        *self.expires_at.read().await
    }

    pub async fn has_attached_handler(&self) -> bool {
        self.handler.read().await.is_some()
    }

    /// Refreshes `expires_at` to `now + expiry_seconds`.
    pub async fn promote(&self) {
        *self.expires_at.write().await = Instant::now() + self.expiry;
    }

    // -- handler attach/detach --------------------------------------------

    pub async fn attach(self: &Arc<Self>, handler: Arc<dyn TransportHandler>) -> Result<(), crate::error::ServerError> {
        {
            let mut current = self.handler.write().await;
            if current.is_some() {
                return Err(crate::error::ServerError::AlreadyAttached(self.id.clone()));
            }
            if let (Some(expected), Some(actual)) = (&self.remote_ip, handler.remote_addr()) {
                if expected != &actual {
                    return Err(crate::error::ServerError::HijackMismatch);
                }
            }
            *current = Some(handler);
        }
        self.promote().await;
        self.stats.lock().await.connection_attached();
        if !self.settings.global_heartbeats {
            self.reset_heartbeat().await;
        }
        self.flush().await;
        Ok(())
    }

    /// Detaches `handler` if it is the one currently attached. A no-op
    /// (not an error) if some other or no handler is attached — this is
    /// how "implicit detach on underlying connection close" is expressed.
    pub async fn detach(&self, handler: &Arc<dyn TransportHandler>) {
        let mut current = self.handler.write().await;
        let matches = current.as_ref().map(|h| Arc::ptr_eq(h, handler)).unwrap_or(false);
        if matches {
            *current = None;
            self.stats.lock().await.connection_detached();
        }
    }

    // -- send path ----------------------------------------------------------

    pub async fn send_message(&self, encoded_packet: String) {
        self.queue.lock().await.push(encoded_packet);
        self.flush().await;
    }

    /// Hands the whole queue to the attached handler, if any. Retains the
    /// queue if delivery fails (so the next attach can redeliver).
    pub async fn flush(&self) {
        let pending = {
            let queue = self.queue.lock().await;
            if queue.is_empty() {
                return;
            }
            queue.clone()
        };

        let handler = self.handler.read().await.clone();
        let Some(handler) = handler else {
            return;
        };

        let delivered = handler.send_messages(pending.clone()).await;
        if delivered {
            self.queue.lock().await.clear();
            self.stats.lock().await.packets_sent(pending.len());
        } else {
            warn!(session_id = %self.id, "transport delivery failed, detaching");
            let mut current = self.handler.write().await;
            if current.as_ref().map(|h| Arc::ptr_eq(h, &handler)).unwrap_or(false) {
                *current = None;
                self.stats.lock().await.connection_detached();
            }
            return;
        }

        if self.is_closed().await {
            handler.session_closed().await;
            *self.handler.write().await = None;
        }
    }

    async fn send_packet(&self, packet: &Packet) {
        self.send_message(proto::encode(packet)).await;
    }

    pub(crate) async fn send_to_endpoint(
        &self,
        endpoint: Option<String>,
        message: Value,
        ack_callback: Option<AckCallback>,
        force_json: bool,
    ) {
        let ack_id = match ack_callback {
            Some(cb) => {
                let endpoints = self.endpoints.read().await;
                let key = endpoint.clone().unwrap_or_default();
                match endpoints.get(&key) {
                    Some(slot) => {
                        let id = slot.runtime.lock().await.allocate_ack(message.clone(), cb);
                        Some(MessageId::new(id))
                    }
                    None => None,
                }
            }
            None => None,
        };

        let packet = if force_json || !message.is_string() {
            Packet::Json { ack_id, endpoint, data: message }
        } else {
            Packet::Message {
                ack_id,
                endpoint,
                data: message.as_str().unwrap_or_default().to_owned(),
            }
        };
        self.send_packet(&packet).await;
    }

    pub(crate) async fn emit_to_endpoint(
        &self,
        endpoint: Option<String>,
        name: &str,
        args: EventArgs,
        ack_callback: Option<AckCallback>,
    ) {
        let original = serde_json::json!({ "name": name, "args": args.to_wire() });
        let ack_id = match ack_callback {
            Some(cb) => {
                let endpoints = self.endpoints.read().await;
                let key = endpoint.clone().unwrap_or_default();
                match endpoints.get(&key) {
                    Some(slot) => {
                        let id = slot.runtime.lock().await.allocate_ack(original, cb);
                        Some(MessageId::new(id))
                    }
                    None => None,
                }
            }
            None => None,
        };
        let packet = Packet::Event { ack_id, endpoint, name: name.to_owned(), args };
        self.send_packet(&packet).await;
    }

    // -- closing --------------------------------------------------------------

    pub async fn close(self: &Arc<Self>, endpoint: Option<String>) {
        match endpoint {
            Some(ep) => self.disconnect_endpoint(&ep).await,
            None => self.close_whole_session().await,
        }
    }

    async fn close_whole_session(self: &Arc<Self>) {
        if *self.is_closed.read().await {
            return;
        }

        let endpoint_names: Vec<String> = {
            let endpoints = self.endpoints.read().await;
            endpoints.keys().filter(|k| !k.is_empty()).cloned().collect()
        };
        for ep in endpoint_names {
            self.disconnect_endpoint(&ep).await;
        }

        let default_app = self.endpoints.read().await.get(DEFAULT_ENDPOINT).map(|slot| Arc::clone(&slot.app));
        if let Some(app) = default_app {
            let ctx = ConnectionContext::new(Arc::clone(self), None);
            app.on_close(&ctx).await;
        }

        *self.is_closed.write().await = true;
        self.stop_heartbeat().await;
        self.stats.lock().await.session_closed();
        self.send_packet(&Packet::Disconnect { endpoint: None }).await;

        if let Some(handler) = self.handler.read().await.clone() {
            handler.session_closed().await;
            *self.handler.write().await = None;
        }
    }

    async fn disconnect_endpoint(self: &Arc<Self>, path: &str) {
        let removed = self.endpoints.write().await.remove(path);
        let Some(slot) = removed else {
            return;
        };
        let ctx = ConnectionContext::new(Arc::clone(self), Some(path.to_owned()));
        slot.app.on_close(&ctx).await;
        self.send_packet(&Packet::Disconnect { endpoint: Some(path.to_owned()) }).await;
    }

    // -- endpoint (namespace) connect ------------------------------------------

    async fn connect_endpoint(self: &Arc<Self>, raw_endpoint: &str) {
        let (path, args) = ConnectionInfo::split_endpoint_query(raw_endpoint);
        if self.endpoints.read().await.contains_key(path) {
            return;
        }

        let factory_result = {
            let endpoints = self.endpoints.read().await;
            endpoints.get(DEFAULT_ENDPOINT).and_then(|slot| slot.app.get_endpoint(path))
        };

        let Some(app) = factory_result else {
            debug!(session_id = %self.id, endpoint = %path, "unrecognized endpoint, ignoring connect");
            return;
        };

        self.endpoints.write().await.insert(
            path.to_owned(),
            EndpointSlot { app: Arc::from(app), runtime: Mutex::new(ConnectionRuntime::default()) },
        );

        self.send_packet(&Packet::Connect { endpoint: Some(path.to_owned()) }).await;

        let info = ConnectionInfo { remote_addr: self.remote_ip.clone(), args, cookies: HashMap::new() };
        let ctx = ConnectionContext::new(Arc::clone(self), Some(path.to_owned()));
        let app = self.endpoints.read().await.get(path).map(|slot| Arc::clone(&slot.app));
        let accepted = match app {
            Some(app) => app.on_open(&ctx, &info).await,
            None => false,
        };
        if !accepted {
            self.disconnect_endpoint(path).await;
        }
    }

    // -- heartbeats -------------------------------------------------------------

    pub async fn start_heartbeat(self: &Arc<Self>) {
        self.spawn_heartbeat_task().await;
    }

    pub async fn reset_heartbeat(self: &Arc<Self>) {
        let has_sender = self.heartbeat_tx.lock().await.is_some();
        if has_sender {
            if let Some(tx) = self.heartbeat_tx.lock().await.as_ref() {
                let _ = tx.send(HeartbeatCmd::Reset);
            }
        } else {
            self.spawn_heartbeat_task().await;
        }
    }

    pub async fn delay_heartbeat(&self) {
        if let Some(tx) = self.heartbeat_tx.lock().await.as_ref() {
            let _ = tx.send(HeartbeatCmd::Delay);
        }
    }

    pub async fn stop_heartbeat(&self) {
        if let Some(tx) = self.heartbeat_tx.lock().await.take() {
            let _ = tx.send(HeartbeatCmd::Stop);
        }
    }

    async fn spawn_heartbeat_task(self: &Arc<Self>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        *self.heartbeat_tx.lock().await = Some(tx);

        let session = Arc::clone(self);
        let interval = self.settings.heartbeat_interval;
        let threshold = self.settings.heartbeat_missed_threshold;

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        if session.is_closed().await {
                            break;
                        }
                        session.send_packet(&Packet::Heartbeat).await;
                        let missed = {
                            let mut missed = session.missed_heartbeats.write().await;
                            *missed += 1;
                            *missed
                        };
                        if missed > threshold {
                            session.close(None).await;
                            break;
                        }
                    }
                    cmd = rx.recv() => {
                        match cmd {
                            Some(HeartbeatCmd::Stop) | None => break,
                            Some(HeartbeatCmd::Reset) => continue,
                            Some(HeartbeatCmd::Delay) => continue,
                        }
                    }
                }
            }
        });
    }

    // -- inbound dispatch -----------------------------------------------------

    /// Decodes and dispatches one inbound wire packet. Errors from the
    /// codec are structural and bubble up so the caller can close the
    /// session; errors from application code are logged and do not.
    pub async fn raw_message(self: &Arc<Self>, raw: &str) -> Result<(), crate::error::ServerError> {
        let packet = proto::decode(raw)?;

        match packet {
            Packet::Disconnect { endpoint } => match endpoint {
                None => self.close(None).await,
                Some(ep) => self.disconnect_endpoint(&ep).await,
            },
            Packet::Connect { endpoint } => match endpoint {
                None => warn!(session_id = %self.id, "received Connect with no endpoint, ignoring"),
                Some(ep) => self.connect_endpoint(&ep).await,
            },
            Packet::Heartbeat => {
                *self.missed_heartbeats.write().await = 0;
            }
            Packet::Message { ack_id, endpoint, data } => {
                self.dispatch_message(endpoint, InboundMessage::Text(data), ack_id).await;
            }
            Packet::Json { ack_id, endpoint, data } => {
                self.dispatch_message(endpoint, InboundMessage::Json(data), ack_id).await;
            }
            Packet::Event { ack_id, endpoint, name, args } => {
                self.dispatch_event(endpoint, name, args, ack_id).await;
            }
            Packet::Ack { endpoint, ack_id, response } => {
                self.dispatch_ack(endpoint, ack_id, response).await;
            }
            Packet::Error { reason, .. } => {
                warn!(session_id = %self.id, reason, "received Error packet from client");
            }
            Packet::Noop => {}
        }

        Ok(())
    }

    async fn dispatch_message(
        self: &Arc<Self>,
        endpoint: Option<String>,
        message: InboundMessage,
        ack_id: Option<MessageId>,
    ) {
        let key = endpoint.clone().unwrap_or_default();
        let ctx = ConnectionContext::new(Arc::clone(self), endpoint.clone());
        let app = self.endpoints.read().await.get(&key).map(|slot| Arc::clone(&slot.app));
        let Some(app) = app else {
            debug!(session_id = %self.id, endpoint = %key, "no connection for endpoint, dropping message");
            return;
        };
        app.on_message(&ctx, message).await;
        if let Some(mid) = ack_id {
            self.send_packet(&Packet::Ack { endpoint, ack_id: mid.id, response: None }).await;
        }
    }

    async fn dispatch_event(
        self: &Arc<Self>,
        endpoint: Option<String>,
        name: String,
        args: EventArgs,
        ack_id: Option<MessageId>,
    ) {
        let key = endpoint.clone().unwrap_or_default();
        let ctx = ConnectionContext::new(Arc::clone(self), endpoint.clone());
        let app = self.endpoints.read().await.get(&key).map(|slot| Arc::clone(&slot.app));
        let Some(app) = app else {
            debug!(session_id = %self.id, endpoint = %key, event = %name, "no connection for endpoint, dropping event");
            return;
        };
        let response = app.on_event(&ctx, &name, args).await;

        if let Some(mid) = ack_id {
            if mid.want_reply {
                self.send_packet(&Packet::Ack { endpoint, ack_id: mid.id, response }).await;
            }
        }
    }

    async fn dispatch_ack(&self, endpoint: Option<String>, ack_id: u64, response: Option<Value>) {
        let key = endpoint.unwrap_or_default();
        let pending = {
            let endpoints = self.endpoints.read().await;
            let Some(slot) = endpoints.get(&key) else {
                debug!(session_id = %self.id, endpoint = %key, ack_id, "ack for unknown endpoint, dropping");
                return;
            };
            slot.runtime.lock().await.deque(ack_id)
        };
        match pending {
            Some(entry) => (entry.callback)(entry.original, response),
            None => debug!(session_id = %self.id, ack_id, "ack for unknown id, dropping"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouterSettings;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Echo {
        received: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl Connection for Echo {
        async fn on_message(&self, ctx: &ConnectionContext, message: InboundMessage) {
            self.received.fetch_add(1, Ordering::SeqCst);
            if let InboundMessage::Text(text) = message {
                ctx.send(Value::String(text), None, false).await;
            }
        }
    }

    struct NullConnection;

    #[async_trait::async_trait]
    impl Connection for NullConnection {
        async fn on_message(&self, _ctx: &ConnectionContext, _message: InboundMessage) {}
    }

    fn new_session(app: Box<dyn Connection>) -> Arc<Session> {
        Session::new(
            "sid-1".to_owned(),
            Some("127.0.0.1".to_owned()),
            app,
            Arc::new(RouterSettings::default()),
            Arc::new(Mutex::new(StatsCollector::new())),
        )
    }

    #[tokio::test]
    async fn promote_advances_expiry() {
        let session = new_session(Box::new(NullConnection));
        let before = session.expires_at().await;
        tokio::time::sleep(Duration::from_millis(1)).await;
        session.promote().await;
        assert!(session.expires_at().await > before);
    }

    #[tokio::test]
    async fn message_echo_round_trips_through_raw_message() {
        let received = Arc::new(AtomicUsize::new(0));
        let session = new_session(Box::new(Echo { received: Arc::clone(&received) }));
        session.raw_message("3:::hello").await.unwrap();
        assert_eq!(received.load(Ordering::SeqCst), 1);
        let queue = session.queue.lock().await.clone();
        assert_eq!(queue, vec!["1::".to_owned(), "3:::hello".to_owned()]);
    }

    #[tokio::test]
    async fn message_with_ack_id_queues_an_empty_ack() {
        let session = new_session(Box::new(NullConnection));
        session.raw_message("3:7::abc").await.unwrap();
        let queue = session.queue.lock().await.clone();
        assert_eq!(queue, vec!["1::".to_owned(), "6:::7".to_owned()]);
    }

    #[tokio::test]
    async fn event_without_reply_flag_does_not_ack() {
        let session = new_session(Box::new(NullConnection));
        session.raw_message("5:::{\"name\":\"t\",\"args\":[10,20]}").await.unwrap();
        let queue = session.queue.lock().await.clone();
        assert_eq!(queue, vec!["1::".to_owned()]);
    }

    #[tokio::test]
    async fn event_with_reply_flag_acks_with_the_handler_return_value() {
        struct Responder;
        #[async_trait::async_trait]
        impl Connection for Responder {
            async fn on_message(&self, _ctx: &ConnectionContext, _message: InboundMessage) {}
            async fn on_event(
                &self,
                _ctx: &ConnectionContext,
                _name: &str,
                _args: EventArgs,
            ) -> Option<Value> {
                Some(serde_json::json!("ok"))
            }
        }

        let session = new_session(Box::new(Responder));
        session
            .raw_message("5:2+::{\"name\":\"t\",\"args\":[{\"a\":1}]}")
            .await
            .unwrap();
        let queue = session.queue.lock().await.clone();
        assert_eq!(queue, vec!["1::".to_owned(), "6:::2+[\"ok\"]".to_owned()]);
    }

    #[tokio::test]
    async fn disconnect_closes_whole_session() {
        let session = new_session(Box::new(NullConnection));
        session.raw_message("0::").await.unwrap();
        assert!(session.is_closed().await);
    }

    #[tokio::test]
    async fn connect_to_unrecognized_endpoint_is_ignored_session_stays_open() {
        let session = new_session(Box::new(NullConnection));
        session.raw_message("1::/nope").await.unwrap();
        assert!(!session.is_closed().await);
        assert!(!session.endpoints.read().await.contains_key("/nope"));
    }

    #[tokio::test]
    async fn ack_for_unknown_id_is_dropped_without_error() {
        let session = new_session(Box::new(NullConnection));
        assert!(session.raw_message("6:::999").await.is_ok());
    }

    struct RecordingHandler {
        received: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl crate::transport::TransportHandler for RecordingHandler {
        fn name(&self) -> &'static str {
            "mock"
        }

        async fn send_messages(&self, packets: Vec<String>) -> bool {
            self.received.lock().await.extend(packets);
            true
        }

        async fn session_closed(&self) {}
    }

    #[tokio::test]
    async fn a_second_attach_while_one_is_live_is_rejected_and_does_not_steal_the_queue() {
        let session = new_session(Box::new(NullConnection));
        let first: Arc<dyn crate::transport::TransportHandler> =
            Arc::new(RecordingHandler { received: Mutex::new(Vec::new()) });
        session.attach(Arc::clone(&first)).await.unwrap();

        let second: Arc<dyn crate::transport::TransportHandler> =
            Arc::new(RecordingHandler { received: Mutex::new(Vec::new()) });
        let result = session.attach(second).await;

        assert!(matches!(result, Err(crate::error::ServerError::AlreadyAttached(_))));
        assert!(session.has_attached_handler().await);
    }

    #[tokio::test]
    async fn session_closes_after_threshold_plus_one_missed_heartbeats() {
        let mut settings = RouterSettings::default();
        settings.heartbeat_interval = Duration::from_millis(10);
        settings.heartbeat_missed_threshold = 1;
        let session = Session::new(
            "sid-hb".to_owned(),
            None,
            Box::new(NullConnection),
            Arc::new(settings),
            Arc::new(Mutex::new(StatsCollector::new())),
        );

        session.start_heartbeat().await;

        // Fewer than (threshold + 1) intervals: still alive.
        tokio::time::sleep(Duration::from_millis(15)).await;
        assert!(!session.is_closed().await);

        // Past (threshold + 1) intervals with no inbound heartbeat reply: closed.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(session.is_closed().await);
    }
}

use std::time::Duration;

/// Router-wide tunables. Mirrors tornadio2's `DEFAULT_SETTINGS` dict, with
/// the same default values.
#[derive(Debug, Clone)]
pub struct RouterSettings {
    pub session_check_interval: Duration,
    pub session_expiry: Duration,
    pub heartbeat_interval: Duration,
    pub heartbeat_missed_threshold: u32,
    pub xhr_polling_timeout: Duration,
    pub client_timeout: Duration,
    pub enabled_protocols: Vec<&'static str>,
    pub websocket_check: bool,
    pub global_heartbeats: bool,
    pub namespace: String,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            session_check_interval: Duration::from_secs(15),
            session_expiry: Duration::from_secs(30),
            heartbeat_interval: Duration::from_secs(12),
            heartbeat_missed_threshold: 2,
            xhr_polling_timeout: Duration::from_secs(20),
            client_timeout: Duration::from_secs(5),
            enabled_protocols: vec![
                "websocket",
                "flashsocket",
                "xhr-polling",
                "jsonp-polling",
                "htmlfile",
            ],
            websocket_check: false,
            global_heartbeats: true,
            namespace: "socket.io".to_owned(),
        }
    }
}

impl RouterSettings {
    /// `heartbeat_timeout` advertised in the handshake descriptor.
    pub fn heartbeat_timeout(&self) -> Duration {
        self.heartbeat_interval + self.client_timeout
    }

    /// `close_timeout` advertised in the handshake descriptor.
    pub fn close_timeout(&self) -> Duration {
        self.xhr_polling_timeout + self.client_timeout
    }
}

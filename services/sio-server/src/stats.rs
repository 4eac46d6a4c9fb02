use std::collections::VecDeque;

const WINDOW: usize = 10;

/// A windowed moving average fed by a 1 Hz tick: each tick rotates the
/// current second's accumulated total into the window and drops the oldest
/// sample once the window exceeds [`WINDOW`] entries.
#[derive(Debug, Clone)]
pub struct MovingAverage {
    window: VecDeque<f64>,
    accumulator: f64,
}

impl MovingAverage {
    pub fn new() -> Self {
        Self { window: VecDeque::with_capacity(WINDOW), accumulator: 0.0 }
    }

    /// Records `n` occurrences within the current second.
    pub fn record(&mut self, n: f64) {
        self.accumulator += n;
    }

    /// Rotates the accumulator into the window. Called once per second.
    pub fn tick(&mut self) {
        self.window.push_back(self.accumulator);
        self.accumulator = 0.0;
        while self.window.len() > WINDOW {
            self.window.pop_front();
        }
    }

    /// The average per-second rate over the current window.
    pub fn value(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        self.window.iter().sum::<f64>() / self.window.len() as f64
    }
}

impl Default for MovingAverage {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time read of [`StatsCollector`]'s counters, suitable for
/// serializing straight onto the `GET /{ns}/1/stats` endpoint.
#[derive(Debug, Clone, serde::Serialize)]
pub struct StatsSnapshot {
    pub active_sessions: u64,
    pub max_sessions: u64,
    pub active_connections: u64,
    pub max_connections: u64,
    pub connections_per_sec: f64,
    pub packets_sent_per_sec: f64,
    pub packets_received_per_sec: f64,
}

/// Counters and moving averages for the router, driven by a 1 Hz tick task.
///
/// Not present as an HTTP surface in the reference implementation; this
/// repo adds a thin read-only endpoint over it (see `router.rs`).
#[derive(Debug, Default)]
pub struct StatsCollector {
    active_sessions: u64,
    max_sessions: u64,
    active_connections: u64,
    max_connections: u64,
    connections_per_sec: MovingAverage,
    packets_sent_per_sec: MovingAverage,
    packets_received_per_sec: MovingAverage,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_opened(&mut self) {
        self.active_sessions += 1;
        self.max_sessions = self.max_sessions.max(self.active_sessions);
        self.connections_per_sec.record(1.0);
    }

    pub fn session_closed(&mut self) {
        self.active_sessions = self.active_sessions.saturating_sub(1);
    }

    pub fn connection_attached(&mut self) {
        self.active_connections += 1;
        self.max_connections = self.max_connections.max(self.active_connections);
    }

    pub fn connection_detached(&mut self) {
        self.active_connections = self.active_connections.saturating_sub(1);
    }

    pub fn packets_sent(&mut self, n: usize) {
        self.packets_sent_per_sec.record(n as f64);
    }

    pub fn packets_received(&mut self, n: usize) {
        self.packets_received_per_sec.record(n as f64);
    }

    /// Rotates all moving averages. Called once per second by the router.
    pub fn tick(&mut self) {
        self.connections_per_sec.tick();
        self.packets_sent_per_sec.tick();
        self.packets_received_per_sec.tick();
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            active_sessions: self.active_sessions,
            max_sessions: self.max_sessions,
            active_connections: self.active_connections,
            max_connections: self.max_connections,
            connections_per_sec: self.connections_per_sec.value(),
            packets_sent_per_sec: self.packets_sent_per_sec.value(),
            packets_received_per_sec: self.packets_received_per_sec.value(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moving_average_value_is_mean_over_the_window() {
        let mut avg = MovingAverage::new();
        for n in [1.0, 2.0, 3.0] {
            avg.record(n);
            avg.tick();
        }
        assert_eq!(avg.value(), 2.0);
    }

    #[test]
    fn moving_average_drops_oldest_sample_past_window_size() {
        let mut avg = MovingAverage::new();
        for _ in 0..WINDOW {
            avg.record(1.0);
            avg.tick();
        }
        avg.record(11.0);
        avg.tick();
        // ten 1.0 samples plus one 11.0 sample: the oldest 1.0 is evicted.
        assert_eq!(avg.value(), (9.0 + 11.0) / WINDOW as f64);
    }

    #[test]
    fn session_open_close_tracks_active_and_max() {
        let mut stats = StatsCollector::new();
        stats.session_opened();
        stats.session_opened();
        stats.session_closed();
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.active_sessions, 1);
        assert_eq!(snapshot.max_sessions, 2);
    }

    #[test]
    fn session_closed_below_zero_saturates_at_zero() {
        let mut stats = StatsCollector::new();
        stats.session_closed();
        assert_eq!(stats.snapshot().active_sessions, 0);
    }
}

//! Connection health bookkeeping.
//!
//! [`MetricsRecorder`] keeps monotonic counters plus two bounded histories
//! (heartbeat latencies and an error log). It never drives control flow.
//! [`MetricsReporter`] periodically logs a summary of it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, warn};

/// Default length of the latency and error histories
pub const DEFAULT_HISTORY_LEN: usize = 50;

/// One heartbeat round trip
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PingSample {
    /// When the reply arrived
    pub timestamp: DateTime<Utc>,
    /// Round trip in milliseconds
    pub response_time_ms: f64,
}

/// One error-log entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorEntry {
    /// When the error was recorded
    pub timestamp: DateTime<Utc>,
    /// Error description
    pub error: String,
}

#[derive(Debug, Default)]
struct MetricsState {
    connection_attempts: u64,
    successful_connections: u64,
    disconnections: u64,
    heartbeats: u64,
    liveness_frames: u64,
    errors_total: u64,
    last_connected: Option<DateTime<Utc>>,
    last_disconnected: Option<DateTime<Utc>>,
    connection_start: Option<(DateTime<Utc>, Instant)>,
    ping_responses: VecDeque<PingSample>,
    error_log: VecDeque<ErrorEntry>,
}

/// Owned copy of the recorder state
#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSnapshot {
    /// Transport opens attempted
    pub connection_attempts: u64,
    /// Connects that reached the verified state
    pub successful_connections: u64,
    /// Links torn down after being opened
    pub disconnections: u64,
    /// Successful heartbeats
    pub heartbeats: u64,
    /// Inbound frames carrying the heartbeat identity
    pub liveness_frames: u64,
    /// Errors recorded since creation, including evicted ones
    pub errors_total: u64,
    /// Wall-clock time of the last successful connect
    pub last_connected: Option<DateTime<Utc>>,
    /// Wall-clock time of the last disconnect
    pub last_disconnected: Option<DateTime<Utc>>,
    /// Start of the current verified connection
    pub connection_start_time: Option<DateTime<Utc>>,
    /// Seconds since the current connection was verified, 0 when down
    pub uptime_seconds: f64,
    /// Most recent heartbeat latencies, oldest first
    pub ping_responses: Vec<PingSample>,
    /// Most recent errors, oldest first
    pub error_log: Vec<ErrorEntry>,
}

impl MetricsSnapshot {
    /// Mean heartbeat latency over the retained samples
    pub fn average_ping_ms(&self) -> Option<f64> {
        if self.ping_responses.is_empty() {
            return None;
        }
        let total: f64 = self.ping_responses.iter().map(|p| p.response_time_ms).sum();
        Some(total / self.ping_responses.len() as f64)
    }

    /// Whether a verified connection is currently up
    pub fn is_up(&self) -> bool {
        self.connection_start_time.is_some()
    }
}

/// Thread-safe metrics store shared by all client tasks
#[derive(Debug)]
pub struct MetricsRecorder {
    state: Mutex<MetricsState>,
    history_len: usize,
}

impl MetricsRecorder {
    /// Create a recorder keeping `history_len` latency samples and errors
    pub fn new(history_len: usize) -> Self {
        Self {
            state: Mutex::new(MetricsState::default()),
            history_len: history_len.max(1),
        }
    }

    fn state(&self) -> MutexGuard<'_, MetricsState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A transport open is about to be attempted
    pub fn record_attempt(&self) {
        self.state().connection_attempts += 1;
    }

    /// The link reached the verified state
    pub fn record_success(&self) {
        let mut state = self.state();
        let now = Utc::now();
        state.successful_connections += 1;
        state.last_connected = Some(now);
        state.connection_start = Some((now, Instant::now()));
    }

    /// An opened link was torn down
    pub fn record_disconnect(&self) {
        let mut state = self.state();
        state.disconnections += 1;
        state.last_disconnected = Some(Utc::now());
        state.connection_start = None;
    }

    /// A heartbeat succeeded after `latency`
    pub fn record_heartbeat(&self, latency: Duration) {
        let history_len = self.history_len;
        let mut state = self.state();
        state.heartbeats += 1;
        state.ping_responses.push_back(PingSample {
            timestamp: Utc::now(),
            response_time_ms: latency.as_micros() as f64 / 1000.0,
        });
        while state.ping_responses.len() > history_len {
            state.ping_responses.pop_front();
        }
    }

    /// A frame with the heartbeat identity arrived
    pub fn record_liveness(&self) {
        self.state().liveness_frames += 1;
    }

    /// Append to the error log, evicting the oldest entry when full
    pub fn record_error(&self, error: impl Into<String>) {
        let history_len = self.history_len;
        let error = error.into();
        debug!("Recording connection error: {}", error);

        let mut state = self.state();
        state.errors_total += 1;
        state.error_log.push_back(ErrorEntry {
            timestamp: Utc::now(),
            error,
        });
        while state.error_log.len() > history_len {
            state.error_log.pop_front();
        }
    }

    /// Time since the current connection was verified
    pub fn uptime(&self) -> Duration {
        self.state()
            .connection_start
            .map(|(_, started)| started.elapsed())
            .unwrap_or_default()
    }

    /// Copy the current state
    pub fn snapshot(&self) -> MetricsSnapshot {
        let state = self.state();
        let uptime = state
            .connection_start
            .map(|(_, started)| started.elapsed())
            .unwrap_or_default();

        MetricsSnapshot {
            connection_attempts: state.connection_attempts,
            successful_connections: state.successful_connections,
            disconnections: state.disconnections,
            heartbeats: state.heartbeats,
            liveness_frames: state.liveness_frames,
            errors_total: state.errors_total,
            last_connected: state.last_connected,
            last_disconnected: state.last_disconnected,
            connection_start_time: state.connection_start.map(|(at, _)| at),
            uptime_seconds: uptime.as_secs_f64(),
            ping_responses: state.ping_responses.iter().cloned().collect(),
            error_log: state.error_log.iter().cloned().collect(),
        }
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LEN)
    }
}

/// Shortest reporting interval accepted by [`MetricsReporter::with_interval`]
pub const MIN_REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// Periodic metrics logger
pub struct MetricsReporter {
    metrics: Arc<MetricsRecorder>,
    /// Reporting interval
    report_interval: Duration,
}

impl MetricsReporter {
    /// Create a reporter over `metrics`
    pub fn new(metrics: Arc<MetricsRecorder>) -> Self {
        Self {
            metrics,
            report_interval: Duration::from_secs(60),
        }
    }

    /// Set the reporting interval, raised to [`MIN_REPORT_INTERVAL`] if shorter
    pub fn with_interval(mut self, report_interval: Duration) -> Self {
        if report_interval < MIN_REPORT_INTERVAL {
            warn!(
                "Metrics interval {:?} too short, using {:?}",
                report_interval, MIN_REPORT_INTERVAL
            );
        }
        self.report_interval = report_interval.max(MIN_REPORT_INTERVAL);
        self
    }

    /// Spawn the reporting task; abort the handle to stop it
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut timer = interval(self.report_interval);
            let mut previous = MetricsSnapshot::default();

            info!(
                "Starting connection metrics task (interval: {:?})",
                self.report_interval
            );

            loop {
                timer.tick().await;

                let snapshot = self.metrics.snapshot();
                Self::log_metrics(&snapshot);
                Self::check_health(&previous, &snapshot);
                previous = snapshot;
            }
        })
    }

    fn log_metrics(snapshot: &MetricsSnapshot) {
        info!(
            "Connection Metrics - Up: {}, Uptime: {:.0}s, Attempts: {}, Connected: {}, Disconnects: {}, Heartbeats: {}, Errors: {}",
            snapshot.is_up(),
            snapshot.uptime_seconds,
            snapshot.connection_attempts,
            snapshot.successful_connections,
            snapshot.disconnections,
            snapshot.heartbeats,
            snapshot.errors_total
        );

        if let Some(avg) = snapshot.average_ping_ms() {
            info!(
                "Heartbeat latency: avg {:.1} ms over {} samples",
                avg,
                snapshot.ping_responses.len()
            );
        }
    }

    fn check_health(previous: &MetricsSnapshot, current: &MetricsSnapshot) {
        let new_errors = current.errors_total.saturating_sub(previous.errors_total);
        if new_errors > 0 {
            let last = current
                .error_log
                .last()
                .map(|e| e.error.as_str())
                .unwrap_or("");
            warn!(
                "{} connection error(s) since last report, latest: {}",
                new_errors, last
            );
        }

        if current.is_up() && previous.is_up() && current.heartbeats == previous.heartbeats {
            warn!("No successful heartbeat since last report");
        }

        if !current.is_up() {
            warn!("Controller link is down");
        }
    }
}

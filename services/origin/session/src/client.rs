//! Connection manager for the Origin controller.
//!
//! [`OriginClient`] owns the link lifecycle: opening the socket, verifying the
//! controller, starting and stopping the listener and watchdog, and
//! reconnecting with backoff after an unexpected loss. At most one
//! connect/reconnect sequence runs at a time; overlapping requests are
//! rejected rather than queued.

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::metrics::{MetricsRecorder, MetricsSnapshot};
use crate::notifications::NotificationChannel;
use crate::pending::PendingCommands;
use crate::reconnect::ReconnectPolicy;
use crate::transport::{self, FrameSink, FrameStream};
use crate::{listener, watchdog};
use futures::future::BoxFuture;
use origin_wire::{Message, Payload, HEARTBEAT_COMMAND, HEARTBEAT_DESTINATION};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{watch, Mutex as AsyncMutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Write half shared by all senders of one link
pub(crate) type SharedSink = Arc<AsyncMutex<FrameSink>>;

/// Lifecycle state of the link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket
    Disconnected,
    /// Socket open, controller not yet verified
    SocketOpen,
    /// Socket open and controller answered the verification query
    Verified,
}

/// The live link, guarded by one mutex that is never held across an await
struct Link {
    generation: u64,
    state: ConnectionState,
    sink: Option<SharedSink>,
    shutdown: Option<watch::Sender<bool>>,
    listener: Option<JoinHandle<()>>,
    watchdog: Option<JoinHandle<()>>,
}

/// Parts of a link removed by a teardown
pub(crate) struct Detached {
    sink: Option<SharedSink>,
    listener: Option<JoinHandle<()>>,
    watchdog: Option<JoinHandle<()>>,
}

impl Detached {
    /// Send a close frame on the detached socket
    pub(crate) async fn close_sink(&mut self) {
        if let Some(sink) = self.sink.take() {
            let mut sink = sink.lock().await;
            transport::close(&mut sink).await;
        }
    }

    /// Stop the watchdog, close the socket, and wait for the listener
    async fn finish(mut self) {
        if let Some(handle) = self.watchdog.take() {
            let _ = handle.await;
        }
        self.close_sink().await;
        if let Some(handle) = self.listener.take() {
            let _ = handle.await;
        }
    }
}

/// Holds the in-flight flag for one connect/reconnect sequence
struct ReconnectGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> ReconnectGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for ReconnectGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

pub(crate) struct Inner {
    pub(crate) config: ClientConfig,
    next_sequence: AtomicU64,
    pub(crate) pending: Arc<PendingCommands>,
    pub(crate) notifications: NotificationChannel,
    pub(crate) metrics: Arc<MetricsRecorder>,
    policy: Mutex<ReconnectPolicy>,
    in_flight: AtomicBool,
    recovery_requested: AtomicBool,
    close_epoch: AtomicU64,
    closed: Notify,
    link: Mutex<Link>,
}

impl Inner {
    fn link(&self) -> MutexGuard<'_, Link> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn policy(&self) -> MutexGuard<'_, ReconnectPolicy> {
        self.policy.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocate the next sequence id; the first is 1 and ids never repeat
    pub(crate) fn next_sequence_id(&self) -> u64 {
        self.next_sequence.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn current_sink(&self) -> Option<SharedSink> {
        self.link().sink.clone()
    }

    pub(crate) fn state(&self) -> ConnectionState {
        self.link().state
    }

    fn is_closed_since(&self, epoch: u64) -> bool {
        self.close_epoch.load(Ordering::Acquire) != epoch
    }

    /// Record a heartbeat-identity frame seen by the listener of `generation`.
    ///
    /// Only a `healthy` frame (no application error) promotes an open socket
    /// to `Verified`; an error-coded one still counts as liveness.
    pub(crate) fn mark_alive(&self, generation: u64, healthy: bool) {
        let mut link = self.link();
        if link.generation != generation || link.state == ConnectionState::Disconnected {
            return;
        }
        if healthy {
            link.state = ConnectionState::Verified;
        }
        drop(link);
        self.metrics.record_liveness();
    }

    /// Whether `generation` is still the live, verified link
    pub(crate) fn is_verified_link(&self, generation: u64) -> bool {
        let link = self.link();
        link.generation == generation && link.state == ConnectionState::Verified
    }

    /// Detach the current link and signal its tasks to stop.
    ///
    /// With `expected = Some(gen)` nothing happens unless `gen` is still the
    /// live link, so a task never tears down a link newer than its own.
    /// Returns `None` when there was nothing to tear down; callers that get
    /// `Some` own the shutdown of that link.
    pub(crate) fn teardown(&self, expected: Option<u64>) -> Option<Detached> {
        let mut link = self.link();
        if expected.is_some_and(|generation| generation != link.generation) {
            return None;
        }
        if link.sink.is_none() && link.state == ConnectionState::Disconnected {
            return None;
        }

        link.generation += 1;
        link.state = ConnectionState::Disconnected;
        if let Some(shutdown) = link.shutdown.take() {
            let _ = shutdown.send(true);
        }
        let detached = Detached {
            sink: link.sink.take(),
            listener: link.listener.take(),
            watchdog: link.watchdog.take(),
        };
        drop(link);

        self.metrics.record_disconnect();
        Some(detached)
    }

    /// Install a freshly opened socket and start its listener.
    ///
    /// Hands the socket back when `close()` ran after `epoch` was taken; the
    /// check happens under the link lock so it cannot race the teardown in
    /// `close()`.
    fn install_link(
        self: &Arc<Self>,
        epoch: u64,
        sink: FrameSink,
        stream: FrameStream,
    ) -> Result<u64, FrameSink> {
        let mut link = self.link();
        if self.is_closed_since(epoch) {
            return Err(sink);
        }
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        link.generation += 1;
        let generation = link.generation;
        link.state = ConnectionState::SocketOpen;
        link.sink = Some(Arc::new(AsyncMutex::new(sink)));
        link.shutdown = Some(shutdown_tx);
        link.listener = Some(listener::spawn(
            Arc::clone(self),
            generation,
            stream,
            shutdown_rx,
        ));
        Ok(generation)
    }

    /// Mark `generation` verified and start its watchdog
    fn promote(self: &Arc<Self>, epoch: u64, generation: u64) -> bool {
        let mut link = self.link();
        if link.generation != generation
            || link.state == ConnectionState::Disconnected
            || self.is_closed_since(epoch)
        {
            return false;
        }
        link.state = ConnectionState::Verified;
        if link.watchdog.is_none() {
            if let Some(shutdown) = link.shutdown.as_ref().map(|tx| tx.subscribe()) {
                link.watchdog = Some(watchdog::spawn(Arc::clone(self), generation, shutdown));
            }
        }
        true
    }

    /// Open, verify, and start tasks. Caller holds the in-flight guard.
    ///
    /// Gives up without installing anything once `close()` has run since
    /// `epoch` was read.
    async fn connect_locked(self: &Arc<Self>, epoch: u64) -> bool {
        if let Some(stale) = self.teardown(None) {
            debug!("Closing stale link before connecting");
            stale.finish().await;
        }

        let url = self.config.url.clone();
        self.metrics.record_attempt();
        info!("Connecting to {}", url);

        let (sink, stream) = match transport::open(&url, self.config.connect_timeout).await {
            Ok(parts) => parts,
            Err(e) => {
                error!("Connection to {} failed: {}", url, e);
                self.metrics.record_error(format!("Connection failed: {}", e));
                return false;
            }
        };

        let generation = match self.install_link(epoch, sink, stream) {
            Ok(generation) => generation,
            Err(mut sink) => {
                info!("Connect abandoned: client closed while opening {}", url);
                transport::close(&mut sink).await;
                return false;
            }
        };
        debug!("Socket open (generation {}), verifying controller", generation);

        let reply = self
            .send_command(
                HEARTBEAT_DESTINATION,
                HEARTBEAT_COMMAND,
                Payload::new(),
                self.config.verify_timeout,
                false,
            )
            .await;

        let failure = match reply {
            Some(reply) if reply.is_success() => {
                if self.promote(epoch, generation) {
                    self.policy().reset();
                    self.recovery_requested.store(false, Ordering::Release);
                    self.metrics.record_success();
                    info!("Connected and verified with {}", url);
                    return true;
                }
                "Link closed during verification".to_string()
            }
            Some(reply) => format!(
                "Verification failed: ErrorCode={:?} {}",
                reply.error_code,
                reply.error_message.unwrap_or_default()
            ),
            None => format!(
                "Verification failed: no response within {:?}",
                self.config.verify_timeout
            ),
        };

        error!("{}", failure);
        self.metrics.record_error(failure);
        if let Some(detached) = self.teardown(Some(generation)) {
            detached.finish().await;
        }
        false
    }

    /// One reconnect sequence. Caller holds the in-flight guard.
    async fn reconnect_locked(self: &Arc<Self>) -> bool {
        self.recovery_requested.store(false, Ordering::Release);
        let epoch = self.close_epoch.load(Ordering::Acquire);

        loop {
            if self.is_closed_since(epoch) {
                info!("Reconnect abandoned: client closed");
                return false;
            }

            let next = self.policy().next_attempt();
            let Some(attempt) = next else {
                let err = ClientError::ExhaustedRetries(self.policy().max_attempts());
                error!("{}; call connect() to try again", err);
                self.metrics.record_error(err.to_string());
                return false;
            };

            let wait = self.policy().jittered_backoff(attempt);
            info!(
                "Reconnecting to {} in {:?} (attempt {}/{})",
                self.config.url, wait, attempt, self.config.max_reconnect_attempts
            );

            let closed = self.closed.notified();
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = closed => {}
            }
            if self.is_closed_since(epoch) {
                info!("Reconnect abandoned: client closed");
                return false;
            }

            let dropped = self.notifications.drain();
            if dropped > 0 {
                debug!("Discarded {} stale notifications before reconnect", dropped);
            }

            if self.connect_locked(epoch).await {
                info!("Reconnected after {} attempt(s)", attempt);
                return true;
            }
            warn!("Reconnect attempt {} failed", attempt);
        }
    }

    async fn connect(self: &Arc<Self>) -> bool {
        let Some(guard) = ReconnectGuard::acquire(&self.in_flight) else {
            warn!("Connect rejected: a connection attempt is already in progress");
            return false;
        };
        let epoch = self.close_epoch.load(Ordering::Acquire);
        let connected = self.connect_locked(epoch).await;
        drop(guard);
        self.follow_up_recovery();
        connected
    }

    async fn reconnect(self: &Arc<Self>) -> bool {
        let Some(guard) = ReconnectGuard::acquire(&self.in_flight) else {
            debug!("Reconnect skipped: a connection attempt is already in progress");
            return false;
        };
        let connected = self.reconnect_locked().await;
        drop(guard);
        self.follow_up_recovery();
        connected
    }

    /// Re-run recovery requested while the guard was held
    fn follow_up_recovery(self: &Arc<Self>) {
        if self.recovery_requested.load(Ordering::Acquire)
            && self.state() != ConnectionState::Verified
        {
            self.spawn_recovery("recovery requested during connect".to_string());
        }
    }

    /// Start a reconnect sequence in the background
    pub(crate) fn spawn_recovery(self: &Arc<Self>, reason: String) {
        if !self.config.auto_reconnect {
            info!("Auto-reconnect disabled, staying disconnected ({})", reason);
            return;
        }

        self.recovery_requested.store(true, Ordering::Release);
        let epoch = self.close_epoch.load(Ordering::Acquire);
        let inner = Arc::clone(self);
        let task: BoxFuture<'static, ()> = Box::pin(async move {
            if inner.is_closed_since(epoch) {
                return;
            }
            debug!("Starting recovery: {}", reason);
            inner.reconnect().await;
        });
        tokio::spawn(task);
    }

    async fn close(&self) {
        self.close_epoch.fetch_add(1, Ordering::AcqRel);
        self.recovery_requested.store(false, Ordering::Release);
        self.closed.notify_waiters();

        match self.teardown(None) {
            Some(detached) => {
                info!("Closing connection to {}", self.config.url);
                detached.finish().await;
            }
            None => debug!("Close requested with no open link"),
        }
    }
}

/// Client for the Origin mount control endpoint.
///
/// Cheap to clone; all clones share one link, one sequence counter, and one
/// metrics store.
#[derive(Clone)]
pub struct OriginClient {
    pub(crate) inner: Arc<Inner>,
}

impl OriginClient {
    /// Create a disconnected client
    pub fn new(config: ClientConfig) -> Self {
        let policy = ReconnectPolicy::new(
            config.max_reconnect_attempts,
            config.backoff_base,
            config.backoff_max,
        );
        let metrics = Arc::new(MetricsRecorder::new(config.history_len));

        Self {
            inner: Arc::new(Inner {
                config,
                next_sequence: AtomicU64::new(0),
                pending: Arc::new(PendingCommands::new()),
                notifications: NotificationChannel::new(),
                metrics,
                policy: Mutex::new(policy),
                in_flight: AtomicBool::new(false),
                recovery_requested: AtomicBool::new(false),
                close_epoch: AtomicU64::new(0),
                closed: Notify::new(),
                link: Mutex::new(Link {
                    generation: 0,
                    state: ConnectionState::Disconnected,
                    sink: None,
                    shutdown: None,
                    listener: None,
                    watchdog: None,
                }),
            }),
        }
    }

    /// Client configuration
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Open and verify a link.
    ///
    /// Returns `false` without side effects when another connect or reconnect
    /// is in flight, and `false` after a full teardown when the socket cannot
    /// be opened or the controller fails verification.
    pub async fn connect(&self) -> bool {
        self.inner.connect().await
    }

    /// Run one reconnect sequence with backoff, up to the attempt cap
    pub async fn reconnect(&self) -> bool {
        self.inner.reconnect().await
    }

    /// Stop the watchdog and listener, close the socket, and suppress
    /// automatic recovery for this shutdown
    pub async fn close(&self) {
        self.inner.close().await
    }

    /// Send a command and wait up to `timeout` for its response.
    ///
    /// `None` when not connected, on send failure, or on timeout. A response
    /// with a nonzero `ErrorCode` is still returned.
    pub async fn send_command(
        &self,
        destination: &str,
        command: &str,
        payload: Payload,
        timeout: Duration,
        verbose: bool,
    ) -> Option<Message> {
        self.inner
            .send_command(destination, command, payload, timeout, verbose)
            .await
    }

    /// Send a command with the default timeout
    pub async fn command(
        &self,
        destination: &str,
        command: &str,
        payload: Payload,
    ) -> Option<Message> {
        self.send_command(
            destination,
            command,
            payload,
            self.inner.config.command_timeout,
            true,
        )
        .await
    }

    /// Current link state
    pub fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    /// Whether the socket is open and the controller verified
    pub fn is_connected_and_verified(&self) -> bool {
        self.state() == ConnectionState::Verified
    }

    /// Owned copy of the connection metrics
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// Shared metrics store, e.g. for a [`MetricsReporter`](crate::MetricsReporter)
    pub fn metrics(&self) -> Arc<MetricsRecorder> {
        Arc::clone(&self.inner.metrics)
    }

    /// Take the oldest queued notification without waiting
    pub fn try_next_notification(&self) -> Option<Message> {
        self.inner.notifications.try_pop()
    }

    /// Wait for the next notification
    pub async fn next_notification(&self) -> Message {
        self.inner.notifications.pop().await
    }

    /// Wait up to `timeout` for the next notification
    pub async fn next_notification_timeout(&self, timeout: Duration) -> Option<Message> {
        self.inner.notifications.pop_timeout(timeout).await
    }

    /// Number of queued notifications
    pub fn pending_notifications(&self) -> usize {
        self.inner.notifications.len()
    }

    /// Number of commands awaiting a response
    pub fn pending_commands(&self) -> usize {
        self.inner.pending.len()
    }
}

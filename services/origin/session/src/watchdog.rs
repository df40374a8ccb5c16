//! Periodic heartbeat for a verified link.
//!
//! A failed heartbeat tears the link down and starts recovery; the next
//! successful connect spawns a fresh watchdog.

use crate::client::Inner;
use origin_wire::{Payload, HEARTBEAT_COMMAND, HEARTBEAT_DESTINATION};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Spawn the watchdog for link `generation`
pub(crate) fn spawn(
    inner: Arc<Inner>,
    generation: u64,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(run(inner, generation, shutdown))
}

async fn run(inner: Arc<Inner>, generation: u64, mut shutdown: watch::Receiver<bool>) {
    let interval = inner.config.heartbeat_interval;
    debug!(
        "Watchdog started (generation {}, interval {:?})",
        generation, interval
    );

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(interval) => {}
        }

        if !inner.is_verified_link(generation) {
            debug!("Watchdog idle: link {} no longer verified", generation);
            break;
        }

        let started = Instant::now();
        let reply = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            reply = inner.send_command(
                HEARTBEAT_DESTINATION,
                HEARTBEAT_COMMAND,
                Payload::new(),
                inner.config.heartbeat_timeout,
                false,
            ) => reply,
        };

        let failure = match reply {
            Some(reply) if reply.is_success() => {
                let latency = started.elapsed();
                inner.metrics.record_heartbeat(latency);
                debug!("Heartbeat ok in {:?}", latency);
                continue;
            }
            Some(reply) => format!(
                "Heartbeat failed: ErrorCode={:?} {}",
                reply.error_code,
                reply.error_message.unwrap_or_default()
            ),
            None => format!(
                "Heartbeat failed: no response within {:?}",
                inner.config.heartbeat_timeout
            ),
        };

        warn!("{}", failure);
        inner.metrics.record_error(failure.clone());
        if let Some(mut detached) = inner.teardown(Some(generation)) {
            detached.close_sink().await;
            inner.spawn_recovery(failure);
        }
        return;
    }

    debug!("Watchdog stopped (generation {})", generation);
}

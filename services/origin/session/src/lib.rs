//! WebSocket client for the Celestron Origin mount control endpoint.
//!
//! This crate owns the connection to the telescope controller: opening and
//! verifying the link, correlating commands with responses, delivering
//! unsolicited notifications, detecting loss with a heartbeat, and recovering
//! with bounded exponential backoff.
//!
//! ## Features
//!
//! - **Verified Connect**: a link counts as up only after the controller
//!   answers `System/GetVersion` with `ErrorCode = 0`
//! - **Correlation**: per-command sequence ids with deadlines; pending
//!   entries are always freed
//! - **Notifications**: unbounded FIFO of unsolicited events
//! - **Watchdog**: periodic heartbeat with latency history
//! - **Auto-reconnect**: exponential backoff with jitter, capped attempts
//! - **Artifacts**: streamed HTTP download of images announced by the
//!   controller
//!
//! ## Example
//!
//! ```rust,no_run
//! use origin_session::{ClientConfig, OriginClient};
//! use origin_wire::ImageReady;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = OriginClient::new(ClientConfig::for_host("192.168.1.10"));
//!
//! if !client.connect().await {
//!     anyhow::bail!("controller not reachable");
//! }
//!
//! if let Some(status) = client.get_mount_status().await {
//!     println!("Mount status: {:?}", status.payload);
//! }
//!
//! client.run_sample_capture(1.0, 800, 1).await;
//! loop {
//!     let event = client.next_notification().await;
//!     if let Some(image) = ImageReady::from_message(&event) {
//!         client.download_artifact(&image.file_location, "capture.jpg").await?;
//!         break;
//!     }
//! }
//!
//! client.close().await;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod commands;
pub mod config;
pub mod download;
pub mod error;
pub mod metrics;
pub mod notifications;
pub mod pending;
pub mod reconnect;
pub mod transport;

mod dispatcher;
mod listener;
mod watchdog;

#[cfg(test)]
mod testing;

// Re-export main types
pub use client::{ConnectionState, OriginClient};
pub use config::ClientConfig;
pub use download::artifact_url;
pub use error::{ClientError, Result};
pub use metrics::{
    ErrorEntry, MetricsRecorder, MetricsReporter, MetricsSnapshot, PingSample,
    DEFAULT_HISTORY_LEN,
};
pub use notifications::NotificationChannel;
pub use pending::{PendingCommands, PendingSlot};
pub use reconnect::ReconnectPolicy;

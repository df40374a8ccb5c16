//! Origin telescope client binary.
//!
//! Connects to a Celestron Origin controller, runs a health check over every
//! subsystem, and optionally keeps watching notifications, downloading
//! sample captures as they are announced.

use clap::Parser;
use origin_session::{MetricsReporter, OriginClient};
use origin_wire::{ImageReady, Message};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod logging;

use config::ScopeConfig;
use logging::OriginLogFormatter;

// Component logging macros are defined in logging.rs and available via #[macro_export]

/// Celestron Origin controller client
#[derive(Parser, Debug)]
#[command(name = "origin-client", version, about = "Celestron Origin controller client")]
struct Args {
    /// Controller host, optionally host:port (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// Path to the YAML configuration file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Keep running and log notifications until interrupted
    #[arg(long)]
    watch: bool,

    /// Download SAMPLE_CAPTURE images into this directory (overrides config)
    #[arg(long)]
    observations_dir: Option<PathBuf>,

    /// Interval between metrics reports, e.g. 60s
    #[arg(long, default_value = "60s")]
    metrics_interval: humantime::Duration,

    /// Heartbeat interval, e.g. 5s (overrides config)
    #[arg(long)]
    heartbeat_interval: Option<humantime::Duration>,

    /// Default command timeout, e.g. 10s (overrides config)
    #[arg(long)]
    command_timeout: Option<humantime::Duration>,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let env_filter = EnvFilter::new("info")
        .add_directive(format!("origin_client={}", args.log_level).parse()?)
        .add_directive(format!("origin_session={}", args.log_level).parse()?)
        .add_directive(format!("origin_wire={}", args.log_level).parse()?);

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .event_format(OriginLogFormatter::new("origin".to_string()))
        .init();

    info!("Starting Origin client v{}", env!("CARGO_PKG_VERSION"));

    let mut scope_config = ScopeConfig::load_from_file(&args.config)?;
    if let Some(host) = args.host.clone() {
        scope_config.host = host;
    }
    if let Some(dir) = args.observations_dir.clone() {
        scope_config.observations_dir = Some(dir);
    }

    let mut client_config = scope_config.to_client_config();
    if let Some(interval) = args.heartbeat_interval {
        client_config.heartbeat_interval = interval.into();
    }
    if let Some(timeout) = args.command_timeout {
        client_config.command_timeout = timeout.into();
    }

    let client = OriginClient::new(client_config);
    let reporter = MetricsReporter::new(client.metrics())
        .with_interval(args.metrics_interval.into())
        .start();

    if !client.connect().await {
        reporter.abort();
        let snapshot = client.metrics_snapshot();
        let last_error = snapshot
            .error_log
            .last()
            .map(|e| e.error.clone())
            .unwrap_or_default();
        anyhow::bail!(
            "Could not connect to controller at {}: {}",
            client.config().url,
            last_error
        );
    }

    run_health_check(&client).await;

    if args.watch {
        watch_notifications(&client, scope_config.observations_dir.as_deref()).await?;
    }

    client.close().await;
    reporter.abort();

    let snapshot = client.metrics_snapshot();
    info!(
        "Session summary: {} attempts, {} connects, {} disconnects, {} heartbeats (avg {:.1} ms), {} errors",
        snapshot.connection_attempts,
        snapshot.successful_connections,
        snapshot.disconnections,
        snapshot.heartbeats,
        snapshot.average_ping_ms().unwrap_or_default(),
        snapshot.errors_total
    );

    Ok(())
}

/// One-line summary of a reply for logs
fn summarize(reply: &Option<Message>) -> String {
    match reply {
        None => "no response".to_string(),
        Some(reply) => match reply.application_error() {
            Some(code) => format!(
                "error {} {}",
                code,
                reply.error_message.as_deref().unwrap_or("")
            ),
            None => serde_json::to_string(&reply.payload)
                .unwrap_or_else(|_| "<unprintable payload>".to_string()),
        },
    }
}

/// Query every subsystem once and log what came back
async fn run_health_check(client: &OriginClient) {
    component_info!("health", "Running controller health check");

    let checks = [
        ("System version", client.get_system_version().await),
        ("System model", client.get_system_model().await),
        ("Disk", client.get_disk_status().await),
        (
            "Factory calibration",
            client.get_factory_calibration_status().await,
        ),
        ("Mount", client.get_mount_status().await),
        ("Camera info", client.get_camera_info().await),
        ("Camera filter", client.get_camera_filter().await),
        ("Focuser", client.get_focuser_status().await),
        ("Environment", client.get_environment_status().await),
        ("Fans", client.get_environment_fans().await),
        ("Dew heater", client.get_dew_heater_status().await),
        (
            "Orientation sensor",
            client.get_orientation_sensor_status().await,
        ),
    ];

    let mut healthy = 0;
    for (label, reply) in &checks {
        let ok = reply.as_ref().is_some_and(Message::is_success);
        if ok {
            healthy += 1;
            component_info!("health", "{}: {}", label, summarize(reply));
        } else {
            component_warn!("health", "{}: {}", label, summarize(reply));
        }
    }

    component_info!(
        "health",
        "Health check complete: {}/{} subsystems ok",
        healthy,
        checks.len()
    );
}

/// Log notifications until SIGINT/SIGTERM, downloading announced captures
async fn watch_notifications(
    client: &OriginClient,
    observations_dir: Option<&Path>,
) -> anyhow::Result<()> {
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to install SIGTERM handler: {}", e))?;
    let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to install SIGINT handler: {}", e))?;

    info!("Watching controller notifications, press Ctrl+C to stop");

    loop {
        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
                break;
            }
            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down");
                break;
            }
            event = client.next_notification() => {
                handle_notification(client, &event, observations_dir).await;
            }
        }
    }

    Ok(())
}

async fn handle_notification(
    client: &OriginClient,
    event: &Message,
    observations_dir: Option<&Path>,
) {
    let Some(image) = ImageReady::from_message(event) else {
        debug!("Notification {}/{}", event.source, event.command);
        return;
    };

    component_info!(
        "observations",
        "New {} image at {}",
        image.image_type,
        image.file_location
    );

    let Some(dir) = observations_dir else {
        return;
    };
    if !image.is_sample_capture() {
        return;
    }

    let file_name = Path::new(&image.file_location)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "capture.jpg".to_string());
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let target = dir.join(format!("{}_{}", stamp, file_name));

    match client.download_artifact(&image.file_location, &target).await {
        Ok(bytes) => component_info!(
            "observations",
            "Saved {} ({} bytes)",
            target.display(),
            bytes
        ),
        Err(e) => error!("Failed to save {}: {}", image.file_location, e),
    }

    if !client.is_connected_and_verified() {
        warn!("Controller link is down, waiting for reconnect");
    }
}

//! Meta server binary: parses flags, installs logging and metrics, then runs
//! the coordinator behind its HTTP adapter until the topology finishes, a
//! fatal error occurs, or the process is interrupted.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use meta_server::{MetaServerConfig, MetaServerNode, NetworkConfig, NetworkModule};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Cli {
    /// Number of compute nodes in the group.
    #[arg(long, env = "META_TOTAL_NODE_NUM")]
    total_node_num: u32,

    /// Seconds without a heartbeat before a node is marked as timed out.
    #[arg(long, env = "META_HEARTBEAT_TIMEOUT_SECS", default_value_t = 30)]
    heartbeat_timeout_secs: u64,

    /// Seconds between topology evaluations.
    #[arg(long, env = "META_MONITOR_TICK_SECS", default_value_t = 3)]
    monitor_tick_secs: u64,

    /// Seconds the group may take to form before the server gives up.
    #[arg(long, env = "META_FORMATION_TIMEOUT_SECS", default_value_t = 600)]
    formation_timeout_secs: u64,

    /// Persist the formed topology and restore it after a restart.
    #[arg(long, env = "META_RECOVERY")]
    recovery: bool,

    /// Recovery file location, required with `--recovery`.
    #[arg(long, env = "META_RECOVERY_FILE", value_name = "FILE")]
    recovery_file: Option<PathBuf>,

    /// Seconds to wait for in-flight requests on shutdown.
    #[arg(long, env = "META_DRAIN_TIMEOUT_SECS", default_value_t = 10)]
    drain_timeout_secs: u64,

    #[arg(long, env = "META_HOST", default_value = "0.0.0.0")]
    host: String,

    #[arg(long, env = "META_PORT", default_value_t = 8000)]
    port: u16,

    #[arg(value_enum, long, env = "META_LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,

    /// Serve Prometheus metrics on this address.
    #[arg(long, env = "META_METRICS_ADDR")]
    metrics_addr: Option<SocketAddr>,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

impl Cli {
    fn server_config(&self) -> MetaServerConfig {
        MetaServerConfig {
            total_node_num: self.total_node_num,
            heartbeat_timeout: Duration::from_secs(self.heartbeat_timeout_secs),
            monitor_tick: Duration::from_secs(self.monitor_tick_secs),
            formation_timeout: Duration::from_secs(self.formation_timeout_secs),
            recovery_enabled: self.recovery,
            recovery_file: self.recovery_file.clone(),
            drain_timeout: Duration::from_secs(self.drain_timeout_secs),
        }
    }

    fn network_config(&self) -> NetworkConfig {
        NetworkConfig {
            host: self.host.clone(),
            port: self.port,
            ..NetworkConfig::default()
        }
    }
}

fn init_logging(format: LogFormat) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let layer = match format {
        LogFormat::Text => tracing_subscriber::fmt::layer().boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer().json().boxed(),
    };
    tracing_subscriber::registry()
        .with(layer.with_filter(filter))
        .try_init()?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Some(addr) = cli.metrics_addr {
        PrometheusBuilder::new().with_http_listener(addr).install()?;
        info!("Prometheus metrics listening on {addr}");
    }

    let node = Arc::new(MetaServerNode::new(cli.server_config())?);
    node.initialize().await?;

    let mut network = NetworkModule::new(cli.network_config(), Arc::clone(&node));
    let port = network.start().await?;
    info!(
        total_node_num = cli.total_node_num,
        port, "Meta server started"
    );

    network.serve(shutdown_signal()).await?;
    node.finalize().await?;
    info!("Meta server stopped");
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = init_logging(cli.log_format) {
        eprintln!("failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Meta server failed: {e:#}");
            ExitCode::FAILURE
        }
    }
}

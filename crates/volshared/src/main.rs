//! volshared - share manager daemon.
//!
//! Serves the share manager and health gRPC services for one volume.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use volshare::config::{DEFAULT_EXPORT_CONFIG, ShareConfig};
use volshare::export::GANESHA_PROCESS;
use volshare::health::HealthReporter;
use volshare::share::ShareController;
use volshare_common::{DataEngine, Volume};

mod grpc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Name of the volume to share. Empty leaves every operation a no-op.
    #[arg(long, env = "VOLSHARE_VOLUME_NAME", default_value = "")]
    volume_name: String,

    /// Data engine of the volume (v1 or v2)
    #[arg(long, env = "VOLSHARE_DATA_ENGINE", default_value = "v1")]
    data_engine: DataEngine,

    /// The volume is a LUKS container
    #[arg(long, env = "VOLSHARE_ENCRYPTED")]
    encrypted: bool,

    /// Passphrase of an encrypted volume
    #[arg(long, env = "VOLSHARE_PASSPHRASE", hide_env_values = true)]
    passphrase: Option<String>,

    /// Address to serve gRPC on
    #[arg(long, env = "VOLSHARE_LISTEN", default_value = "0.0.0.0:9600")]
    listen: SocketAddr,

    /// Ganesha export configuration file
    #[arg(long, env = "VOLSHARE_EXPORT_CONFIG", default_value = DEFAULT_EXPORT_CONFIG)]
    export_config: PathBuf,

    /// Process name of the NFS server
    #[arg(long, env = "VOLSHARE_EXPORT_SERVER", default_value = GANESHA_PROCESS)]
    export_server: String,

    /// Unmount attempts while the mount point is busy
    #[arg(long, env = "VOLSHARE_UNMOUNT_RETRIES", default_value_t = 30)]
    unmount_retries: u32,

    /// Delay between busy unmount attempts, in milliseconds
    #[arg(long, env = "VOLSHARE_UNMOUNT_RETRY_INTERVAL_MS", default_value_t = 1000)]
    unmount_retry_interval_ms: u64,

    /// Timeout of external commands, in seconds
    #[arg(long, env = "VOLSHARE_COMMAND_TIMEOUT", default_value_t = 60)]
    command_timeout: u64,

    /// Emit logs as JSON
    #[arg(long, env = "VOLSHARE_LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn volume(&self) -> Volume {
        let mut volume = Volume::new(self.volume_name.clone(), self.data_engine);
        volume.encrypted = self.encrypted;
        if let Some(passphrase) = &self.passphrase {
            volume = volume.with_passphrase(passphrase.clone());
        }
        volume
    }

    fn config(&self) -> ShareConfig {
        ShareConfig::default()
            .with_export_config(&self.export_config)
            .with_export_server(&self.export_server)
            .with_unmount_retry(
                self.unmount_retries,
                Duration::from_millis(self.unmount_retry_interval_ms),
            )
            .with_command_timeout(Duration::from_secs(self.command_timeout))
    }
}

fn init_tracing(json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
        }
    };

    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("Shutting down share manager");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json)?;

    let volume = args.volume();
    let config = args.config();
    if volume.is_bound() {
        config
            .paths
            .create_dirs()
            .with_context(|| format!("failed to create {}", config.paths.export_root.display()))?;
    }

    tracing::info!(
        volume = %volume.name,
        data_engine = %volume.data_engine,
        encrypted = volume.encrypted,
        "Starting share manager"
    );

    let watch_interval = config.health_watch_interval;
    let controller = Arc::new(ShareController::with_system_adapters(volume, config));
    let reporter = HealthReporter::new(Some(Arc::clone(&controller)), watch_interval);

    tracing::info!("gRPC server listening on {}", args.listen);
    tonic::transport::Server::builder()
        .add_service(grpc::share_server(controller))
        .add_service(grpc::health_server(reporter))
        .serve_with_shutdown(args.listen, shutdown_signal())
        .await
        .context("gRPC server failed")?;

    Ok(())
}

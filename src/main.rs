use std::path::Path;
use std::path::PathBuf;

use labkv::utils;
use labkv::NodeBuilder;
use labkv::Result;
use labkv::Settings;
use tokio::signal::unix::signal;
use tokio::signal::unix::SignalKind;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<()> {
    let settings = Settings::load(None)?;

    // Initializing Logs
    let _guard = init_observability(&settings.cluster.member_name(), &settings.cluster.log_dir)?;

    // Initializing Shutdown Signal
    let cancel = CancellationToken::new();
    let (metrics_tx, metrics_rx) = watch::channel(());

    if settings.monitoring.prometheus_enabled {
        let port = settings.monitoring.prometheus_port;
        tokio::spawn(async move {
            labkv::start_server(port, metrics_rx).await;
        });
    }

    // Build Node
    let node = NodeBuilder::new(settings).build()?;

    info!("Application started. Waiting for CTRL+C signal...");
    // Listen on Shutdown Signal
    let shutdown_cancel = cancel.clone();
    tokio::spawn(async move {
        graceful_shutdown(shutdown_cancel, metrics_tx).await;
    });

    // Start Node
    if let Err(e) = node.run(cancel).await {
        error!("node stops: {:?}", e);
    }

    println!("Exiting program.");
    Ok(())
}

async fn graceful_shutdown(cancel: CancellationToken, metrics_tx: watch::Sender<()>) {
    let mut sigint = signal(SignalKind::interrupt()).unwrap();
    let mut sigterm = signal(SignalKind::terminate()).unwrap();
    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT detected.");
        },
        _ = sigterm.recv() => {
            info!("SIGTERM detected.");
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl+C detected.");
        },
    }

    cancel.cancel();
    let _ = metrics_tx.send(());
    info!("Shutdown completed");
}

pub fn init_observability(node_name: &str, log_dir: &PathBuf) -> Result<WorkerGuard> {
    let log_file =
        utils::open_file_for_append(Path::new(log_dir).join(format!("{}/labkv.log", node_name)))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(log_file);
    let base_subscriber = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(base_subscriber).init();

    Ok(guard)
}

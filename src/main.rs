use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use wingslot::compactor::run_compactor;
use wingslot::config::{Config, StorageKind};
use wingslot::engine::Engine;
use wingslot::http::{self, AppState};
use wingslot::identity::TrustedHeader;
use wingslot::notify::NotifyHub;
use wingslot::repository::{BookingRepository, MemoryRepository, WalRepository};

/// How long in-flight requests get to finish after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    wingslot::observability::init_logging();

    let config = Config::from_env()?;
    wingslot::observability::init_metrics(config.metrics_port)?;

    let shutdown = CancellationToken::new();
    let mut compactor = None;

    let repo: Arc<dyn BookingRepository> = match config.storage {
        StorageKind::Wal => {
            std::fs::create_dir_all(&config.data_dir)?;
            let wal = Arc::new(WalRepository::open(&config.wal_path())?);
            compactor = Some(tokio::spawn(run_compactor(
                wal.clone(),
                config.compact_threshold,
                shutdown.clone(),
            )));
            wal
        }
        StorageKind::Memory => {
            warn!("memory storage selected: bookings are lost on restart");
            Arc::new(MemoryRepository::new())
        }
    };

    let engine = Arc::new(Engine::open(repo, Arc::new(NotifyHub::new())).await?);
    let identity = Arc::new(TrustedHeader::new(config.actor_header.clone()));
    let app = http::router(AppState::new(engine, identity).with_shutdown(shutdown.clone()));

    let addr = config.addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("wingslot listening on {addr}");
    info!("  storage: {:?}", config.storage);
    info!("  data_dir: {}", config.data_dir.display());
    info!("  actor header: {}", config.actor_header);
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    // One token stops the accept loop, open event streams and the compactor.
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_token.cancel();
    });

    http::serve(listener, app, shutdown.clone(), DRAIN_TIMEOUT).await?;

    shutdown.cancel();
    if let Some(handle) = compactor {
        handle.await?;
    }

    info!("wingslot stopped");
    Ok(())
}

/// Resolves on ctrl-c, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("ctrl-c handler unavailable: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                warn!("SIGTERM handler unavailable: {e}");
                ctrl_c.await;
            }
        }
    }
    #[cfg(not(unix))]
    ctrl_c.await;

    info!("shutdown signal received");
}

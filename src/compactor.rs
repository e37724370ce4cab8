use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::repository::WalRepository;

const CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Background task that compacts the booking log once `threshold` appends
/// have accumulated since the last compaction. Stops when `shutdown` fires.
pub async fn run_compactor(repo: Arc<WalRepository>, threshold: u64, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(CHECK_INTERVAL);
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.cancelled() => {
                info!("compactor stopped");
                return;
            }
        }
        compact_if_needed(&repo, threshold).await;
    }
}

/// Returns true when a compaction ran successfully.
pub async fn compact_if_needed(repo: &WalRepository, threshold: u64) -> bool {
    let appends = repo.appends_since_compact().await;
    if appends < threshold {
        return false;
    }
    match repo.compact().await {
        Ok(()) => {
            info!("compacted booking log after {appends} appends");
            true
        }
        Err(e) => {
            error!("log compaction failed: {e}");
            false
        }
    }
}

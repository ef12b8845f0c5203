use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::engine::{now_ms, Engine};

/// Background task that expires stale reservations and purges old archives.
pub async fn run_sweeper(engine: Arc<Engine>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        sweep_once(&engine).await;
    }
}

/// One sweeper pass at the current wall clock.
pub async fn sweep_once(engine: &Engine) -> (usize, usize) {
    let now = now_ms();
    let expired = engine.sweep_expired(now).await.len();
    let purged = engine.purge_archived(now).await;
    (expired, purged)
}

/// Background task that rewrites the journal once enough appends pile up.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    loop {
        interval.tick().await;
        compact_if_due(&engine, threshold).await;
    }
}

pub async fn compact_if_due(engine: &Engine, threshold: u64) -> bool {
    let appends = engine.appends_since_compact().await;
    if appends < threshold {
        return false;
    }
    match engine.compact().await {
        Ok(()) => {
            info!("compaction after {appends} appends");
            true
        }
        Err(e) => {
            tracing::error!("compaction failed: {e}");
            false
        }
    }
}

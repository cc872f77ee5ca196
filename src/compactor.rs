use std::sync::Weak;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::engine::Engine;

const CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// Background task that compacts the WAL once `threshold` appends have
/// accumulated since the last compaction. Exits once the engine is dropped;
/// it never keeps the engine or its log alive on its own.
pub async fn run_compactor(engine: Weak<Engine>, threshold: u64) {
    run_compactor_every(engine, threshold, CHECK_INTERVAL).await;
}

async fn run_compactor_every(engine: Weak<Engine>, threshold: u64, period: Duration) {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    loop {
        interval.tick().await;
        let Some(engine) = engine.upgrade() else {
            debug!("engine dropped, compactor exiting");
            return;
        };
        compact_if_due(&engine, threshold).await;
    }
}

/// One compactor pass. Returns true when a compaction ran.
pub async fn compact_if_due(engine: &Engine, threshold: u64) -> bool {
    let appends = engine.wal_appends_since_compact().await;
    if threshold == 0 || appends < threshold {
        return false;
    }
    match engine.compact_wal().await {
        Ok(events) => {
            debug!(appends, events, "compactor pass");
            true
        }
        Err(e) => {
            // Old log is still intact; try again next tick.
            warn!("WAL compaction failed: {e}");
            false
        }
    }
}

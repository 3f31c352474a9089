use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::engine::{Engine, EngineError};

const CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Compact when at least `threshold` events were appended since the last rewrite.
pub async fn compact_if_needed(engine: &Engine, threshold: u64) -> Result<bool, EngineError> {
    let appended = engine.appends_since_compact().await;
    if appended < threshold {
        return Ok(false);
    }
    engine.compact().await?;
    info!(appended, schedules = engine.schedule_count(), "compacted semester WAL");
    Ok(true)
}

/// Background task per semester; exits when `shutdown` fires.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(CHECK_INTERVAL);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {}
        }
        if let Err(e) = compact_if_needed(&engine, threshold).await {
            warn!("compaction failed: {e}");
        }
    }
}

// =============================================================================
// Prune loop (spec §4.7)
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use super::{interruptible_sleep, Scheduler};

const PRUNE_INTERVAL: Duration = Duration::from_secs(120);
const PRUNE_MAX_AGE_SEC: i64 = 1800;

pub async fn run(scheduler: Arc<Scheduler>) {
    loop {
        if interruptible_sleep(&scheduler.cancel, PRUNE_INTERVAL).await {
            return;
        }

        if let Err(e) = scheduler.store.prune_older_than(PRUNE_MAX_AGE_SEC) {
            warn!(error = %e, "prune failed");
            continue;
        }
        if let Err(e) = scheduler.rebuild_snapshot() {
            warn!(error = %e, "snapshot rebuild failed after prune");
        }
    }
}

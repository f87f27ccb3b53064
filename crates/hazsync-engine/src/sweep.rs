//! Idle-eviction sweep.
//!
//! An independent periodic task that marks silent participants inactive.
//! The sweep is advisory: a failed or skipped cycle only delays eviction
//! and can never corrupt presence state, so errors are logged and the
//! loop keeps going.

use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::presence::PresenceTracker;

/// Sweep timing configuration.
#[derive(Clone, Copy, Debug)]
pub struct SweepConfig {
    /// Heartbeat silence after which a participant is considered idle.
    pub idle_threshold: Duration,
    /// How often the sweep runs.
    pub interval: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            idle_threshold: Duration::from_secs(300),
            interval: Duration::from_secs(60),
        }
    }
}

/// Run the idle-eviction loop until cancelled.
///
/// The first tick fires after one full `interval`, not immediately — a
/// daemon restart never evicts participants that heartbeated moments
/// before it went down.
pub async fn run_idle_sweep(
    presence: Arc<PresenceTracker>,
    config: SweepConfig,
    cancel: CancellationToken,
) {
    let mut ticker = time::interval(config.interval);
    ticker.set_missed_tick_behavior(time::MissedTickBehavior::Skip);
    // interval() fires immediately on the first tick; consume it.
    let _ = ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match presence.evict_idle(config.idle_threshold) {
                    Ok(0) => debug!("idle sweep: nothing to evict"),
                    Ok(evicted) => debug!(evicted, "idle sweep complete"),
                    Err(err) => warn!(error = %err, "idle sweep cycle failed, will retry"),
                }
            }
            () = cancel.cancelled() => {
                debug!("idle sweep cancelled");
                return;
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

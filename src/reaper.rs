//! Background reclamation of idle keys.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::facade::AdmissionFacade;

/// Shortest interval between reaper passes.
pub const MIN_REAP_INTERVAL: Duration = Duration::from_millis(1);

/// Run [`AdmissionFacade::reap`] every `interval` until the handle is aborted.
///
/// Intervals shorter than [`MIN_REAP_INTERVAL`] are raised to it.
///
/// # Panics
///
/// Panics if called outside a Tokio runtime.
pub fn spawn_reaper<C>(facade: Arc<AdmissionFacade<C>>, interval: Duration) -> JoinHandle<()>
where
    C: Clock + 'static,
{
    let interval = interval.max(MIN_REAP_INTERVAL);
    info!(interval_ms = interval.as_millis() as u64, "Starting idle key reaper");

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // The first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let summary = facade.reap();
            debug!(
                ledger_keys_removed = summary.ledger_keys_removed,
                clients_forgotten = summary.clients_forgotten,
                "Reaper pass complete"
            );
        }
    })
}

use mirage_core::HistoryStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

/// Run `cleanup()` every `period` until the returned task is aborted.
///
/// Failures are logged and the sweep keeps going.
pub fn spawn_expiry_sweep(store: Arc<dyn HistoryStore>, period: Duration) -> JoinHandle<()> {
    info!("Starting history expiry sweep every {}s", period.as_secs());

    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match store.cleanup().await {
                Ok(0) => {}
                Ok(removed) => debug!("Expiry sweep removed {removed} history rows"),
                Err(e) => warn!("Expiry sweep failed: {e}"),
            }
        }
    })
}

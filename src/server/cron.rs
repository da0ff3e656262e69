//! Periodic maintenance tasks.
//!
//! Two loops run beside the server: a short-interval session sweep and a
//! long-interval main pass (drive health reconcile plus persistence of
//! everything dirty). Both select between their timer and a stop signal,
//! and their failures are logged without ever killing the server.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::info;

use crate::server::Server;

/// Spawns the session expiry sweep.
pub fn spawn_session_cron(
    server: Arc<Server>,
    period: Duration,
    mut stop: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = server.sessions().expire_sessions().await;
                    if removed > 0 {
                        info!(removed, "expired sessions");
                    }
                }
                _ = stop.changed() => break,
            }
        }
    })
}

/// Spawns the main maintenance pass: drive health reconcile, then
/// persistence of dirty drives and the server manifest.
pub fn spawn_main_cron(
    server: Arc<Server>,
    period: Duration,
    mut stop: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    server.maintenance().await;
                }
                _ = stop.changed() => break,
            }
        }
    })
}

use std::sync::Arc;
use std::time::Duration;
use tokio::{
    select,
    signal::unix::{SignalKind, signal},
    time::{MissedTickBehavior, interval},
};

pub mod alerts;
pub mod config;
pub mod email;
pub mod feed;
pub mod notification;
pub mod pipeline;

pub use alerts::{ActiveAlert, AlertDetail, RouteSelectors, collect_active_alerts, extract, filter};
pub use feed::Feed;
pub use pipeline::{AlertCheck, RunOutcome};

/// Run the check once per tick until SIGINT or SIGTERM.
///
/// The first check fires immediately. A tick that comes due while a check is
/// still running is skipped, so checks never overlap.
pub async fn run_scheduled(check: Arc<AlertCheck>, every: Duration) -> anyhow::Result<()> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        select! {
            _ = ticker.tick() => {
                let outcome = pipeline::run_tick(check.clone()).await;
                tracing::debug!("Check finished: {:?}", outcome);
            }
            _ = sigterm.recv() => {
                tracing::info!("SIGTERM received, exiting");
                return Ok(());
            }
            _ = sigint.recv() => {
                tracing::info!("SIGINT received, exiting");
                return Ok(());
            }
        }
    }
}

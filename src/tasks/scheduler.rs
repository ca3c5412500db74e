use tokio::sync::watch;
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::core::shutdown::Shutdown;
use crate::tasks::reconcile::Reconciler;

/// Runs sweeps until `shutdown` fires, then waits for the in-flight sweep.
pub(crate) async fn run(reconciler: Reconciler, shutdown: Shutdown) -> anyhow::Result<()> {
    let handle = tokio::spawn(reconcile_loop(reconciler, shutdown.subscribe()));

    shutdown.triggered().await;

    if let Err(err) = handle.await {
        tracing::error!(error = %err, "Background task join failed");
    }

    Ok(())
}

pub(crate) async fn reconcile_loop(reconciler: Reconciler, mut shutdown: watch::Receiver<bool>) {
    let period = Duration::from_secs(reconciler.settings().interval_seconds.max(1));
    let mut tick = interval(period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!(interval_seconds = period.as_secs(), "Reconciler started");

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                if let Err(err) = reconciler.sweep().await {
                    tracing::error!(error = %err, "Reconciliation sweep failed");
                }
            }
        }
    }

    tracing::info!("Reconciler stopped");
}

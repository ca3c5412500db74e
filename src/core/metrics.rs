use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Every counter the pipeline emits, with its `# HELP` text.
pub(crate) const PIPELINE_COUNTERS: &[(&str, &str)] = &[
    ("submissions_accepted_total", "Solution uploads persisted and handed to the work queue."),
    ("submissions_rejected_total", "Solution uploads refused before persistence, by reason."),
    ("work_items_published_total", "Work items written to the submissions queue."),
    ("work_items_publish_failed_total", "Work items the broker refused; the reconciler retries them."),
    ("status_updates_received_total", "Worker status updates decoded from the status queue."),
    ("status_updates_malformed_total", "Status queue messages acked and dropped as undecodable."),
    ("realtime_updates_delivered_total", "Status updates forwarded to a live stream channel."),
    ("realtime_updates_dropped_total", "Status updates discarded by the distributor, by reason."),
    ("submissions_requeued_total", "Stale pending submissions republished by the reconciler."),
];

pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    describe_pipeline();
    let _ = PROM_HANDLE.set(handle);
    tracing::info!(counters = PIPELINE_COUNTERS.len(), "Prometheus recorder installed");
    Ok(())
}

fn describe_pipeline() {
    for (name, help) in PIPELINE_COUNTERS {
        ::metrics::describe_counter!(*name, *help);
    }
}

pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}

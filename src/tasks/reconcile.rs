use std::sync::Arc;

use anyhow::{Context, Result};

use crate::core::config::ReconcileSettings;
use crate::core::time::primitive_seconds_ago;
use crate::repositories::submissions::SubmissionStore;
use crate::repositories::RepositoryError;
use crate::services::work_queue::WorkQueue;

/// Republishes work for submissions left `pending` after a lost enqueue.
#[derive(Clone)]
pub(crate) struct Reconciler {
    store: Arc<dyn SubmissionStore>,
    queue: Arc<dyn WorkQueue>,
    settings: ReconcileSettings,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SweepOutcome {
    pub(crate) claimed: usize,
    pub(crate) requeued: usize,
    pub(crate) failed: usize,
}

impl Reconciler {
    pub(crate) fn new(
        store: Arc<dyn SubmissionStore>,
        queue: Arc<dyn WorkQueue>,
        settings: ReconcileSettings,
    ) -> Self {
        Self { store, queue, settings }
    }

    pub(crate) fn settings(&self) -> &ReconcileSettings {
        &self.settings
    }

    /// One pass. Claimed rows that fail to publish are retried once the
    /// stale window passes again.
    pub(crate) async fn sweep(&self) -> Result<SweepOutcome> {
        let cutoff = primitive_seconds_ago(self.settings.stale_after_seconds);
        let claimed = self
            .store
            .claim_stale_pending(cutoff, self.settings.batch_size)
            .await
            .context("Failed to claim stale pending submissions")?;

        let mut outcome = SweepOutcome { claimed: claimed.len(), ..SweepOutcome::default() };

        for submission_id in claimed {
            let work = match self.store.get_submission_work_metadata(submission_id).await {
                Ok(work) => work,
                Err(RepositoryError::NotFound(what)) => {
                    tracing::warn!(
                        submission_id = %submission_id,
                        missing = what,
                        "Stale submission has no work metadata; skipping"
                    );
                    outcome.failed += 1;
                    continue;
                }
                Err(err) => {
                    return Err(err).context("Failed to load work metadata for stale submission");
                }
            };

            match self.queue.queue_work(&work).await {
                Ok(()) => {
                    metrics::counter!("submissions_requeued_total").increment(1);
                    outcome.requeued += 1;
                }
                Err(err) => {
                    tracing::warn!(
                        submission_id = %submission_id,
                        error = %err,
                        "Failed to requeue stale submission"
                    );
                    outcome.failed += 1;
                }
            }
        }

        if outcome.claimed > 0 {
            tracing::info!(
                claimed = outcome.claimed,
                requeued = outcome.requeued,
                failed = outcome.failed,
                "Reconciled stale pending submissions"
            );
        }

        Ok(outcome)
    }
}

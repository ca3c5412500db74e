use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::core::broker::BrokerError;
use crate::repositories::submissions::SubmissionStore;
use crate::repositories::test_blocks::BlockEligibility;
use crate::repositories::RepositoryError;
use crate::services::archive_store::{ArchiveStore, ArchiveStoreError};
use crate::services::work_queue::WorkQueue;

#[derive(Debug, Error)]
pub(crate) enum SubmissionError {
    #[error("student is not allowed to submit to this test block")]
    PermissionDenied,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("deadline exceeded")]
    Timeout,
    #[error("work queue unavailable: {0}")]
    BrokerUnavailable(String),
    #[error("serialization failed: {0}")]
    Serialization(String),
    #[error("archive store unavailable: {0}")]
    Storage(String),
    #[error("database error: {0}")]
    Database(String),
}

impl From<RepositoryError> for SubmissionError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(what) => SubmissionError::NotFound(what),
            RepositoryError::Timeout => SubmissionError::Timeout,
            other => SubmissionError::Database(other.to_string()),
        }
    }
}

impl From<ArchiveStoreError> for SubmissionError {
    fn from(err: ArchiveStoreError) -> Self {
        match err {
            ArchiveStoreError::Timeout => SubmissionError::Timeout,
            other => SubmissionError::Storage(other.to_string()),
        }
    }
}

impl From<BrokerError> for SubmissionError {
    fn from(err: BrokerError) -> Self {
        match err {
            BrokerError::Serialization(err) => SubmissionError::Serialization(err.to_string()),
            other => SubmissionError::BrokerUnavailable(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum SubmitKind {
    Created,
    Resubmitted,
}

impl SubmitKind {
    fn as_str(self) -> &'static str {
        match self {
            SubmitKind::Created => "new",
            SubmitKind::Resubmitted => "resubmit",
        }
    }
}

/// Accepts archives for grading: eligibility, archive, record, then enqueue.
///
/// The three writes are independent. A failed enqueue leaves the row pending
/// for the reconciler to pick up.
#[derive(Clone)]
pub(crate) struct SubmissionIntake {
    eligibility: Arc<dyn BlockEligibility>,
    store: Arc<dyn SubmissionStore>,
    archives: Arc<dyn ArchiveStore>,
    queue: Arc<dyn WorkQueue>,
}

impl SubmissionIntake {
    pub(crate) fn new(
        eligibility: Arc<dyn BlockEligibility>,
        store: Arc<dyn SubmissionStore>,
        archives: Arc<dyn ArchiveStore>,
        queue: Arc<dyn WorkQueue>,
    ) -> Self {
        Self { eligibility, store, archives, queue }
    }

    pub(crate) async fn submit_solution(
        &self,
        student_id: Uuid,
        test_block_id: Uuid,
        archive: &[u8],
    ) -> Result<Uuid, SubmissionError> {
        if !self.eligibility.can_student_submit_to_test_block(student_id, test_block_id).await? {
            tracing::info!(
                student_id = %student_id,
                test_block_id = %test_block_id,
                "Submission rejected: student not eligible"
            );
            return Err(SubmissionError::PermissionDenied);
        }

        let (submission_id, kind) =
            match self.store.get_student_submission(student_id, test_block_id).await? {
                Some(existing) => {
                    self.resubmit(existing.id, archive).await?;
                    (existing.id, SubmitKind::Resubmitted)
                }
                None => self.first_submit(student_id, test_block_id, archive).await?,
            };

        metrics::counter!("submissions_accepted_total", "kind" => kind.as_str()).increment(1);

        let work = self.store.get_submission_work_metadata(submission_id).await?;
        if let Err(err) = self.queue.queue_work(&work).await {
            tracing::warn!(
                submission_id = %submission_id,
                error = %err,
                "Submission stored but not queued; left pending for reconciliation"
            );
            return Err(err.into());
        }

        tracing::info!(
            submission_id = %submission_id,
            student_id = %student_id,
            test_block_id = %test_block_id,
            kind = kind.as_str(),
            "Submission accepted"
        );
        Ok(submission_id)
    }

    async fn first_submit(
        &self,
        student_id: Uuid,
        test_block_id: Uuid,
        archive: &[u8],
    ) -> Result<(Uuid, SubmitKind), SubmissionError> {
        let archive_id = self.archives.save_archive(archive).await?;

        match self.store.save_submission(student_id, test_block_id, archive_id).await {
            Ok(submission_id) => Ok((submission_id, SubmitKind::Created)),
            Err(RepositoryError::Duplicate) => {
                // A concurrent first submit won the insert; fold into its row.
                self.discard_archive(archive_id).await;
                let existing = self
                    .store
                    .get_student_submission(student_id, test_block_id)
                    .await?
                    .ok_or(SubmissionError::NotFound("submission"))?;
                self.resubmit(existing.id, archive).await?;
                Ok((existing.id, SubmitKind::Resubmitted))
            }
            Err(err) => {
                self.discard_archive(archive_id).await;
                Err(err.into())
            }
        }
    }

    /// Overwrite must land before the reset so a worker never grades a stale blob.
    async fn resubmit(&self, submission_id: Uuid, archive: &[u8]) -> Result<(), SubmissionError> {
        let archive_id = self.store.get_student_submission_archive_id(submission_id).await?;
        self.archives.overwrite_archive(archive_id, archive).await?;
        self.store.reset_submission_status(submission_id).await?;
        Ok(())
    }

    async fn discard_archive(&self, archive_id: Uuid) {
        if let Err(err) = self.archives.delete_archive(archive_id).await {
            tracing::warn!(archive_id = %archive_id, error = %err, "Failed to delete orphaned archive");
        }
    }
}

mod commands;
mod queries;
mod types;

use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use time::PrimitiveDateTime;
use uuid::Uuid;

use crate::core::time::primitive_now_utc;
use crate::db::models::Submission;
use crate::schemas::work::SubmissionWork;

use super::{with_deadline, RepositoryError};

/// Persistence operations the intake pipeline and the reconciler rely on.
///
/// Every call runs under its own deadline; nothing stays open between calls.
#[async_trait]
pub(crate) trait SubmissionStore: Send + Sync {
    /// Creates the archive reference and submission rows atomically.
    ///
    /// Fails with [`RepositoryError::Duplicate`] when the pair already has a row.
    async fn save_submission(
        &self,
        student_id: Uuid,
        test_block_id: Uuid,
        archive_id: Uuid,
    ) -> Result<Uuid, RepositoryError>;

    /// Back to `pending`, not passing, empty stdout, `submitted_at = now`.
    async fn reset_submission_status(&self, submission_id: Uuid) -> Result<(), RepositoryError>;

    async fn get_student_submission(
        &self,
        student_id: Uuid,
        test_block_id: Uuid,
    ) -> Result<Option<Submission>, RepositoryError>;

    async fn get_submission_work_metadata(
        &self,
        submission_id: Uuid,
    ) -> Result<SubmissionWork, RepositoryError>;

    async fn get_student_submission_archive_id(
        &self,
        submission_id: Uuid,
    ) -> Result<Uuid, RepositoryError>;

    async fn claim_stale_pending(
        &self,
        cutoff: PrimitiveDateTime,
        limit: i64,
    ) -> Result<Vec<Uuid>, RepositoryError>;
}

#[derive(Clone)]
pub(crate) struct SubmissionRepository {
    pool: PgPool,
    deadline: Duration,
}

impl SubmissionRepository {
    pub(crate) fn new(pool: PgPool, deadline: Duration) -> Self {
        Self { pool, deadline }
    }
}

#[async_trait]
impl SubmissionStore for SubmissionRepository {
    async fn save_submission(
        &self,
        student_id: Uuid,
        test_block_id: Uuid,
        archive_id: Uuid,
    ) -> Result<Uuid, RepositoryError> {
        with_deadline(self.deadline, async {
            let id = commands::insert_with_archive(
                &self.pool,
                Uuid::new_v4(),
                student_id,
                test_block_id,
                archive_id,
                primitive_now_utc(),
            )
            .await?;
            Ok::<_, RepositoryError>(id)
        })
        .await
    }

    async fn reset_submission_status(&self, submission_id: Uuid) -> Result<(), RepositoryError> {
        with_deadline(self.deadline, async {
            let updated =
                commands::reset_status(&self.pool, submission_id, primitive_now_utc()).await?;
            if !updated {
                return Err(RepositoryError::NotFound("submission"));
            }
            Ok(())
        })
        .await
    }

    async fn get_student_submission(
        &self,
        student_id: Uuid,
        test_block_id: Uuid,
    ) -> Result<Option<Submission>, RepositoryError> {
        with_deadline(self.deadline, async {
            let found =
                queries::find_by_student_block(&self.pool, student_id, test_block_id).await?;
            Ok::<_, RepositoryError>(found)
        })
        .await
    }

    async fn get_submission_work_metadata(
        &self,
        submission_id: Uuid,
    ) -> Result<SubmissionWork, RepositoryError> {
        with_deadline(self.deadline, async {
            queries::find_work_metadata(&self.pool, submission_id)
                .await?
                .map(SubmissionWork::from)
                .ok_or(RepositoryError::NotFound("submission work metadata"))
        })
        .await
    }

    async fn get_student_submission_archive_id(
        &self,
        submission_id: Uuid,
    ) -> Result<Uuid, RepositoryError> {
        with_deadline(self.deadline, async {
            queries::find_archive_id(&self.pool, submission_id)
                .await?
                .ok_or(RepositoryError::NotFound("submission archive"))
        })
        .await
    }

    async fn claim_stale_pending(
        &self,
        cutoff: PrimitiveDateTime,
        limit: i64,
    ) -> Result<Vec<Uuid>, RepositoryError> {
        with_deadline(self.deadline, async {
            let claimed =
                commands::claim_stale_pending(&self.pool, cutoff, limit, primitive_now_utc())
                    .await?;
            Ok::<_, RepositoryError>(claimed)
        })
        .await
    }
}

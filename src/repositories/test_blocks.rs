use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::{with_deadline, RepositoryError};

#[async_trait]
pub(crate) trait BlockEligibility: Send + Sync {
    async fn can_student_submit_to_test_block(
        &self,
        student_id: Uuid,
        test_block_id: Uuid,
    ) -> Result<bool, RepositoryError>;
}

/// A student may submit to a block when enrolled in the block's course.
#[derive(Clone)]
pub(crate) struct TestBlockRepository {
    pool: PgPool,
    deadline: Duration,
}

impl TestBlockRepository {
    pub(crate) fn new(pool: PgPool, deadline: Duration) -> Self {
        Self { pool, deadline }
    }
}

#[async_trait]
impl BlockEligibility for TestBlockRepository {
    async fn can_student_submit_to_test_block(
        &self,
        student_id: Uuid,
        test_block_id: Uuid,
    ) -> Result<bool, RepositoryError> {
        with_deadline(self.deadline, async {
            let allowed = sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS (
                    SELECT 1
                    FROM test_blocks tb
                    JOIN course_students cs ON cs.course_id = tb.course_id
                    WHERE tb.id = $1 AND cs.student_id = $2
                )",
            )
            .bind(test_block_id)
            .bind(student_id)
            .fetch_one(&self.pool)
            .await?;
            Ok::<_, RepositoryError>(allowed)
        })
        .await
    }
}

use sqlx::PgPool;
use uuid::Uuid;

use crate::db::models::Submission;

use super::types::{WorkMetadataRow, COLUMNS};

pub(crate) async fn find_by_student_block(
    pool: &PgPool,
    student_id: Uuid,
    test_block_id: Uuid,
) -> Result<Option<Submission>, sqlx::Error> {
    sqlx::query_as::<_, Submission>(&format!(
        "SELECT {COLUMNS}
         FROM submissions
         WHERE student_id = $1 AND test_block_id = $2"
    ))
    .bind(student_id)
    .bind(test_block_id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn find_work_metadata(
    pool: &PgPool,
    submission_id: Uuid,
) -> Result<Option<WorkMetadataRow>, sqlx::Error> {
    sqlx::query_as::<_, WorkMetadataRow>(
        "SELECT s.id AS submission_id,
                tb.language_id,
                sa.id AS archive_id,
                tb.test_archive_id
         FROM submissions s
         JOIN test_blocks tb ON tb.id = s.test_block_id
         JOIN submission_archives sa ON sa.id = s.archive_id
         WHERE s.id = $1",
    )
    .bind(submission_id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn find_archive_id(
    pool: &PgPool,
    submission_id: Uuid,
) -> Result<Option<Uuid>, sqlx::Error> {
    sqlx::query_scalar::<_, Uuid>("SELECT archive_id FROM submissions WHERE id = $1")
        .bind(submission_id)
        .fetch_optional(pool)
        .await
}

use sqlx::PgPool;
use time::PrimitiveDateTime;
use uuid::Uuid;

use crate::db::types::SubmissionStatus;

/// Inserts the archive reference and the submission row in one transaction.
pub(crate) async fn insert_with_archive(
    pool: &PgPool,
    submission_id: Uuid,
    student_id: Uuid,
    test_block_id: Uuid,
    archive_id: Uuid,
    now: PrimitiveDateTime,
) -> Result<Uuid, sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query("INSERT INTO submission_archives (id, created_at) VALUES ($1, $2)")
        .bind(archive_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

    let id = sqlx::query_scalar::<_, Uuid>(
        "INSERT INTO submissions (id, student_id, test_block_id, archive_id, passing, status, stdout, submitted_at)
         VALUES ($1, $2, $3, $4, FALSE, $5, '', $6)
         RETURNING id",
    )
    .bind(submission_id)
    .bind(student_id)
    .bind(test_block_id)
    .bind(archive_id)
    .bind(SubmissionStatus::Pending)
    .bind(now)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(id)
}

pub(crate) async fn reset_status(
    pool: &PgPool,
    submission_id: Uuid,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let updated = sqlx::query(
        "UPDATE submissions
         SET status = $1,
             passing = FALSE,
             stdout = '',
             submitted_at = $2,
             requeued_at = NULL
         WHERE id = $3",
    )
    .bind(SubmissionStatus::Pending)
    .bind(now)
    .bind(submission_id)
    .execute(pool)
    .await?;

    Ok(updated.rows_affected() > 0)
}

/// Stamps `requeued_at` on up to `limit` pending rows older than `cutoff` and returns them.
///
/// `SKIP LOCKED` lets several reconcilers run without claiming the same row.
pub(crate) async fn claim_stale_pending(
    pool: &PgPool,
    cutoff: PrimitiveDateTime,
    limit: i64,
    now: PrimitiveDateTime,
) -> Result<Vec<Uuid>, sqlx::Error> {
    sqlx::query_scalar::<_, Uuid>(
        "WITH candidate AS (
            SELECT id
            FROM submissions
            WHERE status = $1
              AND submitted_at < $2
              AND (requeued_at IS NULL OR requeued_at < $2)
            ORDER BY submitted_at
            LIMIT $3
            FOR UPDATE SKIP LOCKED
        )
        UPDATE submissions
        SET requeued_at = $4
        FROM candidate
        WHERE submissions.id = candidate.id
        RETURNING submissions.id",
    )
    .bind(SubmissionStatus::Pending)
    .bind(cutoff)
    .bind(limit)
    .bind(now)
    .fetch_all(pool)
    .await
}

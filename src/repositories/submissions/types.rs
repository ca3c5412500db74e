use sqlx::FromRow;
use uuid::Uuid;

use crate::schemas::work::SubmissionWork;

pub(crate) const COLUMNS: &str = "\
    id, student_id, test_block_id, archive_id, passing, status, stdout, submitted_at";

#[derive(Debug, FromRow)]
pub(crate) struct WorkMetadataRow {
    pub(crate) submission_id: Uuid,
    pub(crate) language_id: Uuid,
    pub(crate) archive_id: Uuid,
    pub(crate) test_archive_id: Uuid,
}

impl From<WorkMetadataRow> for SubmissionWork {
    fn from(row: WorkMetadataRow) -> Self {
        Self {
            submission_uuid: row.submission_id,
            language_uuid: row.language_id,
            submission_archive_uuid: row.archive_id,
            test_archive_uuid: row.test_archive_id,
        }
    }
}

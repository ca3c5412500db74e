use serde::Serialize;
use sqlx::FromRow;
use time::PrimitiveDateTime;
use uuid::Uuid;

use crate::db::types::SubmissionStatus;

/// One live row per (student, test block); resubmits mutate it in place.
#[derive(Debug, Clone, Serialize, FromRow)]
pub(crate) struct Submission {
    pub(crate) id: Uuid,
    pub(crate) student_id: Uuid,
    pub(crate) test_block_id: Uuid,
    pub(crate) archive_id: Uuid,
    pub(crate) passing: bool,
    pub(crate) status: SubmissionStatus,
    pub(crate) stdout: String,
    pub(crate) submitted_at: PrimitiveDateTime,
}

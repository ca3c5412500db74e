use serde::Serialize;
use uuid::Uuid;

use crate::core::time::format_primitive;
use crate::db::models::Submission;
use crate::db::types::SubmissionStatus;

#[derive(Debug, Serialize)]
pub(crate) struct SubmissionCreatedResponse {
    pub(crate) uuid: Uuid,
}

#[derive(Debug, Serialize)]
pub(crate) struct SubmissionResponse {
    pub(crate) uuid: Uuid,
    pub(crate) test_block_uuid: Uuid,
    pub(crate) status: SubmissionStatus,
    pub(crate) passing: bool,
    pub(crate) stdout: String,
    pub(crate) submitted_at: String,
}

impl From<Submission> for SubmissionResponse {
    fn from(submission: Submission) -> Self {
        Self {
            uuid: submission.id,
            test_block_uuid: submission.test_block_id,
            status: submission.status,
            passing: submission.passing,
            stdout: submission.stdout,
            submitted_at: format_primitive(submission.submitted_at),
        }
    }
}

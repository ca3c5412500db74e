//! Payloads exchanged with the grading workers over the broker.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::types::SubmissionStatus;

/// Work item published to the `submissions` queue. Never persisted on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct SubmissionWork {
    pub(crate) submission_uuid: Uuid,
    pub(crate) language_uuid: Uuid,
    pub(crate) submission_archive_uuid: Uuid,
    pub(crate) test_archive_uuid: Uuid,
}

/// Worker-emitted progress event read from the status queue.
///
/// Fields the pipeline does not interpret are kept in `extra` and forwarded
/// to status streams untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct SubmissionStatusUpdate {
    pub(crate) submission_uuid: Uuid,
    pub(crate) submission_status: SubmissionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) passing: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) stdout: Option<String>,
    /// Monotonic per submission when the worker provides it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) sequence: Option<u64>,
    #[serde(flatten)]
    pub(crate) extra: serde_json::Map<String, serde_json::Value>,
}

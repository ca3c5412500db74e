use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentStudent;
use crate::api::validation::{validate_archive_bytes, validate_archive_upload};
use crate::core::state::AppState;
use crate::schemas::submission::{SubmissionCreatedResponse, SubmissionResponse};

const ARCHIVE_FIELD: &str = "file";

pub(super) async fn submit_solution(
    Path(test_block_id): Path<Uuid>,
    CurrentStudent(student_id): CurrentStudent,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<SubmissionCreatedResponse>), ApiError> {
    let storage = state.settings().storage();
    let allowed = state
        .redis()
        .rate_limit(
            &format!("submit:{student_id}"),
            storage.submit_rate_limit,
            storage.submit_rate_window_seconds,
        )
        .await
        .unwrap_or_else(|err| {
            tracing::warn!(error = %err, "Rate limiter unavailable; allowing submit");
            true
        });
    if !allowed {
        metrics::counter!("submissions_rejected_total", "reason" => "rate_limited").increment(1);
        return Err(ApiError::TooManyRequests("Too many submissions, try again later"));
    }

    let max_bytes = storage.max_upload_size_mb * 1024 * 1024;
    let mut archive: Option<(String, Vec<u8>)> = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|_| ApiError::BadRequest("Invalid multipart data".to_string()))?
    {
        if field.name() != Some(ARCHIVE_FIELD) {
            continue;
        }

        let filename = field.file_name().unwrap_or("").to_string();
        let extension = validate_archive_upload(
            &filename,
            field.content_type(),
            &storage.allowed_archive_extensions,
        )?;

        let mut bytes = Vec::new();
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|_| ApiError::BadRequest("Failed to read archive".to_string()))?
        {
            if bytes.len() as u64 + chunk.len() as u64 > max_bytes {
                return Err(ApiError::BadRequest(format!(
                    "Archive exceeds {}MB limit",
                    storage.max_upload_size_mb
                )));
            }
            bytes.extend_from_slice(&chunk);
        }
        archive = Some((extension, bytes));
    }

    let (extension, bytes) =
        archive.ok_or_else(|| ApiError::BadRequest("Archive file is required".to_string()))?;
    validate_archive_bytes(&extension, &bytes)?;

    let submission_id = state.intake().submit_solution(student_id, test_block_id, &bytes).await?;

    Ok((StatusCode::CREATED, Json(SubmissionCreatedResponse { uuid: submission_id })))
}

/// Persisted state; clients re-fetch this on (re)connect to the status stream.
pub(super) async fn get_submission(
    Path(test_block_id): Path<Uuid>,
    CurrentStudent(student_id): CurrentStudent,
    State(state): State<AppState>,
) -> Result<Json<SubmissionResponse>, ApiError> {
    let submission = state
        .submissions()
        .get_student_submission(student_id, test_block_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Submission not found".to_string()))?;

    Ok(Json(SubmissionResponse::from(submission)))
}

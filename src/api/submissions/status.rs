use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use tokio_stream::Stream;
use uuid::Uuid;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentStudent;
use crate::core::state::AppState;
use crate::schemas::work::SubmissionStatusUpdate;
use crate::services::distributor::{RealtimeDistributor, SubmissionChannel};

const STATUS_EVENT: &str = "status";

/// Releases the channel when the response stream is dropped, including on disconnect.
struct ChannelRelease {
    distributor: RealtimeDistributor,
    channel: SubmissionChannel,
}

impl Drop for ChannelRelease {
    fn drop(&mut self) {
        tracing::debug!(submission_id = %self.channel.submission_id(), "Status stream closed");
        self.distributor.release_channel(&self.channel);
    }
}

pub(super) async fn stream_status(
    Path(test_block_id): Path<Uuid>,
    CurrentStudent(student_id): CurrentStudent,
    State(state): State<AppState>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let submission = state
        .submissions()
        .get_student_submission(student_id, test_block_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Submission not found".to_string()))?;

    let channel = state.distributor().create_channel(submission.id).await.map_err(|err| {
        ApiError::ServiceUnavailable(format!("Live status unavailable: {err}"))
    })?;

    let realtime = state.settings().realtime();
    let max_duration = Duration::from_secs(realtime.max_stream_seconds);
    let keep_alive = Duration::from_secs(realtime.keep_alive_seconds);
    let release = ChannelRelease { distributor: state.distributor().clone(), channel };

    tracing::debug!(submission_id = %submission.id, student_id = %student_id, "Status stream opened");

    let stream = async_stream::stream! {
        let release = release;
        let deadline = tokio::time::sleep(max_duration);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut deadline => break,
                next = release.channel.recv() => match next {
                    Some(update) => {
                        if let Some(event) = status_event(&update) {
                            yield Ok::<Event, Infallible>(event);
                        }
                    }
                    None => break,
                },
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(keep_alive).text("keep-alive")))
}

fn status_event(update: &SubmissionStatusUpdate) -> Option<Event> {
    let event = match Event::default().event(STATUS_EVENT).json_data(update) {
        Ok(event) => event,
        Err(err) => {
            tracing::warn!(submission_id = %update.submission_uuid, error = %err, "Failed to encode status event");
            return None;
        }
    };

    Some(match update.sequence {
        Some(sequence) => event.id(sequence.to_string()),
        None => event,
    })
}

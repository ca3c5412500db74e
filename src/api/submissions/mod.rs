mod status;
mod submit;

use axum::extract::DefaultBodyLimit;
use axum::{routing::get, Router};

use crate::core::{config::Settings, state::AppState};

/// Headroom for multipart boundaries and headers on top of the archive itself.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

pub(crate) fn router(settings: &Settings) -> Router<AppState> {
    let max_archive_bytes = settings.storage().max_upload_size_mb as usize * 1024 * 1024;

    Router::new()
        .route(
            "/test_blocks/:test_block_id",
            get(submit::get_submission).post(submit::submit_solution),
        )
        .route("/test_blocks/:test_block_id/status", get(status::stream_status))
        .layer(DefaultBodyLimit::max(max_archive_bytes + MULTIPART_OVERHEAD_BYTES))
}
